use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// One measurement report per wall and date
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "revancha_uploads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub wall: String,
    pub measurement_date: NaiveDate,
    #[sea_orm(column_type = "Text")]
    pub file_name: String,
    pub file_type: String,
    pub total_records: i32,
    /// JSON array of sector labels
    #[sea_orm(column_type = "Text")]
    pub sectors_included: String,
    pub uploaded_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::uploads::measurements::models::Entity")]
    Measurements,
}

impl Related<crate::uploads::measurements::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Measurements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
