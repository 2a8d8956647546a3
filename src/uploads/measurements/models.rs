use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "revancha_measurements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub upload_id: Uuid,
    pub sector: String,
    pub pk: String,
    #[sea_orm(column_type = "Double", nullable)]
    pub coronamiento: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub revancha: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub lama: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub ancho: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub geomembrana: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub dist_geo_lama: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub dist_geo_coronamiento: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::uploads::models::Entity",
        from = "Column::UploadId",
        to = "crate::uploads::models::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Uploads,
}

impl Related<crate::uploads::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Uploads.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
