//! Database operations for report uploads
//!
//! Reports are stored as one parent row per (wall, date) plus one child row
//! per measurement. Uploading a report that is already stored replaces it:
//! the old parent is deleted (children go with it through the foreign key)
//! before the new one is written. The sequence is not atomic.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use uuid::Uuid;

use super::grid::SourceFormat;
use crate::common::errors::{UploadError, UploadStage};
use crate::services::models::Measurement;
use crate::uploads::{measurements::models as measurements, models as uploads};

/// Measurements are inserted in batches of this many rows
pub const CHUNK_SIZE: usize = 500;

/// Parent record for one uploaded report
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpload {
    pub wall: String,
    pub measurement_date: NaiveDate,
    pub file_name: String,
    pub file_type: SourceFormat,
    pub total_records: usize,
    pub sectors: Vec<String>,
    pub uploaded_by: Option<i32>,
}

/// The four operations the replace protocol needs from a backend
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Id of the upload already stored for a wall and date
    async fn find(&self, wall: &str, date: NaiveDate) -> Result<Option<Uuid>, DbErr>;
    /// Remove an upload together with its measurements
    async fn delete(&self, upload_id: Uuid) -> Result<(), DbErr>;
    async fn insert_parent(&self, upload: &NewUpload) -> Result<Uuid, DbErr>;
    async fn insert_children(&self, upload_id: Uuid, rows: &[Measurement]) -> Result<(), DbErr>;
}

/// Store backed by the `revancha_uploads` and `revancha_measurements` tables
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Uploads stored for a wall, oldest measurement first
    pub async fn list_uploads(&self, wall: &str) -> Result<Vec<uploads::Model>, DbErr> {
        uploads::Entity::find()
            .filter(uploads::Column::Wall.eq(wall))
            .order_by_asc(uploads::Column::MeasurementDate)
            .all(&self.db)
            .await
    }
}

fn measurement_model(
    upload_id: Uuid,
    measurement: &Measurement,
    created_at: DateTime<Utc>,
) -> measurements::ActiveModel {
    measurements::ActiveModel {
        id: Set(Uuid::new_v4()),
        upload_id: Set(upload_id),
        sector: Set(measurement.sector.clone()),
        pk: Set(measurement.pk.clone()),
        coronamiento: Set(measurement.coronamiento.value()),
        revancha: Set(measurement.revancha.value()),
        lama: Set(measurement.lama.value()),
        ancho: Set(measurement.ancho.value()),
        geomembrana: Set(measurement.geomembrana.value()),
        dist_geo_lama: Set(measurement.dist_geo_lama.value()),
        dist_geo_coronamiento: Set(measurement.dist_geo_coronamiento.value()),
        created_at: Set(created_at),
    }
}

#[async_trait]
impl MeasurementStore for SeaOrmStore {
    async fn find(&self, wall: &str, date: NaiveDate) -> Result<Option<Uuid>, DbErr> {
        let existing = uploads::Entity::find()
            .filter(uploads::Column::Wall.eq(wall))
            .filter(uploads::Column::MeasurementDate.eq(date))
            .one(&self.db)
            .await?;
        Ok(existing.map(|upload| upload.id))
    }

    async fn delete(&self, upload_id: Uuid) -> Result<(), DbErr> {
        uploads::Entity::delete_by_id(upload_id)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn insert_parent(&self, upload: &NewUpload) -> Result<Uuid, DbErr> {
        let total_records = i32::try_from(upload.total_records)
            .map_err(|_| DbErr::Custom(format!("Too many records: {}", upload.total_records)))?;
        let sectors_included =
            serde_json::to_string(&upload.sectors).map_err(|e| DbErr::Custom(e.to_string()))?;

        let id = Uuid::new_v4();
        let model = uploads::ActiveModel {
            id: Set(id),
            wall: Set(upload.wall.clone()),
            measurement_date: Set(upload.measurement_date),
            file_name: Set(upload.file_name.clone()),
            file_type: Set(upload.file_type.as_str().to_string()),
            total_records: Set(total_records),
            sectors_included: Set(sectors_included),
            uploaded_by: Set(upload.uploaded_by),
            created_at: Set(Utc::now()),
        };
        uploads::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await?;
        Ok(id)
    }

    async fn insert_children(&self, upload_id: Uuid, rows: &[Measurement]) -> Result<(), DbErr> {
        let created_at = Utc::now();
        for chunk in rows.chunks(CHUNK_SIZE) {
            let models: Vec<_> = chunk
                .iter()
                .map(|measurement| measurement_model(upload_id, measurement, created_at))
                .collect();
            measurements::Entity::insert_many(models)
                .exec_without_returning(&self.db)
                .await?;
        }
        tracing::debug!("Inserted {} measurements for upload {upload_id}", rows.len());
        Ok(())
    }
}

/// Result of a successful replace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub upload_id: Uuid,
    /// Upload that was deleted to make room for this one
    pub previous: Option<Uuid>,
}

impl UploadReceipt {
    pub fn replaced(&self) -> bool {
        self.previous.is_some()
    }
}

/// Store a report, replacing whatever is stored for the same wall and date.
///
/// A failure before the parent exists is a [`UploadError::StoreWriteFailed`];
/// a failure writing measurements after it exists is a
/// [`UploadError::PartialWrite`] naming the orphaned parent.
pub async fn replace_upload<S>(
    store: &S,
    upload: &NewUpload,
    rows: &[Measurement],
) -> Result<UploadReceipt, UploadError>
where
    S: MeasurementStore + ?Sized,
{
    let failed_at = |stage: UploadStage| {
        move |err: DbErr| UploadError::StoreWriteFailed {
            stage,
            message: err.to_string(),
        }
    };

    let previous = store
        .find(&upload.wall, upload.measurement_date)
        .await
        .map_err(failed_at(UploadStage::Lookup))?;

    if let Some(previous_id) = previous {
        store
            .delete(previous_id)
            .await
            .map_err(failed_at(UploadStage::Delete))?;
        tracing::info!(
            "Replacing upload {previous_id} ({} {})",
            upload.wall,
            upload.measurement_date
        );
    }

    let upload_id = store
        .insert_parent(upload)
        .await
        .map_err(failed_at(UploadStage::InsertParent))?;

    store
        .insert_children(upload_id, rows)
        .await
        .map_err(|err| UploadError::PartialWrite {
            upload_id,
            message: err.to_string(),
        })?;

    Ok(UploadReceipt {
        upload_id,
        previous,
    })
}

#[cfg(test)]
pub use memory::{MemoryStore, StoreOp};
