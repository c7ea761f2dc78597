use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{parse_datetime, parse_datetime_opt, DbPool};
use super::records::ProcessingItemRecord;
use crate::error::{CoreError, CoreResult};
use crate::models::{ProcessingItem, ProcessingItemStatus, ProcessingItemType};
use crate::schema::processing_items;
use crate::with_conn;

impl TryFrom<ProcessingItemRecord> for ProcessingItem {
    type Error = CoreError;

    fn try_from(r: ProcessingItemRecord) -> CoreResult<Self> {
        Ok(ProcessingItem {
            id: r.id,
            request_id: r.request_id,
            item_type: ProcessingItemType::from_str(&r.item_type)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad item type")))?,
            tmdb_id: r.tmdb_id,
            title: r.title,
            season: r.season,
            episode: r.episode,
            status: ProcessingItemStatus::from_str(&r.status)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad item status: {}", r.status)))?,
            progress: r.progress,
            current_step: r.current_step,
            step_context: serde_json::from_str(&r.step_context)?,
            download_id: r.download_id,
            encoding_job_id: r.encoding_job_id,
            source_file_path: r.source_file_path,
            cooldown_ends_at: parse_datetime_opt(r.cooldown_ends_at),
            last_error: r.last_error,
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        })
    }
}

fn to_record(item: &ProcessingItem) -> CoreResult<ProcessingItemRecord> {
    Ok(ProcessingItemRecord {
        id: item.id.clone(),
        request_id: item.request_id.clone(),
        item_type: item.item_type.as_str().to_string(),
        tmdb_id: item.tmdb_id,
        title: item.title.clone(),
        season: item.season,
        episode: item.episode,
        status: item.status.as_str().to_string(),
        progress: item.progress,
        current_step: item.current_step.clone(),
        step_context: serde_json::to_string(&item.step_context)?,
        download_id: item.download_id.clone(),
        encoding_job_id: item.encoding_job_id.clone(),
        source_file_path: item.source_file_path.clone(),
        cooldown_ends_at: item.cooldown_ends_at.map(|t| t.to_rfc3339()),
        last_error: item.last_error.clone(),
        created_at: item.created_at.to_rfc3339(),
        updated_at: item.updated_at.to_rfc3339(),
    })
}

/// Diesel-backed repository for processing items (spec.md §4.3). Also
/// backs the recovery sweepers in `mf-recovery`, which query by status and
/// staleness window.
#[derive(Clone)]
pub struct ProcessingItemRepository {
    pool: DbPool,
}

impl ProcessingItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> CoreResult<Option<ProcessingItem>> {
        with_conn!(self.pool, conn, {
            let record = processing_items::table
                .find(id)
                .first::<ProcessingItemRecord>(&mut conn)
                .await
                .optional()?;
            record.map(ProcessingItem::try_from).transpose()
        })
    }

    pub async fn list_by_request(&self, request_id: &str) -> CoreResult<Vec<ProcessingItem>> {
        with_conn!(self.pool, conn, {
            let records = processing_items::table
                .filter(processing_items::request_id.eq(request_id))
                .load::<ProcessingItemRecord>(&mut conn)
                .await?;
            records.into_iter().map(ProcessingItem::try_from).collect()
        })
    }

    pub async fn list_by_status(&self, status: ProcessingItemStatus) -> CoreResult<Vec<ProcessingItem>> {
        with_conn!(self.pool, conn, {
            let records = processing_items::table
                .filter(processing_items::status.eq(status.as_str()))
                .load::<ProcessingItemRecord>(&mut conn)
                .await?;
            records.into_iter().map(ProcessingItem::try_from).collect()
        })
    }

    /// Items in `status` whose `updated_at` is older than `older_than`,
    /// used by the recovery sweepers (spec.md §4.5) to find stuck items
    /// without hand-rolling raw SQL per sweep.
    pub async fn list_stale_by_status(
        &self,
        status: ProcessingItemStatus,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<Vec<ProcessingItem>> {
        with_conn!(self.pool, conn, {
            let records = processing_items::table
                .filter(processing_items::status.eq(status.as_str()))
                .filter(processing_items::updated_at.lt(older_than.to_rfc3339()))
                .load::<ProcessingItemRecord>(&mut conn)
                .await?;
            records.into_iter().map(ProcessingItem::try_from).collect()
        })
    }

    pub async fn list_by_download(&self, download_id: &str) -> CoreResult<Vec<ProcessingItem>> {
        with_conn!(self.pool, conn, {
            let records = processing_items::table
                .filter(processing_items::download_id.eq(download_id))
                .load::<ProcessingItemRecord>(&mut conn)
                .await?;
            records.into_iter().map(ProcessingItem::try_from).collect()
        })
    }

    pub async fn insert(&self, item: &ProcessingItem) -> CoreResult<()> {
        let record = to_record(item)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(processing_items::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn save(&self, item: &ProcessingItem) -> CoreResult<()> {
        let record = to_record(item)?;
        with_conn!(self.pool, conn, {
            diesel::update(processing_items::table.find(&item.id))
                .set((
                    processing_items::status.eq(&record.status),
                    processing_items::progress.eq(record.progress),
                    processing_items::current_step.eq(&record.current_step),
                    processing_items::step_context.eq(&record.step_context),
                    processing_items::download_id.eq(&record.download_id),
                    processing_items::encoding_job_id.eq(&record.encoding_job_id),
                    processing_items::source_file_path.eq(&record.source_file_path),
                    processing_items::cooldown_ends_at.eq(&record.cooldown_ends_at),
                    processing_items::last_error.eq(&record.last_error),
                    processing_items::updated_at.eq(&record.updated_at),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }
}
