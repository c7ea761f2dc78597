use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{parse_datetime, parse_datetime_opt, DbPool};
use super::records::DownloadRecord;
use crate::error::{CoreError, CoreResult};
use crate::models::{Download, DownloadStatus, RequestKind};
use crate::schema::downloads;
use crate::with_conn;

impl TryFrom<DownloadRecord> for Download {
    type Error = CoreError;

    fn try_from(r: DownloadRecord) -> CoreResult<Self> {
        Ok(Download {
            id: r.id,
            request_id: r.request_id,
            torrent_hash: r.torrent_hash,
            torrent_name: r.torrent_name,
            media_kind: RequestKind::from_str(&r.media_kind)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad media kind")))?,
            status: DownloadStatus::from_str(&r.status)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad download status")))?,
            progress: r.progress,
            save_path: r.save_path,
            content_path: r.content_path,
            size: r.size,
            created_at: parse_datetime(&r.created_at),
            completed_at: parse_datetime_opt(r.completed_at),
        })
    }
}

fn to_record(d: &Download) -> DownloadRecord {
    DownloadRecord {
        id: d.id.clone(),
        request_id: d.request_id.clone(),
        torrent_hash: d.torrent_hash.clone(),
        torrent_name: d.torrent_name.clone(),
        media_kind: d.media_kind.as_str().to_string(),
        status: d.status.as_str().to_string(),
        progress: d.progress,
        save_path: d.save_path.clone(),
        content_path: d.content_path.clone(),
        size: d.size,
        created_at: d.created_at.to_rfc3339(),
        completed_at: d.completed_at.map(|t| t.to_rfc3339()),
    }
}

#[derive(Clone)]
pub struct DownloadRepository {
    pool: DbPool,
}

impl DownloadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> CoreResult<Option<Download>> {
        with_conn!(self.pool, conn, {
            let record = downloads::table
                .find(id)
                .first::<DownloadRecord>(&mut conn)
                .await
                .optional()?;
            record.map(Download::try_from).transpose()
        })
    }

    pub async fn get_by_torrent_hash(&self, torrent_hash: &str) -> CoreResult<Option<Download>> {
        with_conn!(self.pool, conn, {
            let record = downloads::table
                .filter(downloads::torrent_hash.eq(torrent_hash))
                .first::<DownloadRecord>(&mut conn)
                .await
                .optional()?;
            record.map(Download::try_from).transpose()
        })
    }

    pub async fn list_by_status(&self, status: DownloadStatus) -> CoreResult<Vec<Download>> {
        with_conn!(self.pool, conn, {
            let records = downloads::table
                .filter(downloads::status.eq(status.as_str()))
                .load::<DownloadRecord>(&mut conn)
                .await?;
            records.into_iter().map(Download::try_from).collect()
        })
    }

    pub async fn insert(&self, download: &Download) -> CoreResult<()> {
        let record = to_record(download);
        with_conn!(self.pool, conn, {
            diesel::insert_into(downloads::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn save(&self, download: &Download) -> CoreResult<()> {
        let record = to_record(download);
        with_conn!(self.pool, conn, {
            diesel::update(downloads::table.find(&download.id))
                .set((
                    downloads::status.eq(&record.status),
                    downloads::progress.eq(record.progress),
                    downloads::content_path.eq(&record.content_path),
                    downloads::size.eq(record.size),
                    downloads::completed_at.eq(&record.completed_at),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }
}
