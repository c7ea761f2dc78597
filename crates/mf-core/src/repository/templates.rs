use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{parse_datetime, DbPool};
use super::records::TemplateRecord;
use crate::error::CoreResult;
use crate::schema::templates;
use crate::with_conn;

/// A named, versioned pipeline step tree (spec.md §3 "Template"). The step
/// tree itself stays opaque JSON here; `mf-engine` owns its shape.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub media_kind: String,
    pub steps: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TemplateRecord> for Template {
    type Error = crate::error::CoreError;

    fn try_from(r: TemplateRecord) -> CoreResult<Self> {
        Ok(Template {
            id: r.id,
            name: r.name,
            media_kind: r.media_kind,
            steps: serde_json::from_str(&r.steps)?,
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        })
    }
}

fn to_record(t: &Template) -> CoreResult<TemplateRecord> {
    Ok(TemplateRecord {
        id: t.id.clone(),
        name: t.name.clone(),
        media_kind: t.media_kind.clone(),
        steps: serde_json::to_string(&t.steps)?,
        created_at: t.created_at.to_rfc3339(),
        updated_at: t.updated_at.to_rfc3339(),
    })
}

#[derive(Clone)]
pub struct TemplateRepository {
    pool: DbPool,
}

impl TemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> CoreResult<Option<Template>> {
        with_conn!(self.pool, conn, {
            let record = templates::table
                .find(id)
                .first::<TemplateRecord>(&mut conn)
                .await
                .optional()?;
            record.map(Template::try_from).transpose()
        })
    }

    pub async fn list(&self) -> CoreResult<Vec<Template>> {
        with_conn!(self.pool, conn, {
            let records = templates::table
                .order(templates::name.asc())
                .load::<TemplateRecord>(&mut conn)
                .await?;
            records.into_iter().map(Template::try_from).collect()
        })
    }

    pub async fn insert(&self, template: &Template) -> CoreResult<()> {
        let record = to_record(template)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(templates::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Insert-or-replace by id. Templates are immutable at execution time
    /// (spec.md §3: in-flight executions hold their own snapshot), so an
    /// update here only ever affects future `start_execution` calls.
    pub async fn upsert(&self, template: &Template) -> CoreResult<()> {
        use diesel::upsert::excluded;
        let record = to_record(template)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(templates::table)
                .values(&record)
                .on_conflict(templates::id)
                .do_update()
                .set((
                    templates::name.eq(excluded(templates::name)),
                    templates::media_kind.eq(excluded(templates::media_kind)),
                    templates::steps.eq(excluded(templates::steps)),
                    templates::updated_at.eq(excluded(templates::updated_at)),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn delete(&self, id: &str) -> CoreResult<bool> {
        with_conn!(self.pool, conn, {
            let rows = diesel::delete(templates::table.find(id))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }
}
