use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(
            CreateTable::new("requests")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("kind", FieldType::Text).not_null())
                .add_field(Field::new("tmdb_id", FieldType::Integer).not_null())
                .add_field(Field::new("title", FieldType::Text).not_null())
                .add_field(Field::new("year", FieldType::Integer))
                .add_field(Field::new("requested_seasons", FieldType::Text))
                .add_field(Field::new("requested_episodes", FieldType::Text))
                .add_field(Field::new("targets", FieldType::Text).not_null().default("'[]'"))
                .add_field(Field::new("status", FieldType::Text).not_null().default("'pending'"))
                .add_field(Field::new("progress", FieldType::Real).not_null().default("0"))
                .add_field(Field::new("error", FieldType::Text))
                .add_field(Field::new("created_at", FieldType::Text).not_null())
                .add_field(Field::new("completed_at", FieldType::Text)),
        )
        .operation(
            CreateTable::new("templates")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("name", FieldType::Text).not_null())
                .add_field(Field::new("media_kind", FieldType::Text).not_null())
                .add_field(Field::new("steps", FieldType::Text).not_null())
                .add_field(Field::new("created_at", FieldType::Text).not_null())
                .add_field(Field::new("updated_at", FieldType::Text).not_null()),
        )
        .operation(
            CreateTable::new("pipeline_executions")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("request_id", FieldType::Text).not_null().references("requests", "id"))
                .add_field(Field::new("template_id", FieldType::Text).not_null().references("templates", "id"))
                .add_field(Field::new("status", FieldType::Text).not_null().default("'running'"))
                .add_field(Field::new("current_step", FieldType::Integer).not_null().default("0"))
                .add_field(Field::new("steps", FieldType::Text).not_null())
                .add_field(Field::new("context", FieldType::Text).not_null().default("'{}'"))
                .add_field(Field::new("parent_execution_id", FieldType::Text))
                .add_field(Field::new("episode_id", FieldType::Text))
                .add_field(Field::new("pause_reason", FieldType::Text))
                .add_field(Field::new("started_at", FieldType::Text).not_null())
                .add_field(Field::new("completed_at", FieldType::Text))
                .add_field(Field::new("error", FieldType::Text)),
        )
        .operation(
            CreateTable::new("step_executions")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("execution_id", FieldType::Text).not_null().references("pipeline_executions", "id"))
                .add_field(Field::new("step_order", FieldType::Integer).not_null())
                .add_field(Field::new("step_type", FieldType::Text).not_null())
                .add_field(Field::new("status", FieldType::Text).not_null().default("'pending'"))
                .add_field(Field::new("started_at", FieldType::Text))
                .add_field(Field::new("completed_at", FieldType::Text))
                .add_field(Field::new("progress", FieldType::Real).not_null().default("0"))
                .add_field(Field::new("output", FieldType::Text))
                .add_field(Field::new("error", FieldType::Text)),
        )
        .operation(
            CreateTable::new("processing_items")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("request_id", FieldType::Text).not_null().references("requests", "id"))
                .add_field(Field::new("item_type", FieldType::Text).not_null())
                .add_field(Field::new("tmdb_id", FieldType::Integer).not_null())
                .add_field(Field::new("title", FieldType::Text).not_null())
                .add_field(Field::new("season", FieldType::Integer))
                .add_field(Field::new("episode", FieldType::Integer))
                .add_field(Field::new("status", FieldType::Text).not_null().default("'pending'"))
                .add_field(Field::new("progress", FieldType::Real).not_null().default("0"))
                .add_field(Field::new("current_step", FieldType::Text))
                .add_field(Field::new("step_context", FieldType::Text).not_null().default("'{}'"))
                .add_field(Field::new("download_id", FieldType::Text))
                .add_field(Field::new("encoding_job_id", FieldType::Text))
                .add_field(Field::new("source_file_path", FieldType::Text))
                .add_field(Field::new("cooldown_ends_at", FieldType::Text))
                .add_field(Field::new("last_error", FieldType::Text))
                .add_field(Field::new("created_at", FieldType::Text).not_null())
                .add_field(Field::new("updated_at", FieldType::Text).not_null()),
        )
        .operation(
            CreateTable::new("downloads")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("request_id", FieldType::Text).not_null().references("requests", "id"))
                .add_field(Field::new("torrent_hash", FieldType::Text).not_null())
                .add_field(Field::new("torrent_name", FieldType::Text).not_null())
                .add_field(Field::new("media_kind", FieldType::Text).not_null())
                .add_field(Field::new("status", FieldType::Text).not_null().default("'queued'"))
                .add_field(Field::new("progress", FieldType::Real).not_null().default("0"))
                .add_field(Field::new("save_path", FieldType::Text).not_null())
                .add_field(Field::new("content_path", FieldType::Text))
                .add_field(Field::new("size", FieldType::Integer))
                .add_field(Field::new("created_at", FieldType::Text).not_null())
                .add_field(Field::new("completed_at", FieldType::Text)),
        )
        .operation(
            CreateTable::new("encoder_workers")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("status", FieldType::Text).not_null().default("'idle'"))
                .add_field(Field::new("current_jobs", FieldType::Integer).not_null().default("0"))
                .add_field(Field::new("max_concurrent", FieldType::Integer).not_null().default("1"))
                .add_field(Field::new("blocked_until", FieldType::Text))
                .add_field(Field::new("last_heartbeat_at", FieldType::Text).not_null())
                .add_field(Field::new("capabilities", FieldType::Text).not_null().default("'{}'")),
        )
        .operation(
            CreateTable::new("encoder_assignments")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("job_id", FieldType::Text).not_null())
                .add_field(Field::new("encoder_id", FieldType::Text).references("encoder_workers", "id"))
                .add_field(Field::new("status", FieldType::Text).not_null().default("'pending'"))
                .add_field(Field::new("input_path", FieldType::Text).not_null())
                .add_field(Field::new("output_path", FieldType::Text))
                .add_field(Field::new("attempt", FieldType::Integer).not_null().default("1"))
                .add_field(Field::new("max_attempts", FieldType::Integer).not_null().default("3"))
                .add_field(Field::new("sent_at", FieldType::Text))
                .add_field(Field::new("started_at", FieldType::Text))
                .add_field(Field::new("last_progress_at", FieldType::Text))
                .add_field(Field::new("completed_at", FieldType::Text))
                .add_field(Field::new("progress", FieldType::Real).not_null().default("0"))
                .add_field(Field::new("output_size", FieldType::Integer))
                .add_field(Field::new("compression_ratio", FieldType::Real))
                .add_field(Field::new("encode_duration_secs", FieldType::Integer))
                .add_field(Field::new("error", FieldType::Text)),
        )
        .operation(
            CreateTable::new("rate_limit_buckets")
                .add_field(Field::new("indexer", FieldType::Text).primary_key())
                .add_field(Field::new("max_requests", FieldType::Integer).not_null())
                .add_field(Field::new("window_secs", FieldType::Integer).not_null())
                .add_field(Field::new("current_delay_ms", FieldType::Integer).not_null().default("0"))
                .add_field(Field::new("in_backoff", FieldType::Integer).not_null().default("0"))
                .add_field(Field::new("total_requests", FieldType::Integer).not_null().default("0"))
                .add_field(Field::new("rate_limit_hits", FieldType::Integer).not_null().default("0"))
                .add_field(Field::new("updated_at", FieldType::Text).not_null()),
        )
        .operation(
            RunSql::new(
                r#"CREATE TABLE IF NOT EXISTS rate_limit_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    indexer TEXT NOT NULL,
    requested_at TEXT NOT NULL
)"#,
            ),
        )
        .operation(
            CreateTable::new("secrets")
                .add_field(Field::new("id", FieldType::Text).primary_key())
                .add_field(Field::new("label", FieldType::Text).not_null())
                .add_field(Field::new("ciphertext", FieldType::Blob).not_null())
                .add_field(Field::new("nonce", FieldType::Blob).not_null())
                .add_field(Field::new("salt", FieldType::Blob).not_null())
                .add_field(Field::new("created_at", FieldType::Text).not_null()),
        )
        .operation(AddIndex::new("pipeline_executions", Index::new("idx_executions_request").column("request_id")))
        .operation(AddIndex::new("pipeline_executions", Index::new("idx_executions_status").column("status")))
        .operation(AddIndex::new("pipeline_executions", Index::new("idx_executions_parent").column("parent_execution_id")))
        .operation(AddIndex::new("step_executions", Index::new("idx_step_executions_execution").column("execution_id")))
        .operation(AddIndex::new("step_executions", Index::new("idx_step_executions_status").column("status")))
        .operation(AddIndex::new("processing_items", Index::new("idx_processing_items_request").column("request_id")))
        .operation(AddIndex::new("processing_items", Index::new("idx_processing_items_status").column("status")))
        .operation(AddIndex::new("processing_items", Index::new("idx_processing_items_download").column("download_id").filter("download_id IS NOT NULL")))
        .operation(AddIndex::new("downloads", Index::new("idx_downloads_request").column("request_id")))
        .operation(AddIndex::new("downloads", Index::new("idx_downloads_status").column("status")))
        .operation(AddIndex::new("encoder_assignments", Index::new("idx_assignments_job").column("job_id")))
        .operation(AddIndex::new("encoder_assignments", Index::new("idx_assignments_status").column("status")))
        .operation(AddIndex::new("encoder_assignments", Index::new("idx_assignments_encoder").column("encoder_id").filter("encoder_id IS NOT NULL")))
        .operation(AddIndex::new("rate_limit_records", Index::new("idx_rate_limit_records_indexer_time").column("indexer").column("requested_at")))
}
