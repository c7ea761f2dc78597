// Diesel table definitions for the SQLite state store.
//
// JSON-shaped columns (`context`, `step_context`, `steps`, `capabilities`,
// `targets`, `requested_seasons`, `requested_episodes`) are stored as
// `Text` and serialized/deserialized through `serde_json` at the
// repository boundary, matching the teacher's `schema.rs` convention.

diesel::table! {
    requests (id) {
        id -> Text,
        kind -> Text,
        tmdb_id -> BigInt,
        title -> Text,
        year -> Nullable<Integer>,
        requested_seasons -> Nullable<Text>,
        requested_episodes -> Nullable<Text>,
        targets -> Text,
        status -> Text,
        progress -> Float,
        error -> Nullable<Text>,
        created_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    templates (id) {
        id -> Text,
        name -> Text,
        media_kind -> Text,
        steps -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    pipeline_executions (id) {
        id -> Text,
        request_id -> Text,
        template_id -> Text,
        status -> Text,
        current_step -> Integer,
        steps -> Text,
        context -> Text,
        parent_execution_id -> Nullable<Text>,
        episode_id -> Nullable<Text>,
        pause_reason -> Nullable<Text>,
        started_at -> Text,
        completed_at -> Nullable<Text>,
        error -> Nullable<Text>,
    }
}

diesel::table! {
    step_executions (id) {
        id -> Text,
        execution_id -> Text,
        step_order -> Integer,
        step_type -> Text,
        status -> Text,
        started_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
        progress -> Float,
        output -> Nullable<Text>,
        error -> Nullable<Text>,
    }
}

diesel::table! {
    processing_items (id) {
        id -> Text,
        request_id -> Text,
        item_type -> Text,
        tmdb_id -> BigInt,
        title -> Text,
        season -> Nullable<Integer>,
        episode -> Nullable<Integer>,
        status -> Text,
        progress -> Float,
        current_step -> Nullable<Text>,
        step_context -> Text,
        download_id -> Nullable<Text>,
        encoding_job_id -> Nullable<Text>,
        source_file_path -> Nullable<Text>,
        cooldown_ends_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    downloads (id) {
        id -> Text,
        request_id -> Text,
        torrent_hash -> Text,
        torrent_name -> Text,
        media_kind -> Text,
        status -> Text,
        progress -> Float,
        save_path -> Text,
        content_path -> Nullable<Text>,
        size -> Nullable<BigInt>,
        created_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    encoder_workers (id) {
        id -> Text,
        status -> Text,
        current_jobs -> Integer,
        max_concurrent -> Integer,
        blocked_until -> Nullable<Text>,
        last_heartbeat_at -> Text,
        capabilities -> Text,
    }
}

diesel::table! {
    encoder_assignments (id) {
        id -> Text,
        job_id -> Text,
        encoder_id -> Nullable<Text>,
        status -> Text,
        input_path -> Text,
        output_path -> Nullable<Text>,
        attempt -> Integer,
        max_attempts -> Integer,
        sent_at -> Nullable<Text>,
        started_at -> Nullable<Text>,
        last_progress_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
        progress -> Float,
        output_size -> Nullable<BigInt>,
        compression_ratio -> Nullable<Float>,
        encode_duration_secs -> Nullable<BigInt>,
        error -> Nullable<Text>,
    }
}

diesel::table! {
    rate_limit_buckets (indexer) {
        indexer -> Text,
        max_requests -> Integer,
        window_secs -> Integer,
        current_delay_ms -> Integer,
        in_backoff -> Integer,
        total_requests -> BigInt,
        rate_limit_hits -> BigInt,
        updated_at -> Text,
    }
}

diesel::table! {
    rate_limit_records (id) {
        id -> Integer,
        indexer -> Text,
        requested_at -> Text,
    }
}

diesel::table! {
    secrets (id) {
        id -> Text,
        label -> Text,
        ciphertext -> Binary,
        nonce -> Binary,
        salt -> Binary,
        created_at -> Text,
    }
}
