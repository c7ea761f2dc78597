//! Raw Diesel row types. Every JSON-shaped column round-trips through
//! `serde_json` in the `TryFrom` impls in the sibling repository modules,
//! never here — this module only describes column shapes.

use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = requests)]
pub struct RequestRecord {
    pub id: String,
    pub kind: String,
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub requested_seasons: Option<String>,
    pub requested_episodes: Option<String>,
    pub targets: String,
    pub status: String,
    pub progress: f32,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = templates)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub media_kind: String,
    pub steps: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = pipeline_executions)]
pub struct PipelineExecutionRecord {
    pub id: String,
    pub request_id: String,
    pub template_id: String,
    pub status: String,
    pub current_step: i32,
    pub steps: String,
    pub context: String,
    pub parent_execution_id: Option<String>,
    pub episode_id: Option<String>,
    pub pause_reason: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = step_executions)]
pub struct StepExecutionRecord {
    pub id: String,
    pub execution_id: String,
    pub step_order: i32,
    pub step_type: String,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub progress: f32,
    pub output: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = processing_items)]
pub struct ProcessingItemRecord {
    pub id: String,
    pub request_id: String,
    pub item_type: String,
    pub tmdb_id: i64,
    pub title: String,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub status: String,
    pub progress: f32,
    pub current_step: Option<String>,
    pub step_context: String,
    pub download_id: Option<String>,
    pub encoding_job_id: Option<String>,
    pub source_file_path: Option<String>,
    pub cooldown_ends_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = downloads)]
pub struct DownloadRecord {
    pub id: String,
    pub request_id: String,
    pub torrent_hash: String,
    pub torrent_name: String,
    pub media_kind: String,
    pub status: String,
    pub progress: f32,
    pub save_path: String,
    pub content_path: Option<String>,
    pub size: Option<i64>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = encoder_workers)]
pub struct EncoderWorkerRecord {
    pub id: String,
    pub status: String,
    pub current_jobs: i32,
    pub max_concurrent: i32,
    pub blocked_until: Option<String>,
    pub last_heartbeat_at: String,
    pub capabilities: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = encoder_assignments)]
pub struct EncoderAssignmentRecord {
    pub id: String,
    pub job_id: String,
    pub encoder_id: Option<String>,
    pub status: String,
    pub input_path: String,
    pub output_path: Option<String>,
    pub attempt: i32,
    pub max_attempts: i32,
    pub sent_at: Option<String>,
    pub started_at: Option<String>,
    pub last_progress_at: Option<String>,
    pub completed_at: Option<String>,
    pub progress: f32,
    pub output_size: Option<i64>,
    pub compression_ratio: Option<f32>,
    pub encode_duration_secs: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = secrets)]
pub struct SecretRecord {
    pub id: String,
    pub label: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub salt: Vec<u8>,
    pub created_at: String,
}
