use std::sync::Arc;

use async_trait::async_trait;
use mf_core::models::EncoderAssignment;
use mf_core::repository::StateStore;

use crate::context::{ContextSlice, EncodeOutput, PipelineContext};
use crate::error::{EngineError, EngineResult};
use crate::registry::{ProgressSink, StepHandler, StepOutput};
use crate::template::StepType;

/// ENCODE: hands the downloaded file to the encoder dispatcher by
/// inserting a PENDING `EncoderAssignment` row, then pauses the branch.
/// `mf-dispatcher` owns actually offering the job to a worker and driving
/// it to COMPLETED/FAILED (spec.md §4.4).
pub struct EncodeHandler {
    pub store: Arc<StateStore>,
}

#[async_trait]
impl StepHandler for EncodeHandler {
    fn kind(&self) -> StepType {
        StepType::Encode
    }

    fn validate_config(&self, _config: &serde_json::Value) -> EngineResult<()> {
        Ok(())
    }

    async fn execute(
        &self,
        context: &serde_json::Value,
        config: &serde_json::Value,
        progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<StepOutput> {
        let ctx = PipelineContext::from_json(context.clone());

        if let Some(encode) = &ctx.encode {
            if !encode.encoded_files.is_empty() {
                progress.report(100.0).await;
                return Ok(StepOutput::ok(ContextSlice::Encode(encode.clone())));
            }
            if let Some(job_id) = &encode.encoding_job_id {
                if let Some(assignment) = self.store.encoders.get_assignment(job_id).await? {
                    use mf_core::models::EncoderAssignmentStatus as S;
                    match assignment.status {
                        S::Completed => {
                            progress.report(100.0).await;
                            let output_path = assignment.output_path.clone().unwrap_or_default();
                            return Ok(StepOutput::ok(ContextSlice::Encode(EncodeOutput {
                                encoding_job_id: Some(job_id.clone()),
                                encoded_files: vec![output_path],
                                compression_ratio: assignment.compression_ratio,
                            })));
                        }
                        S::Failed => {
                            return Ok(StepOutput::fail(
                                assignment.error.unwrap_or_else(|| "encode failed".into()),
                            ));
                        }
                        _ => return Ok(StepOutput::pause("awaiting encode completion")),
                    }
                }
            }
        }

        let download = ctx
            .download
            .clone()
            .ok_or_else(|| EngineError::InvalidConfig("ENCODE step requires DOWNLOAD output".into()))?;
        let input_path = download
            .content_path
            .or(download.source_file_path)
            .ok_or_else(|| EngineError::InvalidConfig("DOWNLOAD output missing a file path".into()))?;

        let output_path = config["output_path"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{input_path}.encoded"));
        let max_attempts = config["max_attempts"].as_i64().unwrap_or(3) as i32;

        // The assignment's own row id doubles as the logical job id: the
        // engine only ever tracks one assignment per ENCODE step, so there's
        // no need for a separate identifier (the dispatcher mutates this row
        // in place across retries rather than inserting new ones).
        let assignment_id = uuid::Uuid::new_v4().to_string();
        let mut assignment = EncoderAssignment::new(assignment_id.clone(), assignment_id.clone(), input_path, max_attempts);
        assignment.output_path = Some(output_path);
        self.store.encoders.insert_assignment(&assignment).await?;
        progress.report(10.0).await;

        Ok(StepOutput::pause("awaiting encode completion").with_data(ContextSlice::Encode(EncodeOutput {
            encoding_job_id: Some(assignment_id),
            encoded_files: vec![],
            compression_ratio: None,
        })))
    }
}
