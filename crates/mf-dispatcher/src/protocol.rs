//! Encoder wire protocol (spec.md §6): a JSON frame per message, tagged by
//! `type`, with an `encoderId`/`jobId` scope and a type-specific payload.

use serde::{Deserialize, Serialize};

/// Capabilities an encoder declares in its HELLO (spec.md §4.4 "capability
/// match").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub codecs: Vec<String>,
    #[serde(default)]
    pub accessible_paths: Vec<String>,
}

/// A frame sent or received over the encoder connection. Unknown fields
/// are ignored on deserialize, matching spec.md §6's tolerance for
/// forward-compatible additions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frame {
    /// Encoder -> dispatcher: identify.
    Hello {
        encoder_id: String,
        max_concurrent: i32,
        #[serde(default)]
        capabilities: Capabilities,
    },
    /// Dispatcher -> encoder: job assignment.
    Offer {
        job_id: String,
        input_path: String,
        #[serde(default)]
        config: serde_json::Value,
        output_path: String,
    },
    /// Encoder -> dispatcher: accepted an OFFER.
    Accept { job_id: String },
    /// Encoder -> dispatcher: declined an OFFER.
    Reject { job_id: String, reason: String },
    /// Encoder -> dispatcher: streaming progress.
    Progress {
        job_id: String,
        pct: f32,
        #[serde(default)]
        eta_secs: Option<i64>,
    },
    /// Encoder -> dispatcher: job finished.
    Completed {
        job_id: String,
        output_path: String,
        size: i64,
        compression_ratio: f32,
        duration_secs: i64,
    },
    /// Encoder -> dispatcher: job failed.
    Failed { job_id: String, error: String },
    /// Encoder -> dispatcher: liveness.
    Heartbeat,
    /// Dispatcher -> encoder: abort a job.
    Cancel { job_id: String },
    /// Dispatcher -> encoder: liveness probe.
    Ping,
}

/// Reject reasons the dispatcher treats as a capacity signal rather than
/// a job-specific failure (spec.md §4.4 "capacity-error handling").
pub fn is_capacity_reason(reason: &str) -> bool {
    let r = reason.to_ascii_lowercase();
    r.contains("capacity") || r.contains("no available encoder") || r.contains("disconnected")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips_through_json() {
        let frame = Frame::Hello {
            encoder_id: "w1".into(),
            max_concurrent: 2,
            capabilities: Capabilities {
                codecs: vec!["h265".into()],
                accessible_paths: vec!["/data".into()],
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "HELLO");
        let restored: Frame = serde_json::from_value(json).unwrap();
        matches!(restored, Frame::Hello { .. });
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = serde_json::json!({
            "type": "HEARTBEAT",
            "unexpectedField": "whatever",
        });
        let frame: Frame = serde_json::from_value(raw).unwrap();
        assert!(matches!(frame, Frame::Heartbeat));
    }

    #[test]
    fn capacity_reasons_are_recognized() {
        assert!(is_capacity_reason("encoder at capacity"));
        assert!(is_capacity_reason("no available encoder"));
        assert!(!is_capacity_reason("codec unsupported"));
    }
}
