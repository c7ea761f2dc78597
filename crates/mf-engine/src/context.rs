//! The in-memory context accumulator carried between steps (spec.md §4.1
//! "Pipeline Context"), implemented as Design Note 9 recommends: a typed
//! discriminated union per step kind rather than an ad-hoc JSON map, with
//! a JSON serialization at the persistence boundary only.

use serde::{Deserialize, Serialize};

use crate::template::StepType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutput {
    pub release_id: Option<String>,
    pub indexer: Option<String>,
    pub torrent_name: Option<String>,
    pub torrent_hash: Option<String>,
    pub season_pack: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadOutput {
    pub download_id: Option<String>,
    pub content_path: Option<String>,
    pub source_file_path: Option<String>,
    pub already_present: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeOutput {
    pub encoding_job_id: Option<String>,
    pub encoded_files: Vec<String>,
    pub compression_ratio: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliverOutput {
    pub delivered_targets: Vec<String>,
    pub delivered_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalOutput {
    pub approved: Option<bool>,
    pub decided_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationOutput {
    pub sent: bool,
    pub sink: Option<String>,
}

/// One step kind's output, namespaced per spec.md §4.1's "step kinds
/// should place their outputs under disjoint namespaces" guidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextSlice {
    Search(SearchOutput),
    Download(DownloadOutput),
    Encode(EncodeOutput),
    Deliver(DeliverOutput),
    Approval(ApprovalOutput),
    Notification(NotificationOutput),
}

impl ContextSlice {
    pub fn kind(&self) -> StepType {
        match self {
            Self::Search(_) => StepType::Search,
            Self::Download(_) => StepType::Download,
            Self::Encode(_) => StepType::Encode,
            Self::Deliver(_) => StepType::Deliver,
            Self::Approval(_) => StepType::Approval,
            Self::Notification(_) => StepType::Notification,
        }
    }
}

/// The execution's shared JSON accumulator. `request` holds the seed
/// fields copied in at `startExecution` (spec.md §4.2 step 3); the rest
/// are optional per-kind slices merged in as steps complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    #[serde(default)]
    pub request: serde_json::Value,
    #[serde(default)]
    pub search: Option<SearchOutput>,
    #[serde(default)]
    pub download: Option<DownloadOutput>,
    #[serde(default)]
    pub encode: Option<EncodeOutput>,
    #[serde(default)]
    pub deliver: Option<DeliverOutput>,
    #[serde(default)]
    pub approval: Option<ApprovalOutput>,
    #[serde(default)]
    pub notification: Option<NotificationOutput>,
}

impl PipelineContext {
    pub fn seeded(request: serde_json::Value) -> Self {
        Self {
            request,
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Apply one step's output to this context, shallow-merging into the
    /// namespace the step kind owns. Replaces any prior slice of the same
    /// kind outright — this *is* the "last-writer-wins" rule, just scoped
    /// to a single namespace instead of arbitrary top-level keys.
    pub fn apply_slice(&mut self, slice: ContextSlice) {
        match slice {
            ContextSlice::Search(s) => self.search = Some(s),
            ContextSlice::Download(d) => self.download = Some(d),
            ContextSlice::Encode(e) => self.encode = Some(e),
            ContextSlice::Deliver(d) => self.deliver = Some(d),
            ContextSlice::Approval(a) => self.approval = Some(a),
            ContextSlice::Notification(n) => self.notification = Some(n),
        }
    }

    /// Merge a sibling branch's finished context into this one. Used when
    /// parallel children reconverge at their parent (spec.md §4.2:
    /// "Merge sibling contexts when all complete; on key conflict ...
    /// last finisher wins"). Callers apply this in completion order so
    /// the last caller's values win.
    pub fn merge(&mut self, other: &PipelineContext) {
        if other.search.is_some() {
            self.search = other.search.clone();
        }
        if other.download.is_some() {
            self.download = other.download.clone();
        }
        if other.encode.is_some() {
            self.encode = other.encode.clone();
        }
        if other.deliver.is_some() {
            self.deliver = other.deliver.clone();
        }
        if other.approval.is_some() {
            self.approval = other.approval.clone();
        }
        if other.notification.is_some() {
            self.notification = other.notification.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_slice_namespaces_by_kind() {
        let mut ctx = PipelineContext::default();
        ctx.apply_slice(ContextSlice::Search(SearchOutput {
            release_id: Some("abc".into()),
            ..Default::default()
        }));
        assert_eq!(ctx.search.unwrap().release_id.as_deref(), Some("abc"));
        assert!(ctx.download.is_none());
    }

    #[test]
    fn merge_is_last_writer_wins_per_namespace() {
        let mut a = PipelineContext::default();
        a.apply_slice(ContextSlice::Download(DownloadOutput {
            download_id: Some("d1".into()),
            ..Default::default()
        }));
        let mut b = PipelineContext::default();
        b.apply_slice(ContextSlice::Download(DownloadOutput {
            download_id: Some("d2".into()),
            ..Default::default()
        }));
        a.merge(&b);
        assert_eq!(a.download.unwrap().download_id.as_deref(), Some("d2"));
    }

    #[test]
    fn round_trips_through_json() {
        let mut ctx = PipelineContext::seeded(serde_json::json!({"title": "Arrival"}));
        ctx.apply_slice(ContextSlice::Encode(EncodeOutput {
            encoding_job_id: Some("job1".into()),
            ..Default::default()
        }));
        let json = ctx.to_json();
        let restored = PipelineContext::from_json(json);
        assert_eq!(restored.request["title"], "Arrival");
        assert_eq!(restored.encode.unwrap().encoding_job_id.as_deref(), Some("job1"));
    }
}
