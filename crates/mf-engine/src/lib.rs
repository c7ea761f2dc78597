//! The Pipeline Engine (spec.md §4.2, component C4): step registry, the
//! typed context accumulator, built-in step handlers, and the tree-walking
//! executor that drives a `PipelineExecution` from start to pause/fail/done.

pub mod context;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod registry;
pub mod template;

pub use context::{ContextSlice, PipelineContext};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use registry::{NullProgressSink, ProgressSink, StepHandler, StepHandlerFactory, StepOutput, StepRegistry};
pub use template::{ConditionRule, LogicalOp, Operator, Step, StepType};

use std::sync::Arc;

use mf_core::repository::StateStore;

use crate::handlers::{ApprovalHandler, DeliverHandler, DownloadHandler, EncodeHandler, NotificationHandler, SearchHandler};
use crate::ports::{DeliveryAdapter, DownloadClientAdapter, IndexerAdapter, NotificationDispatcher};

/// Build a registry with every built-in step handler wired to its
/// collaborators, the composition root spec.md §9 describes ("global
/// singletons ... injected once at startup").
pub fn default_registry(
    store: Arc<StateStore>,
    indexer: Arc<dyn IndexerAdapter>,
    download_client: Arc<dyn DownloadClientAdapter>,
    delivery: Arc<dyn DeliveryAdapter>,
    notifier: Arc<dyn NotificationDispatcher>,
    rate_limiter: mf_core::rate_limit::RateLimiter,
) -> EngineResult<StepRegistry> {
    let mut registry = StepRegistry::new();

    {
        let indexer = indexer.clone();
        let rate_limiter = rate_limiter.clone();
        registry.register(
            StepType::Search,
            Arc::new(move || {
                Box::new(SearchHandler {
                    indexer: indexer.clone(),
                    rate_limiter: rate_limiter.clone(),
                }) as Box<dyn StepHandler>
            }),
        )?;
    }

    {
        let store = store.clone();
        let download_client = download_client.clone();
        registry.register(
            StepType::Download,
            Arc::new(move || {
                Box::new(DownloadHandler {
                    store: store.clone(),
                    client: download_client.clone(),
                }) as Box<dyn StepHandler>
            }),
        )?;
    }

    {
        let store = store.clone();
        registry.register(
            StepType::Encode,
            Arc::new(move || Box::new(EncodeHandler { store: store.clone() }) as Box<dyn StepHandler>),
        )?;
    }

    {
        let delivery = delivery.clone();
        registry.register(
            StepType::Deliver,
            Arc::new(move || Box::new(DeliverHandler { delivery: delivery.clone() }) as Box<dyn StepHandler>),
        )?;
    }

    registry.register(
        StepType::Approval,
        Arc::new(|| Box::new(ApprovalHandler) as Box<dyn StepHandler>),
    )?;

    {
        let notifier = notifier.clone();
        registry.register(
            StepType::Notification,
            Arc::new(move || Box::new(NotificationHandler { dispatcher: notifier.clone() }) as Box<dyn StepHandler>),
        )?;
    }

    Ok(registry)
}
