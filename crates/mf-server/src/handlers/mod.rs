//! HTTP request handlers (spec.md §6 "HTTP/RPC surface"), grouped one
//! module per resource noun the way `foia-server::handlers` groups by
//! page/API concern.

mod executions;
mod health;
mod requests;
mod templates;
mod workers;

pub use executions::{cancel_execution, get_execution, list_executions, pause_execution, resume_execution};
pub use health::health;
pub use requests::{cancel_request, create_request, get_request, list_requests, retry_request};
pub use templates::{create_template, delete_template, list_templates, update_template};
pub use workers::{get_worker, list_workers};
