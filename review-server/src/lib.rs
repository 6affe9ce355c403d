pub mod config;
pub mod error;
pub mod http;
pub mod search;
pub mod store;
pub mod workflow;

pub use error::{ErrorKind, ReviewError};
pub use workflow::ReviewWorkflow;

/// Shared state handed to every HTTP handler.
pub struct AppState {
    pub workflow: ReviewWorkflow,
}
