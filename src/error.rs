use thiserror::Error;

/// Errors surfaced synchronously by the request entry point.
///
/// Everything else (transport failures, timeouts, non-2xx statuses,
/// cancellation) is delivered asynchronously through the pipeline's
/// `error`, `timeout` and `abort` events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("URL option is required")]
    UrlRequired,
    #[error("transport failure: {0}")]
    Transport(String),
}
