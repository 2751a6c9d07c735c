use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::serve::Response;

/// Admission gate in front of the request handler, scoped to one server instance.
///
/// Over-limit requests are refused right away instead of queueing. A limit of zero
/// refuses everything.
#[derive(Debug, Clone)]
pub struct Limiter {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Limiter {
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// The returned permit must be held for as long as the request is being handled.
    pub fn try_admit(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().try_acquire_owned().ok()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn rejection() -> Response {
        Response::new(503)
            .with_header("Retry-After", "600")
            .with_header("Connection", "close")
    }
}
