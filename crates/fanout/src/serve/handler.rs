use std::{sync::Arc, time::Duration};

use crate::{
    ErrorKind, FetchError,
    config::Config,
    fetch::{FetchContext, Orchestrator, Transport},
    serve::Response,
};

/// Turns a JSON array of URLs into a JSON array of `{url, result}` objects.
#[derive(Debug)]
pub struct FetchHandler<T> {
    transport: Arc<T>,
    max_urls: usize,
    concurrency: usize,
    request_timeout: Option<Duration>,
}

impl<T> Clone for FetchHandler<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            max_urls: self.max_urls,
            concurrency: self.concurrency,
            request_timeout: self.request_timeout,
        }
    }
}

impl<T: Transport> FetchHandler<T> {
    pub fn new(transport: Arc<T>, config: &Config) -> Self {
        Self {
            transport,
            max_urls: config.max_urls,
            concurrency: config.concurrency,
            request_timeout: config.request_timeout(),
        }
    }

    /// `None` when the request context was cancelled on purpose (forced shutdown):
    /// nobody is waiting for an answer any more.
    pub async fn handle(&self, body: &[u8], ctx: &FetchContext) -> Option<Response> {
        let urls: Vec<String> = match serde_json::from_slice(body) {
            Ok(urls) => urls,
            Err(e) => return Some(Response::plain_text(400, &format!("{e}: json error"))),
        };

        if urls.len() > self.max_urls {
            log::debug!("refusing {} urls, max is {}", urls.len(), self.max_urls);
            return Some(Response::plain_text(413, ""));
        }

        let ctx = match self.request_timeout {
            Some(timeout) => ctx.child().with_timeout(timeout),
            None => ctx.child(),
        };

        let outcome = Orchestrator::new(self.transport.clone(), urls, self.concurrency)
            .drive(&ctx)
            .await;

        match outcome.into_result() {
            Ok(results) if ctx.is_cancelled() => {
                log::debug!("request cancelled after {} results", results.len());
                None
            }
            Ok(results) => Some(Response::json(200, &results)),
            Err(err) => Some(Response::plain_text(status_for(&err), &err.to_string())),
        }
    }
}

pub fn status_for(err: &FetchError) -> u16 {
    match err.kind() {
        ErrorKind::BadUrl => 400,
        ErrorKind::Unprocessable => 422,
        ErrorKind::Timeout => 408,
        ErrorKind::Internal => 500,
    }
}
