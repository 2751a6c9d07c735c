use std::future::Future;

use reqwest::{Client, Url};

/// How a single GET can fail once the request has been handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote answered with a status >= 400.
    Status(u16),
    /// Connect, send or body read failed.
    Io(String),
}

impl core::error::Error for TransportError {}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Status(code) => write!(f, "remote server code = {code}"),
            TransportError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

/// Performs one GET and returns the body as text.
///
/// Implementations must not apply deadlines of their own: the fetch task races the
/// returned future against its deadline and drops it when it loses.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: Url) -> impl Future<Output = Result<String, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::ClientBuilder::new().no_proxy().build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: Url) -> Result<String, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Io(format!("get url: {e}")))?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(TransportError::Status(status.as_u16()));
        }

        resp.text()
            .await
            .map_err(|e| TransportError::Io(format!("text: {e}")))
    }
}
