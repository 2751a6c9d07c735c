use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

mod cmd;
mod config;
mod error;
mod init;

pub mod fetch;
pub mod serve;

pub use cmd::Args;
pub use config::Config;
pub use error::*;
pub use fetch::{FetchContext, FetchOutcome, Orchestrator, ReqwestTransport, Transport, UrlResult};
pub use init::shutdown::GracefulShutdown;
pub use serve::FetchServer;

pub async fn run() -> Result<()> {
    let args = init::cmd::init()?;
    let config = Config::resolve(&args)?;
    log::debug!("{:?}", config);

    let shutdown = init::shutdown::init()?;

    let tcp_listener = TcpListener::bind(config.addr).await?;
    log::info!("Server listen on: http://{}", tcp_listener.local_addr()?);

    let transport = Arc::new(ReqwestTransport::new()?);
    FetchServer::new(transport, &config)
        .serve(tcp_listener, shutdown)
        .await?;
    log::info!("Shutdown complete.");
    Ok(())
}
