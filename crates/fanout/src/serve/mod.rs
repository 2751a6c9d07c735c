use std::{net::SocketAddr, sync::Arc, time::Instant};

use anyhow::Result;
use tokio::{
    io::{AsyncWriteExt, BufWriter},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    fetch::{FetchContext, Transport},
    init::shutdown::{GracefulShutdown, SHUTDOWN_GRACE},
};

mod handler;
mod limiter;
mod request;
mod response;

pub use handler::*;
pub use limiter::*;
pub use request::*;
pub use response::*;

/// HTTP/1.1 front end: one request per connection, admission-limited, drained on shutdown.
#[derive(Debug)]
pub struct FetchServer<T> {
    handler: FetchHandler<T>,
    limiter: Limiter,
    /// Parent of every request context; cancelled when the grace period runs out.
    root: CancellationToken,
}

impl<T: Transport> FetchServer<T> {
    pub fn new(transport: Arc<T>, config: &Config) -> Self {
        Self {
            handler: FetchHandler::new(transport, config),
            limiter: Limiter::new(config.limit),
            root: CancellationToken::new(),
        }
    }

    pub async fn serve(&self, tcp_listener: TcpListener, shutdown: GracefulShutdown) -> Result<()> {
        loop {
            let (stream, peer) = tokio::select! {
                accepted = tcp_listener.accept() => accepted?,
                _ = shutdown.wait_shutting_down() => break,
            };
            log::debug!("Accepted connection from {peer}");

            let conn = Connection {
                handler: self.handler.clone(),
                limiter: self.limiter.clone(),
                ctx: FetchContext::with_token(self.root.child_token()),
                shutdown: shutdown.clone(),
            };
            // counted before spawning so the drain below can't miss it
            let inflight = shutdown.inflight_guard();
            tokio::spawn(async move {
                let _inflight = inflight;
                if let Err(e) = conn.handle(stream, peer).await {
                    log::debug!("Connection {peer} closed with error: {e:#}");
                }
            });
        }
        drop(tcp_listener);

        if !shutdown.drain(SHUTDOWN_GRACE).await {
            log::warn!(
                "{} requests still running after {:?}, cancelling them",
                shutdown.inflight(),
                SHUTDOWN_GRACE
            );
            self.root.cancel();
        }
        Ok(())
    }
}

struct Connection<T> {
    handler: FetchHandler<T>,
    limiter: Limiter,
    ctx: FetchContext,
    shutdown: GracefulShutdown,
}

impl<T: Transport> Connection<T> {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let started = Instant::now();
        let (mut rx, tx) = stream.into_split();
        let mut tx = BufWriter::new(tx);

        let request = match read_request(&mut rx, &self.shutdown).await {
            Ok(Some(req)) => req,
            Ok(None) => return Ok(()),
            Err(e) => {
                let resp = Response::plain_text(e.status(), &e.to_string());
                let _ = tx.write_all(&resp.to_bytes()).await;
                let _ = tx.flush().await;
                return Ok(());
            }
        };

        let response = match self.limiter.try_admit() {
            Some(_permit) => self.handler.handle(&request.body, &self.ctx).await,
            None => {
                log::debug!("peer={peer} over limit of {}", self.limiter.limit());
                Some(Limiter::rejection())
            }
        };
        let Some(response) = response else {
            log::info!(
                "peer={} method={} path={} cancelled elapsed={}ms",
                peer,
                request.method,
                request.path,
                started.elapsed().as_millis()
            );
            return Ok(());
        };

        tx.write_all(&response.to_bytes()).await?;
        tx.flush().await?;
        tx.into_inner().shutdown().await?;

        log::info!(
            "peer={} method={} path={} status={} elapsed={}ms",
            peer,
            request.method,
            request.path,
            response.status,
            started.elapsed().as_millis()
        );
        Ok(())
    }
}
