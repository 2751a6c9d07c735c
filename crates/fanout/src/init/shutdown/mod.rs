use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use mea::latch::Latch;
use tokio::sync::Notify;

mod ctrlc;

/// How long in-flight requests may keep running after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub fn init() -> Result<GracefulShutdown> {
    let ctrlc = ctrlc::init()?;
    let shutdown = GracefulShutdown::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = ctrlc.await;
        log::info!(
            "Shutdown requested (Ctrl+C), draining {} in-flight requests...",
            on_signal.inflight()
        );
        on_signal.initiate();
    });
    Ok(shutdown)
}

/// Stop flag for the accept loop plus a count of connections still being served.
#[derive(Clone, Debug)]
pub struct GracefulShutdown {
    drain: Arc<Drain>,
}

#[derive(Debug)]
struct Drain {
    stop: Latch,
    inflight: AtomicU64,
    idle: Notify,
}

/// Keeps one connection counted until dropped, including on unwind.
#[derive(Debug)]
pub struct InflightGuard {
    drain: Arc<Drain>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.drain.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drain.idle.notify_waiters();
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self {
            drain: Arc::new(Drain {
                stop: Latch::new(1),
                inflight: AtomicU64::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Idempotent.
    pub fn initiate(&self) {
        self.drain.stop.count_down();
    }

    pub async fn wait_shutting_down(&self) {
        self.drain.stop.wait().await;
    }

    pub fn inflight_guard(&self) -> InflightGuard {
        self.drain.inflight.fetch_add(1, Ordering::AcqRel);
        InflightGuard {
            drain: self.drain.clone(),
        }
    }

    pub fn inflight(&self) -> u64 {
        self.drain.inflight.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let mut idle = pin!(self.drain.idle.notified());
            // armed before reading the count
            idle.as_mut().enable();
            if self.inflight() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Waits for every guard to drop, giving up after `grace`. Returns whether it drained.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.wait_idle()).await.is_ok()
    }
}
