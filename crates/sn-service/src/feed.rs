//! Bounded feed ingestion decoupling feed rate from computation rate.
//!
//! Each feed source gets a [`FeedHandle`]: a bounded crossbeam channel plus
//! a worker thread draining events into [`RiskService::apply`]. When the
//! queue is full the configured [`OverflowPolicy`] either blocks the
//! producer or drops the oldest queued event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sn_types::{FeedEvent, RiskError, RiskResult};

use crate::service::RiskService;

/// What to do with an incoming event when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Block the producer until the worker drains the queue.
    Block,
    /// Drop the oldest queued event to make room for the new one.
    DropOldest,
}

/// Configuration for one feed channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub capacity: usize,
    pub policy: OverflowPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            policy: OverflowPolicy::Block,
        }
    }
}

#[derive(Debug, Default)]
struct FeedStats {
    accepted: AtomicU64,
    dropped_stale: AtomicU64,
    dropped_overflow: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of the feed counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStatsSnapshot {
    /// Events applied successfully.
    pub accepted: u64,
    /// Out-of-order market updates logged and dropped.
    pub dropped_stale: u64,
    /// Events evicted by the drop-oldest overflow policy.
    pub dropped_overflow: u64,
    /// Events the service refused (unknown instrument/account, bad payload).
    pub rejected: u64,
}

/// Producer handle for one feed source.
///
/// Dropping (or closing) the handle disconnects the channel and joins the
/// worker after it drains the remaining events.
pub struct FeedHandle {
    tx: Option<Sender<FeedEvent>>,
    rx: Receiver<FeedEvent>,
    policy: OverflowPolicy,
    stats: Arc<FeedStats>,
    worker: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Spawn a worker thread draining events into the service.
    pub fn spawn(service: Arc<RiskService>, config: FeedConfig) -> Self {
        let (tx, rx) = bounded(config.capacity);
        let stats = Arc::new(FeedStats::default());

        let worker_rx = rx.clone();
        let worker_stats = stats.clone();
        let worker = std::thread::spawn(move || {
            while let Ok(event) = worker_rx.recv() {
                match service.apply(event) {
                    Ok(()) => {
                        worker_stats.accepted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RiskError::StaleData {
                        symbol,
                        incoming,
                        current,
                    }) => {
                        warn!(%symbol, %incoming, %current, "stale market update dropped");
                        worker_stats.dropped_stale.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(%err, "feed event rejected");
                        worker_stats.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            debug!("feed worker stopped");
        });

        Self {
            tx: Some(tx),
            rx,
            policy: config.policy,
            stats,
            worker: Some(worker),
        }
    }

    /// Enqueue one event according to the overflow policy.
    pub fn send(&self, event: FeedEvent) -> RiskResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RiskError::InvalidRequest("feed channel closed".into()))?;

        match self.policy {
            OverflowPolicy::Block => tx
                .send(event)
                .map_err(|_| RiskError::InvalidRequest("feed channel disconnected".into())),
            OverflowPolicy::DropOldest => {
                push_drop_oldest(tx, &self.rx, &self.stats, event)
            }
        }
    }

    /// Current feed counters.
    pub fn stats(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            dropped_stale: self.stats.dropped_stale.load(Ordering::Relaxed),
            dropped_overflow: self.stats.dropped_overflow.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }

    /// Disconnect the channel and join the worker after it drains.
    pub fn close(mut self) -> FeedStatsSnapshot {
        self.shutdown();
        self.stats()
    }

    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Try-send with drop-oldest eviction. The channel is MPMC, so the producer
/// side can pop the head to make room.
fn push_drop_oldest(
    tx: &Sender<FeedEvent>,
    rx: &Receiver<FeedEvent>,
    stats: &FeedStats,
    event: FeedEvent,
) -> RiskResult<()> {
    let mut event = event;
    loop {
        match tx.try_send(event) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(back)) => {
                if rx.try_recv().is_ok() {
                    stats.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                }
                event = back;
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(RiskError::InvalidRequest(
                    "feed channel disconnected".into(),
                ))
            }
        }
    }
}
