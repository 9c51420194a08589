//! The work queue (§4.7): a durable FIFO (backed by `lead_jobs`) with
//! `high`/`normal` priority classes, drained by a fixed worker pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use lead_store::{PersistenceGateway, QueuedJob};
use tokio::sync::Notify;

use crate::auction::{AuctionEngine, AuctionOutcome};
use crate::buyer_client::BuyerClient;

pub const PRIORITY_HIGH: &str = "high";
pub const PRIORITY_NORMAL: &str = "normal";

const LEASE_DURATION_SECS: i64 = 120;
const MAX_DEQUEUE_ATTEMPTS: u32 = 3;
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Wraps the gateway's job table with an in-process `Notify` so a freshly
/// enqueued job wakes an idle worker immediately instead of waiting out the
/// next poll interval.
pub struct WorkQueue<G: PersistenceGateway> {
    gateway: Arc<G>,
    notify: Notify,
}

impl<G: PersistenceGateway> WorkQueue<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway, notify: Notify::new() }
    }

    pub async fn enqueue(&self, lead_id: uuid::Uuid, priority: &str) -> Result<(), lead_core::Error> {
        self.gateway.enqueue_job(lead_id, priority).await?;
        self.notify.notify_one();
        Ok(())
    }

    pub async fn depth(&self) -> Result<u64, lead_core::Error> {
        self.gateway.queue_depth().await
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, lead_core::Error> {
        self.gateway.dequeue_job(ChronoDuration::seconds(LEASE_DURATION_SECS)).await
    }
}

/// Runs `worker_count` dequeue-run_auction-ack loops until the process shuts
/// down, mirroring the teacher's tick-driven scheduler loop.
pub async fn run_worker_pool<G, C>(
    queue: Arc<WorkQueue<G>>,
    engine: Arc<AuctionEngine<G, C>>,
    worker_count: usize,
) where
    G: PersistenceGateway + 'static,
    C: BuyerClient + 'static,
{
    let mut tasks = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let queue = Arc::clone(&queue);
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            worker_loop(worker_id, queue, engine).await;
        }));
    }
    join_all(tasks).await;
}

async fn worker_loop<G, C>(worker_id: usize, queue: Arc<WorkQueue<G>>, engine: Arc<AuctionEngine<G, C>>)
where
    G: PersistenceGateway,
    C: BuyerClient,
{
    loop {
        match queue.dequeue().await {
            Ok(Some(job)) => {
                tracing::info!(worker_id, lead_id = %job.lead_id, attempts = job.attempts, "processing job");
                let outcome = engine.run_auction(job.lead_id).await;
                match outcome {
                    AuctionOutcome::Sold { .. } | AuctionOutcome::Rejected { .. } => {
                        let _ = queue.gateway.mark_job_done(job.lead_id).await;
                    }
                    AuctionOutcome::Failed { .. } if job.attempts >= MAX_DEQUEUE_ATTEMPTS => {
                        tracing::warn!(lead_id = %job.lead_id, "job exhausted retry budget, dead-lettering");
                        let _ = queue.gateway.mark_job_dead(job.lead_id).await;
                    }
                    AuctionOutcome::Failed { .. } => {
                        // Left `leased`; a future dequeue (after lease expiry, via a
                        // separate sweep) will retry it. The retry itself happens
                        // through re-enqueueing attempts tracked in `lead_jobs`.
                        tracing::warn!(lead_id = %job.lead_id, attempts = job.attempts, "job failed, will retry");
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = queue.notify.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
            Err(err) => {
                tracing::error!(worker_id, error = %err, "dequeue failed");
                tokio::time::sleep(IDLE_POLL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_store::FakeGateway;

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let gateway = Arc::new(FakeGateway::new());
        let queue = WorkQueue::new(gateway);
        let lead_id = uuid::Uuid::new_v4();
        queue.enqueue(lead_id, PRIORITY_HIGH).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);

        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.lead_id, lead_id);
        assert_eq!(job.priority, PRIORITY_HIGH);
    }
}
