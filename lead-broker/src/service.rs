//! Top-level wiring: constructs the gateway, eligibility index, buyer
//! client, work queue, auction engine, and HTTP server, then runs them all
//! to completion (or until shutdown), mirroring the teacher's `Service::run`.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lead_core::config::Settings;
use lead_store::PersistenceGateway;

use crate::api;
use crate::auction::AuctionEngine;
use crate::buyer_client::BuyerClient;
use crate::eligibility::EligibilityIndex;
use crate::queue::{self, WorkQueue};
use crate::submission::SubmissionService;
use crate::webhook::WebhookReceiver;

pub struct Service<G: PersistenceGateway, C: BuyerClient> {
    settings: Settings,
    gateway: Arc<G>,
    buyer_client: Arc<C>,
}

impl<G: PersistenceGateway + 'static, C: BuyerClient + 'static> Service<G, C> {
    pub fn new(settings: Settings, gateway: Arc<G>, buyer_client: Arc<C>) -> Self {
        Self { settings, gateway, buyer_client }
    }

    pub async fn run(&self) {
        let eligibility = Arc::new(EligibilityIndex::new(
            self.gateway.clone(),
            Duration::from_secs(self.settings.eligibility_cache_ttl_sec),
            self.settings.daily_counter_timezone.clone(),
        ));

        let engine = Arc::new(AuctionEngine::new(
            self.gateway.clone(),
            eligibility,
            self.buyer_client.clone(),
            self.settings.auction_slack_ms,
            self.settings.post_max_attempts,
            self.settings.post_backoff.clone(),
        ));

        let work_queue = Arc::new(WorkQueue::new(self.gateway.clone()));
        let submission = Arc::new(SubmissionService::new(self.gateway.clone(), work_queue.clone()));
        let webhook = Arc::new(WebhookReceiver::new(self.gateway.clone()));

        let host: Ipv4Addr = self.settings.http_host;
        let port = self.settings.http_port;
        let server = api::Server::new(host, port, submission, webhook);

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(async move {
            server.run().await;
        }));

        let worker_count = self.settings.worker_count;
        tasks.push(tokio::spawn(async move {
            queue::run_worker_pool(work_queue, engine, worker_count).await;
        }));

        join_all(tasks).await;
    }
}
