//! The auction engine (§4.6): claim, resolve eligibility, fan out PINGs,
//! rank bids, POST the winner with fallback, and persist every step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use lead_core::domain::{ActionType, Buyer, ComplianceAuditLog, Transaction, TransactionStatus};
use lead_core::mapping;
use lead_core::money::Money;
use lead_core::value::Value;
use lead_core::Error as CoreError;
use lead_store::PersistenceGateway;
use uuid::Uuid;

use crate::buyer_client::{BuyerClient, CallStatus};
use crate::eligibility::{EligibilityIndex, EligibilityOptions, RankedBuyer};
use crate::metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuctionOutcome {
    Sold { winner_id: Uuid, bid: Money },
    Rejected { reason: String },
    Failed { reason: String },
}

/// One PINGed candidate's accepted, in-range bid — the only rows eligible to
/// win (§4.6 step 6).
#[derive(Clone)]
struct Bid {
    buyer: RankedBuyer,
    buyer_row: Buyer,
    amount: Money,
}

pub struct AuctionEngine<G: PersistenceGateway, C: BuyerClient> {
    gateway: Arc<G>,
    eligibility: Arc<EligibilityIndex<G>>,
    buyer_client: Arc<C>,
    auction_slack_ms: u64,
    post_max_attempts: u32,
    post_backoff: Vec<u64>,
}

impl<G: PersistenceGateway, C: BuyerClient> AuctionEngine<G, C> {
    pub fn new(
        gateway: Arc<G>,
        eligibility: Arc<EligibilityIndex<G>>,
        buyer_client: Arc<C>,
        auction_slack_ms: u64,
        post_max_attempts: u32,
        post_backoff: Vec<u64>,
    ) -> Self {
        Self { gateway, eligibility, buyer_client, auction_slack_ms, post_max_attempts, post_backoff }
    }

    pub async fn run_auction(&self, lead_id: Uuid) -> AuctionOutcome {
        match self.run_auction_inner(lead_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(%lead_id, error = %err, "auction failed with an uncaught error");
                let _ = self
                    .gateway
                    .mark_failed(lead_id, &format!("AUCTION_ERROR: {err}"))
                    .await;
                self.audit(lead_id, "AUCTION_ERROR", Value::from(err.to_string())).await;
                metrics::AUCTIONS_FAILED.inc();
                AuctionOutcome::Failed { reason: err.to_string() }
            }
        }
    }

    async fn run_auction_inner(&self, lead_id: Uuid) -> Result<AuctionOutcome, CoreError> {
        // 1. Claim.
        let lead = match self.gateway.claim_lead(lead_id).await {
            Ok(lead) => lead,
            Err(CoreError::AlreadyProcessing) => {
                return Ok(AuctionOutcome::Rejected { reason: "ALREADY_PROCESSING".into() })
            }
            Err(err) => return Err(err),
        };

        // 2. Resolve eligibility.
        let options = EligibilityOptions::default();
        let result = self
            .eligibility
            .get_eligible_buyers(lead.service_type_id, &lead.zip_code, &options, Utc::now())
            .await?;

        if result.eligible.is_empty() {
            return self.reject_no_buyers(lead_id).await;
        }

        // 3. Build PING payloads, excluding buyers missing required compliance
        // tokens, and resolve the live buyer row each candidate needs for
        // auth/URL/timeouts.
        let source_view = lead.as_source_view();
        let mut participants = Vec::new();
        for candidate in result.eligible {
            if candidate.requires_trusted_form && lead.compliance.trusted_form_cert_url.is_none() {
                continue;
            }
            if candidate.requires_jornaya && lead.compliance.jornaya_lead_id.is_none() {
                continue;
            }
            let buyer_row = match self.gateway.get_buyer(candidate.buyer_id).await {
                Ok(b) if b.active => b,
                _ => continue,
            };
            let payload = mapping::apply(&candidate.ping_template, &source_view);
            participants.push((candidate, buyer_row, payload));
        }

        if participants.is_empty() {
            return self.reject_no_buyers(lead_id).await;
        }

        // 4. Parallel PING under a shared auction deadline.
        let longest_timeout = participants.iter().map(|(_, b, _)| b.ping_timeout_ms).max().unwrap_or(2000);
        let deadline = Duration::from_millis(longest_timeout as u64 + self.auction_slack_ms);

        let ping_futures = participants.iter().map(|(candidate, buyer_row, payload)| {
            let buyer_client = Arc::clone(&self.buyer_client);
            let candidate = candidate.clone();
            let buyer_row = buyer_row.clone();
            let payload = payload.clone();
            let timeout_ms = buyer_row.ping_timeout_ms;
            async move {
                let result =
                    tokio::time::timeout(deadline, buyer_client.ping(&buyer_row, &payload, timeout_ms)).await;
                (candidate, buyer_row, payload, result)
            }
        });

        let ping_outcomes = join_all(ping_futures).await;

        // 5. Persist every PING Transaction and collect valid bids.
        let mut bids = Vec::new();
        for (candidate, buyer_row, payload, outcome) in ping_outcomes {
            let (status, bid_amount, response_value, response_time_ms) = match outcome {
                Err(_) => (TransactionStatus::Timeout, None, Value::Null, deadline.as_millis() as u32),
                Ok(result) => {
                    let response_time_ms = result.response_time_ms;
                    match result.status {
                        CallStatus::Timeout => {
                            (TransactionStatus::Timeout, None, result.raw_response, response_time_ms)
                        }
                        CallStatus::Failed => {
                            (TransactionStatus::Failed, None, result.raw_response, response_time_ms)
                        }
                        CallStatus::Success if !result.accepted => {
                            (TransactionStatus::Success, None, result.raw_response, response_time_ms)
                        }
                        CallStatus::Success => {
                            let parsed = result
                                .bid_amount
                                .as_deref()
                                .and_then(|s| Money::from_str_opt(Some(s)).ok());
                            match parsed {
                                Some(amount) if amount.in_range(candidate.min_bid, candidate.max_bid) => {
                                    (TransactionStatus::Success, Some(amount), result.raw_response, response_time_ms)
                                }
                                // Accepted but out of range or unparseable: recorded as a
                                // non-winning SUCCESS row, never a bid.
                                _ => (TransactionStatus::Success, None, result.raw_response, response_time_ms),
                            }
                        }
                    }
                }
            };

            let txn = Transaction {
                id: Uuid::new_v4(),
                lead_id,
                buyer_id: candidate.buyer_id,
                action_type: ActionType::Ping,
                status,
                bid_amount,
                response_time_ms,
                payload: payload.clone(),
                response: response_value,
                compliance_included: true,
                created_at: Utc::now(),
            };
            let _ = self.gateway.insert_transaction(&txn).await;

            if status == TransactionStatus::Success {
                if let Some(amount) = bid_amount {
                    bids.push(Bid { buyer: candidate, buyer_row, amount });
                }
            }
        }

        // 6. Rank bids: bid DESC, buyer priority DESC, buyer id ASC.
        bids.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| b.buyer.priority.cmp(&a.buyer.priority))
                .then_with(|| a.buyer.buyer_id.cmp(&b.buyer.buyer_id))
        });

        if bids.is_empty() {
            self.gateway.mark_rejected(lead_id, "NO_BIDS").await?;
            self.audit(lead_id, "AUCTION_NO_BIDS", Value::map()).await;
            metrics::AUCTIONS_REJECTED.with_label_values(&["NO_BIDS"]).inc();
            return Ok(AuctionOutcome::Rejected { reason: "NO_BIDS".into() });
        }

        // 7-8. POST to the current best bid, dropping it and retrying the next
        // best on a terminal failure.
        let mut remaining = bids;
        while !remaining.is_empty() {
            let bid = remaining[0].clone();
            let post_payload = mapping::apply(&bid.buyer.post_template, &source_view);
            let result = self
                .buyer_client
                .post(
                    &bid.buyer_row,
                    &post_payload,
                    bid.buyer_row.post_timeout_ms,
                    self.post_max_attempts,
                    &self.post_backoff,
                )
                .await;

            let txn_status = if result.status == CallStatus::Success && result.accepted {
                TransactionStatus::Success
            } else if result.status == CallStatus::Timeout {
                TransactionStatus::Timeout
            } else {
                TransactionStatus::Failed
            };

            let txn = Transaction {
                id: Uuid::new_v4(),
                lead_id,
                buyer_id: bid.buyer.buyer_id,
                action_type: ActionType::Post,
                status: txn_status,
                bid_amount: Some(bid.amount),
                response_time_ms: result.response_time_ms,
                payload: post_payload,
                response: result.raw_response,
                compliance_included: true,
                created_at: Utc::now(),
            };
            let _ = self.gateway.insert_transaction(&txn).await;

            if txn_status == TransactionStatus::Success {
                self.gateway.mark_sold(lead_id, bid.buyer.buyer_id, bid.amount).await?;
                self.audit(lead_id, "LEAD_SOLD", Value::map()).await;
                metrics::AUCTIONS_SOLD.inc();
                return Ok(AuctionOutcome::Sold { winner_id: bid.buyer.buyer_id, bid: bid.amount });
            }

            remaining.remove(0);
        }

        self.gateway.mark_failed(lead_id, "ALL_POSTS_FAILED").await?;
        self.audit(lead_id, "AUCTION_ALL_POSTS_FAILED", Value::map()).await;
        metrics::AUCTIONS_FAILED.inc();
        Ok(AuctionOutcome::Failed { reason: "ALL_POSTS_FAILED".into() })
    }

    async fn reject_no_buyers(&self, lead_id: Uuid) -> Result<AuctionOutcome, CoreError> {
        self.gateway.mark_rejected(lead_id, "NO_ELIGIBLE_BUYERS").await?;
        self.audit(lead_id, "AUCTION_NO_BUYERS", Value::map()).await;
        metrics::AUCTIONS_REJECTED.with_label_values(&["NO_ELIGIBLE_BUYERS"]).inc();
        Ok(AuctionOutcome::Rejected { reason: "NO_ELIGIBLE_BUYERS".into() })
    }

    async fn audit(&self, lead_id: Uuid, event_type: &str, data: Value) {
        let _ = self
            .gateway
            .insert_audit_log(&ComplianceAuditLog {
                id: Uuid::new_v4(),
                lead_id,
                event_type: event_type.to_string(),
                event_data: data,
                ip_address: None,
                user_agent: None,
                created_at: Utc::now(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buyer_client::fake::FakeBuyerClient;
    use crate::buyer_client::{PingResult, PostResult};
    use lead_core::domain::{AuthConfig, BuyerType};
    use lead_core::mapping::FieldMapping;
    use lead_core::test_utils;
    use lead_store::{EligibilityCandidate, FakeGateway};
    use std::time::Duration as StdDuration;

    fn buyer_row(id: Uuid, name: &str) -> Buyer {
        Buyer {
            id,
            name: name.to_string(),
            buyer_type: BuyerType::Contractor,
            api_url: format!("https://{name}.example.com/leads"),
            auth_config: AuthConfig::Custom { headers: Default::default() },
            ping_timeout_ms: 2000,
            post_timeout_ms: 5000,
            active: true,
            compliance_field_mappings: None,
            webhook_secret: Some("s3cr3t".into()),
        }
    }

    fn candidate(buyer_id: Uuid, name: &str, priority: i32, min: i64, max: i64) -> EligibilityCandidate {
        EligibilityCandidate {
            buyer_id,
            buyer_name: name.into(),
            priority,
            max_leads_per_day: None,
            min_bid: Money::from_i64(min * 100),
            max_bid: Money::from_i64(max * 100),
            requires_trusted_form: false,
            requires_jornaya: false,
            ping_template: FieldMapping::default(),
            post_template: FieldMapping::default(),
        }
    }

    fn engine(
        gateway: Arc<FakeGateway>,
        buyer_client: Arc<FakeBuyerClient>,
    ) -> AuctionEngine<FakeGateway, FakeBuyerClient> {
        let eligibility =
            Arc::new(EligibilityIndex::new(gateway.clone(), StdDuration::from_secs(60), "UTC"));
        AuctionEngine::new(gateway, eligibility, buyer_client, 500, 3, vec![500, 2000])
    }

    #[tokio::test]
    async fn single_buyer_happy_path_sells() {
        let gateway = Arc::new(FakeGateway::new());
        let lead = test_utils::test_lead(test_utils::test_service_type_id(), "90210");
        let lead_id = lead.id;
        gateway.insert_lead(&lead).await.unwrap();

        let buyer_id = Uuid::new_v4();
        gateway.seed_buyer(buyer_row(buyer_id, "acme"));
        gateway.seed_candidates(
            lead.service_type_id,
            "90210",
            vec![candidate(buyer_id, "acme", 100, 50, 300)],
        );

        let buyer_client = Arc::new(FakeBuyerClient::new());
        buyer_client.queue_ping(
            "acme",
            PingResult {
                status: CallStatus::Success,
                http_status: Some(200),
                accepted: true,
                bid_amount: Some("200.00".into()),
                reason: None,
                response_time_ms: 50,
                raw_response: Value::map(),
            },
        );
        buyer_client.queue_post(
            "acme",
            PostResult {
                status: CallStatus::Success,
                http_status: Some(200),
                accepted: true,
                external_lead_id: Some("ext-1".into()),
                reason: None,
                response_time_ms: 80,
                raw_response: Value::map(),
            },
        );

        let outcome = engine(gateway, buyer_client).run_auction(lead_id).await;
        assert_eq!(
            outcome,
            AuctionOutcome::Sold { winner_id: buyer_id, bid: Money::from_i64(20000) }
        );
    }

    #[tokio::test]
    async fn highest_bid_wins_across_three_buyers() {
        let gateway = Arc::new(FakeGateway::new());
        let lead = test_utils::test_lead(test_utils::test_service_type_id(), "90210");
        let lead_id = lead.id;
        gateway.insert_lead(&lead).await.unwrap();

        let (b1, b2, b3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        gateway.seed_buyer(buyer_row(b1, "b1"));
        gateway.seed_buyer(buyer_row(b2, "b2"));
        gateway.seed_buyer(buyer_row(b3, "b3"));
        gateway.seed_candidates(
            lead.service_type_id,
            "90210",
            vec![
                candidate(b1, "b1", 100, 0, 500),
                candidate(b2, "b2", 100, 0, 500),
                candidate(b3, "b3", 100, 0, 500),
            ],
        );

        let buyer_client = Arc::new(FakeBuyerClient::new());
        for (name, bid) in [("b1", "200.00"), ("b2", "250.00"), ("b3", "300.00")] {
            buyer_client.queue_ping(
                name,
                PingResult {
                    status: CallStatus::Success,
                    http_status: Some(200),
                    accepted: true,
                    bid_amount: Some(bid.into()),
                    reason: None,
                    response_time_ms: 50,
                    raw_response: Value::map(),
                },
            );
        }
        buyer_client.queue_post(
            "b3",
            PostResult {
                status: CallStatus::Success,
                http_status: Some(200),
                accepted: true,
                external_lead_id: Some("ext-3".into()),
                reason: None,
                response_time_ms: 80,
                raw_response: Value::map(),
            },
        );

        let outcome = engine(gateway, buyer_client).run_auction(lead_id).await;
        assert_eq!(outcome, AuctionOutcome::Sold { winner_id: b3, bid: Money::from_i64(30000) });
    }

    #[tokio::test]
    async fn all_pings_timeout_rejects_no_bids() {
        let gateway = Arc::new(FakeGateway::new());
        let lead = test_utils::test_lead(test_utils::test_service_type_id(), "90210");
        let lead_id = lead.id;
        gateway.insert_lead(&lead).await.unwrap();

        let buyer_id = Uuid::new_v4();
        gateway.seed_buyer(buyer_row(buyer_id, "acme"));
        gateway.seed_candidates(
            lead.service_type_id,
            "90210",
            vec![candidate(buyer_id, "acme", 100, 50, 300)],
        );

        // No ping queued: the fake client defaults every unscripted call to TIMEOUT.
        let buyer_client = Arc::new(FakeBuyerClient::new());

        let outcome = engine(gateway, buyer_client).run_auction(lead_id).await;
        assert_eq!(outcome, AuctionOutcome::Rejected { reason: "NO_BIDS".into() });
    }

    #[tokio::test]
    async fn winner_post_failure_falls_back_to_next_best() {
        let gateway = Arc::new(FakeGateway::new());
        let lead = test_utils::test_lead(test_utils::test_service_type_id(), "90210");
        let lead_id = lead.id;
        gateway.insert_lead(&lead).await.unwrap();

        let (winner, runner_up) = (Uuid::new_v4(), Uuid::new_v4());
        gateway.seed_buyer(buyer_row(winner, "winner"));
        gateway.seed_buyer(buyer_row(runner_up, "runner_up"));
        gateway.seed_candidates(
            lead.service_type_id,
            "90210",
            vec![candidate(winner, "winner", 100, 0, 500), candidate(runner_up, "runner_up", 100, 0, 500)],
        );

        let buyer_client = Arc::new(FakeBuyerClient::new());
        buyer_client.queue_ping(
            "winner",
            PingResult {
                status: CallStatus::Success,
                http_status: Some(200),
                accepted: true,
                bid_amount: Some("300.00".into()),
                reason: None,
                response_time_ms: 50,
                raw_response: Value::map(),
            },
        );
        buyer_client.queue_ping(
            "runner_up",
            PingResult {
                status: CallStatus::Success,
                http_status: Some(200),
                accepted: true,
                bid_amount: Some("250.00".into()),
                reason: None,
                response_time_ms: 50,
                raw_response: Value::map(),
            },
        );
        // Winner's POST fails terminally (3 attempts already exhausted by the
        // client; the fake just returns one scripted terminal result).
        buyer_client.queue_post(
            "winner",
            PostResult {
                status: CallStatus::Failed,
                http_status: Some(422),
                accepted: false,
                external_lead_id: None,
                reason: Some("REJECTED_BY_BUYER".into()),
                response_time_ms: 80,
                raw_response: Value::map(),
            },
        );
        buyer_client.queue_post(
            "runner_up",
            PostResult {
                status: CallStatus::Success,
                http_status: Some(200),
                accepted: true,
                external_lead_id: Some("ext-2".into()),
                reason: None,
                response_time_ms: 80,
                raw_response: Value::map(),
            },
        );

        let outcome = engine(gateway, buyer_client).run_auction(lead_id).await;
        assert_eq!(
            outcome,
            AuctionOutcome::Sold { winner_id: runner_up, bid: Money::from_i64(25000) }
        );
    }
}
