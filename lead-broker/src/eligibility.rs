//! The eligibility index (§4.3): given `(serviceTypeId, zipCode)`, returns
//! ranked eligible buyers and the reasons anyone was excluded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lead_core::mapping::FieldMapping;
use lead_core::money::Money;
use lead_core::Error as CoreError;
use lead_store::{EligibilityCache, EligibilityCandidate, PersistenceGateway};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    DailyQuota,
    ExcludedByCaller,
    MissingTrustedForm,
    MissingJornaya,
}

#[derive(Debug, Clone)]
pub struct Excluded {
    pub buyer_id: Uuid,
    pub buyer_name: String,
    pub reason: ExclusionReason,
}

/// One eligible, ranked buyer and the constraints C4/C6 need (§4.3).
#[derive(Debug, Clone)]
pub struct RankedBuyer {
    pub buyer_id: Uuid,
    pub buyer_name: String,
    pub min_bid: Money,
    pub max_bid: Money,
    pub priority: i32,
    pub ping_template: FieldMapping,
    pub post_template: FieldMapping,
    pub requires_trusted_form: bool,
    pub requires_jornaya: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EligibilityOptions {
    pub exclude_buyers: Vec<Uuid>,
    pub max_participants: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EligibilityResult {
    pub eligible: Vec<RankedBuyer>,
    pub excluded: Vec<Excluded>,
}

const DEFAULT_MAX_PARTICIPANTS: usize = 10;

/// Resolves eligible buyers for a lead, serving the join (steps 1-2) from
/// `cache` when warm and always recomputing the daily-quota check (step 3).
pub struct EligibilityIndex<G: PersistenceGateway> {
    gateway: Arc<G>,
    cache: EligibilityCache,
    daily_counter_timezone: String,
}

impl<G: PersistenceGateway> EligibilityIndex<G> {
    pub fn new(gateway: Arc<G>, ttl: Duration, daily_counter_timezone: impl Into<String>) -> Self {
        Self {
            gateway,
            cache: EligibilityCache::new(ttl, 10_000),
            daily_counter_timezone: daily_counter_timezone.into(),
        }
    }

    pub fn cache(&self) -> &EligibilityCache {
        &self.cache
    }

    async fn candidates(
        &self,
        service_type_id: Uuid,
        zip_code: &str,
    ) -> Result<Arc<Vec<EligibilityCandidate>>, CoreError> {
        if let Some(cached) = self.cache.get(service_type_id, zip_code) {
            return Ok(cached);
        }
        let fetched = self.gateway.get_eligibility_candidates(service_type_id, zip_code).await?;
        self.cache.set(service_type_id, zip_code, fetched.clone());
        Ok(Arc::new(fetched))
    }

    pub async fn get_eligible_buyers(
        &self,
        service_type_id: Uuid,
        zip_code: &str,
        options: &EligibilityOptions,
        now: DateTime<Utc>,
    ) -> Result<EligibilityResult, CoreError> {
        let candidates = self.candidates(service_type_id, zip_code).await?;
        let since = lead_core::time::start_of_day(now, &self.daily_counter_timezone);

        let mut eligible = Vec::new();
        let mut excluded = Vec::new();

        for candidate in candidates.iter() {
            if options.exclude_buyers.contains(&candidate.buyer_id) {
                excluded.push(Excluded {
                    buyer_id: candidate.buyer_id,
                    buyer_name: candidate.buyer_name.clone(),
                    reason: ExclusionReason::ExcludedByCaller,
                });
                continue;
            }

            if let Some(limit) = candidate.max_leads_per_day {
                let used = self.gateway.count_buyer_daily_posts(candidate.buyer_id, since).await?;
                if used >= limit {
                    excluded.push(Excluded {
                        buyer_id: candidate.buyer_id,
                        buyer_name: candidate.buyer_name.clone(),
                        reason: ExclusionReason::DailyQuota,
                    });
                    continue;
                }
            }

            eligible.push(RankedBuyer {
                buyer_id: candidate.buyer_id,
                buyer_name: candidate.buyer_name.clone(),
                min_bid: candidate.min_bid,
                max_bid: candidate.max_bid,
                priority: candidate.priority,
                ping_template: candidate.ping_template.clone(),
                post_template: candidate.post_template.clone(),
                requires_trusted_form: candidate.requires_trusted_form,
                requires_jornaya: candidate.requires_jornaya,
            });
        }

        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.max_bid.cmp(&a.max_bid))
                .then_with(|| a.buyer_id.cmp(&b.buyer_id))
        });

        let max_participants = options.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS);
        eligible.truncate(max_participants);

        Ok(EligibilityResult { eligible, excluded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_core::mapping::FieldMapping;
    use lead_store::FakeGateway;

    fn candidate(name: &str, priority: i32, max_bid: i64, max_leads: Option<i32>) -> EligibilityCandidate {
        EligibilityCandidate {
            buyer_id: Uuid::new_v4(),
            buyer_name: name.into(),
            priority,
            max_leads_per_day: max_leads.map(|v| v as u32),
            min_bid: Money::ZERO,
            max_bid: Money::from_i64(max_bid * 100),
            requires_trusted_form: false,
            requires_jornaya: false,
            ping_template: FieldMapping::default(),
            post_template: FieldMapping::default(),
        }
    }

    #[tokio::test]
    async fn ranks_by_priority_then_max_bid_then_id() {
        let gateway = Arc::new(FakeGateway::new());
        let service_type_id = Uuid::new_v4();
        let b1 = candidate("b1", 100, 200, None);
        let b2 = candidate("b2", 100, 300, None);
        let b3 = candidate("b3", 50, 999, None);
        gateway.seed_candidates(service_type_id, "90210", vec![b1, b2, b3]);

        let index = EligibilityIndex::new(gateway, Duration::from_secs(60), "UTC");
        let result = index
            .get_eligible_buyers(service_type_id, "90210", &EligibilityOptions::default(), Utc::now())
            .await
            .unwrap();

        assert_eq!(result.eligible.len(), 3);
        assert_eq!(result.eligible[0].buyer_name, "b2");
        assert_eq!(result.eligible[1].buyer_name, "b1");
        assert_eq!(result.eligible[2].buyer_name, "b3");
    }

    #[tokio::test]
    async fn excludes_buyers_over_daily_quota() {
        let gateway = Arc::new(FakeGateway::new());
        let service_type_id = Uuid::new_v4();
        let capped = candidate("capped", 100, 200, Some(0));
        gateway.seed_candidates(service_type_id, "90210", vec![capped]);

        let index = EligibilityIndex::new(gateway, Duration::from_secs(60), "UTC");
        let result = index
            .get_eligible_buyers(service_type_id, "90210", &EligibilityOptions::default(), Utc::now())
            .await
            .unwrap();

        assert!(result.eligible.is_empty());
        assert_eq!(result.excluded[0].reason, ExclusionReason::DailyQuota);
    }

    #[tokio::test]
    async fn respects_caller_exclusion_list() {
        let gateway = Arc::new(FakeGateway::new());
        let service_type_id = Uuid::new_v4();
        let b1 = candidate("b1", 100, 200, None);
        let excluded_id = b1.buyer_id;
        gateway.seed_candidates(service_type_id, "90210", vec![b1]);

        let index = EligibilityIndex::new(gateway, Duration::from_secs(60), "UTC");
        let options = EligibilityOptions { exclude_buyers: vec![excluded_id], max_participants: None };
        let result = index
            .get_eligible_buyers(service_type_id, "90210", &options, Utc::now())
            .await
            .unwrap();

        assert!(result.eligible.is_empty());
        assert_eq!(result.excluded[0].reason, ExclusionReason::ExcludedByCaller);
    }
}
