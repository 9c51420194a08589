//! The TTL-based cache layer (C9): eligibility-candidate lookups are cached
//! per `(service_type_id, zip_code)` for `eligibility_cache_ttl_sec` (§6.5),
//! avoiding a join across three tables on every PING.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache as MokaCache;
use uuid::Uuid;

use crate::gateway::EligibilityCandidate;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct EligibilityKey {
    service_type_id: Uuid,
    zip_code: String,
}

/// An in-memory TTL cache wrapping `moka`. One instance is shared across
/// worker tasks via `Arc` (the teacher's `parking_lot`-guarded shared-state
/// idiom, here delegated to `moka`'s own internal sharding).
#[derive(Clone)]
pub struct EligibilityCache {
    inner: MokaCache<EligibilityKey, Arc<Vec<EligibilityCandidate>>>,
}

impl EligibilityCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: MokaCache::builder().time_to_live(ttl).max_capacity(max_capacity).build(),
        }
    }

    pub fn get(&self, service_type_id: Uuid, zip_code: &str) -> Option<Arc<Vec<EligibilityCandidate>>> {
        self.inner.get(&EligibilityKey { service_type_id, zip_code: zip_code.to_string() })
    }

    pub fn set(&self, service_type_id: Uuid, zip_code: &str, candidates: Vec<EligibilityCandidate>) {
        self.inner.insert(
            EligibilityKey { service_type_id, zip_code: zip_code.to_string() },
            Arc::new(candidates),
        );
    }

    /// Invalidates a single key, used when a buyer's zip-code rows change.
    pub fn invalidate(&self, service_type_id: Uuid, zip_code: &str) {
        self.inner.invalidate(&EligibilityKey { service_type_id, zip_code: zip_code.to_string() });
    }

    /// Invalidates every cached entry, used on bulk buyer-config reloads.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Invalidates every entry for a `service_type_id` regardless of zip code
    /// (the C9 `deletePattern(prefix*)` contract, spec.md §4.9), used when an
    /// admin write touches a `BuyerServiceConfig` row shared across zip codes.
    pub fn delete_pattern(&self, service_type_id: Uuid) {
        let matching: Vec<_> =
            self.inner.iter().filter(|(key, _)| key.service_type_id == service_type_id).map(|(key, _)| key).collect();
        for key in matching {
            self.inner.invalidate(key.as_ref());
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_core::mapping::FieldMapping;
    use lead_core::money::Money;

    fn candidate(buyer_name: &str) -> EligibilityCandidate {
        EligibilityCandidate {
            buyer_id: Uuid::new_v4(),
            buyer_name: buyer_name.into(),
            priority: 1,
            max_leads_per_day: None,
            min_bid: Money::ZERO,
            max_bid: Money::from_i64(10000),
            requires_trusted_form: false,
            requires_jornaya: false,
            ping_template: FieldMapping::default(),
            post_template: FieldMapping::default(),
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = EligibilityCache::new(Duration::from_secs(60), 100);
        let service_type_id = Uuid::new_v4();
        cache.set(service_type_id, "90210", vec![candidate("acme")]);
        let got = cache.get(service_type_id, "90210").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].buyer_name, "acme");
    }

    #[test]
    fn miss_returns_none() {
        let cache = EligibilityCache::new(Duration::from_secs(60), 100);
        assert!(cache.get(Uuid::new_v4(), "00000").is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = EligibilityCache::new(Duration::from_secs(60), 100);
        let service_type_id = Uuid::new_v4();
        cache.set(service_type_id, "90210", vec![candidate("acme")]);
        cache.invalidate(service_type_id, "90210");
        assert!(cache.get(service_type_id, "90210").is_none());
    }

    #[test]
    fn delete_pattern_clears_every_zip_for_a_service_type_only() {
        let cache = EligibilityCache::new(Duration::from_secs(60), 100);
        let service_type_id = Uuid::new_v4();
        let other_service_type_id = Uuid::new_v4();
        cache.set(service_type_id, "90210", vec![candidate("acme")]);
        cache.set(service_type_id, "10001", vec![candidate("acme")]);
        cache.set(other_service_type_id, "90210", vec![candidate("acme")]);

        cache.delete_pattern(service_type_id);

        assert!(cache.get(service_type_id, "90210").is_none());
        assert!(cache.get(service_type_id, "10001").is_none());
        assert!(cache.get(other_service_type_id, "90210").is_some());
    }
}
