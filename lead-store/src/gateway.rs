//! The persistence gateway (§4.2): one async trait method per atomic
//! operation, backed by `PostgresGateway`. Each method opens and commits (or
//! rolls back on error) its own transaction rather than exposing a generic
//! `withTransaction` combinator, which doesn't lend itself to an object-safe
//! async trait in Rust.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lead_core::domain::{
    Buyer, ComplianceAuditLog, Lead, LeadStatus, LeadStatusHistory, Transaction, WebhookAudit,
};
use lead_core::mapping::FieldMapping;
use lead_core::money::Money;
use lead_core::value::Value;
use lead_core::Error as CoreError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::rows::{self, BuyerRow, EligibilityCandidateRow, LeadRow, WebhookAuditRow};

/// One eligible buyer candidate for a lead, joined from
/// `buyer_service_zip_codes` x `buyer_service_configs` x `buyers` (§4.1 step 1-2).
#[derive(Debug, Clone)]
pub struct EligibilityCandidate {
    pub buyer_id: Uuid,
    pub buyer_name: String,
    pub priority: i32,
    pub max_leads_per_day: Option<u32>,
    pub min_bid: Money,
    pub max_bid: Money,
    pub requires_trusted_form: bool,
    pub requires_jornaya: bool,
    pub ping_template: FieldMapping,
    pub post_template: FieldMapping,
}

/// A job popped off the `lead_jobs` queue (§4.7).
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub lead_id: Uuid,
    pub priority: String,
    pub attempts: i32,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), CoreError>;

    async fn get_lead(&self, lead_id: Uuid) -> Result<Lead, CoreError>;

    /// Transitions `Pending -> Processing`, recording the history row.
    /// Returns `AlreadyProcessing` if the lead isn't in `Pending`.
    async fn claim_lead(&self, lead_id: Uuid) -> Result<Lead, CoreError>;

    async fn mark_sold(
        &self,
        lead_id: Uuid,
        winning_buyer_id: Uuid,
        winning_bid: Money,
    ) -> Result<(), CoreError>;

    async fn mark_rejected(&self, lead_id: Uuid, reason: &str) -> Result<(), CoreError>;

    async fn mark_failed(&self, lead_id: Uuid, reason: &str) -> Result<(), CoreError>;

    /// Reverses a `Sold` lead to `Rejected` on webhook cancellation.
    /// `winning_buyer_id`/`winning_bid` are retained for audit (SPEC_FULL §9).
    async fn reverse_sold_to_rejected(&self, lead_id: Uuid, reason: &str) -> Result<(), CoreError>;

    async fn get_buyer(&self, buyer_id: Uuid) -> Result<Buyer, CoreError>;

    async fn get_buyer_by_name(&self, name: &str) -> Result<Buyer, CoreError>;

    async fn get_eligibility_candidates(
        &self,
        service_type_id: Uuid,
        zip_code: &str,
    ) -> Result<Vec<EligibilityCandidate>, CoreError>;

    /// Count of `POST` transactions for `buyer_id` with status `SUCCESS` since
    /// `since` (the timezone-local start-of-day boundary, §4.2/§8).
    async fn count_buyer_daily_posts(
        &self,
        buyer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, CoreError>;

    /// The highest accepted PING bid recorded for a lead, if any (§4.6).
    async fn get_highest_ping_bid(&self, lead_id: Uuid) -> Result<Option<Money>, CoreError>;

    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), CoreError>;

    async fn insert_audit_log(&self, log: &ComplianceAuditLog) -> Result<(), CoreError>;

    async fn insert_webhook_audit(&self, audit: &WebhookAudit) -> Result<(), CoreError>;

    /// Looks up a prior webhook delivery by `(buyer_id, transaction_id)` for
    /// idempotent replay handling (§4.8).
    async fn find_webhook_audit_by_dedup(
        &self,
        buyer_id: Uuid,
        transaction_id: &str,
    ) -> Result<Option<WebhookAudit>, CoreError>;

    async fn enqueue_job(&self, lead_id: Uuid, priority: &str) -> Result<(), CoreError>;

    /// Atomically claims the next queued job ordered by priority then age,
    /// leasing it for `lease_for` (§4.7).
    async fn dequeue_job(&self, lease_for: chrono::Duration) -> Result<Option<QueuedJob>, CoreError>;

    async fn mark_job_done(&self, lead_id: Uuid) -> Result<(), CoreError>;

    /// Marks a job dead-lettered after exceeding its retry budget (§4.7).
    async fn mark_job_dead(&self, lead_id: Uuid) -> Result<(), CoreError>;

    async fn queue_depth(&self) -> Result<u64, CoreError>;
}

pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn record_status_history(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        lead_id: Uuid,
        from_status: Option<LeadStatus>,
        to_status: LeadStatus,
        reason: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO lead_status_history (id, lead_id, from_status, to_status, reason, created_at) \
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(Uuid::new_v4())
        .bind(lead_id)
        .bind(from_status.map(rows::lead_status_str))
        .bind(rows::lead_status_str(to_status))
        .bind(reason)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO leads (id, service_type_id, zip_code, owns_home, timeframe, form_data, \
             trusted_form_cert_url, trusted_form_cert_id, jornaya_lead_id, tcpa_consent, attribution, \
             trusted_form_compliance_score, lead_quality_score, status, winning_buyer_id, winning_bid, \
             created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)",
        )
        .bind(lead.id)
        .bind(lead.service_type_id)
        .bind(&lead.zip_code)
        .bind(lead.owns_home)
        .bind(rows::timeframe_str(lead.timeframe))
        .bind(serde_json::Value::from(lead.form_data.clone()))
        .bind(&lead.compliance.trusted_form_cert_url)
        .bind(&lead.compliance.trusted_form_cert_id)
        .bind(&lead.compliance.jornaya_lead_id)
        .bind(lead.compliance.tcpa_consent)
        .bind(serde_json::Value::from(lead.compliance.attribution.clone()))
        .bind(lead.compliance.trusted_form_compliance_score.map(|v| v as i16))
        .bind(lead.lead_quality_score)
        .bind(rows::lead_status_str(lead.status))
        .bind(lead.winning_buyer_id)
        .bind(lead.winning_bid.map(|m| m.raw()))
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn get_lead(&self, lead_id: Uuid) -> Result<Lead, CoreError> {
        let row: LeadRow = sqlx::query_as("SELECT * FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_one(&self.pool)
            .await
            .map_err(GatewayError::from)?;
        Ok(row.into())
    }

    async fn claim_lead(&self, lead_id: Uuid) -> Result<Lead, CoreError> {
        let mut tx = self.pool.begin().await.map_err(GatewayError::from)?;
        let row: LeadRow = sqlx::query_as("SELECT * FROM leads WHERE id = $1 FOR UPDATE")
            .bind(lead_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(GatewayError::from)?;
        let lead: Lead = row.into();
        if lead.status != LeadStatus::Pending {
            return Err(CoreError::AlreadyProcessing);
        }
        sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
            .bind(rows::lead_status_str(LeadStatus::Processing))
            .bind(lead_id)
            .execute(&mut *tx)
            .await
            .map_err(GatewayError::from)?;
        Self::record_status_history(
            &mut tx,
            lead_id,
            Some(LeadStatus::Pending),
            LeadStatus::Processing,
            None,
        )
        .await
        .map_err(GatewayError::from)?;
        tx.commit().await.map_err(GatewayError::from)?;
        Ok(Lead { status: LeadStatus::Processing, ..lead })
    }

    async fn mark_sold(
        &self,
        lead_id: Uuid,
        winning_buyer_id: Uuid,
        winning_bid: Money,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(GatewayError::from)?;
        sqlx::query(
            "UPDATE leads SET status = $1, winning_buyer_id = $2, winning_bid = $3, updated_at = now() \
             WHERE id = $4",
        )
        .bind(rows::lead_status_str(LeadStatus::Sold))
        .bind(winning_buyer_id)
        .bind(winning_bid.raw())
        .bind(lead_id)
        .execute(&mut *tx)
        .await
        .map_err(GatewayError::from)?;
        Self::record_status_history(
            &mut tx,
            lead_id,
            Some(LeadStatus::Processing),
            LeadStatus::Sold,
            None,
        )
        .await
        .map_err(GatewayError::from)?;
        tx.commit().await.map_err(GatewayError::from)?;
        Ok(())
    }

    async fn mark_rejected(&self, lead_id: Uuid, reason: &str) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(GatewayError::from)?;
        sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
            .bind(rows::lead_status_str(LeadStatus::Rejected))
            .bind(lead_id)
            .execute(&mut *tx)
            .await
            .map_err(GatewayError::from)?;
        Self::record_status_history(
            &mut tx,
            lead_id,
            Some(LeadStatus::Processing),
            LeadStatus::Rejected,
            Some(reason),
        )
        .await
        .map_err(GatewayError::from)?;
        tx.commit().await.map_err(GatewayError::from)?;
        Ok(())
    }

    async fn mark_failed(&self, lead_id: Uuid, reason: &str) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(GatewayError::from)?;
        sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
            .bind(rows::lead_status_str(LeadStatus::Failed))
            .bind(lead_id)
            .execute(&mut *tx)
            .await
            .map_err(GatewayError::from)?;
        Self::record_status_history(
            &mut tx,
            lead_id,
            Some(LeadStatus::Processing),
            LeadStatus::Failed,
            Some(reason),
        )
        .await
        .map_err(GatewayError::from)?;
        tx.commit().await.map_err(GatewayError::from)?;
        Ok(())
    }

    async fn reverse_sold_to_rejected(&self, lead_id: Uuid, reason: &str) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(GatewayError::from)?;
        // winning_buyer_id / winning_bid are left untouched: retained for audit.
        sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
            .bind(rows::lead_status_str(LeadStatus::Rejected))
            .bind(lead_id)
            .execute(&mut *tx)
            .await
            .map_err(GatewayError::from)?;
        Self::record_status_history(
            &mut tx,
            lead_id,
            Some(LeadStatus::Sold),
            LeadStatus::Rejected,
            Some(reason),
        )
        .await
        .map_err(GatewayError::from)?;
        tx.commit().await.map_err(GatewayError::from)?;
        Ok(())
    }

    async fn get_buyer(&self, buyer_id: Uuid) -> Result<Buyer, CoreError> {
        let row: BuyerRow = sqlx::query_as("SELECT * FROM buyers WHERE id = $1")
            .bind(buyer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(GatewayError::from)?;
        Ok(row.into())
    }

    async fn get_buyer_by_name(&self, name: &str) -> Result<Buyer, CoreError> {
        let row: BuyerRow = sqlx::query_as("SELECT * FROM buyers WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(GatewayError::from)?;
        Ok(row.into())
    }

    async fn get_eligibility_candidates(
        &self,
        service_type_id: Uuid,
        zip_code: &str,
    ) -> Result<Vec<EligibilityCandidate>, CoreError> {
        let rows: Vec<EligibilityCandidateRow> = sqlx::query_as(
            "SELECT z.buyer_id AS buyer_id, b.name AS buyer_name, z.priority AS zip_priority, \
             z.max_leads_per_day AS max_leads_per_day, z.min_bid AS zip_min_bid, z.max_bid AS zip_max_bid, \
             c.min_bid AS config_min_bid, c.max_bid AS config_max_bid, \
             c.requires_trusted_form AS requires_trusted_form, c.requires_jornaya AS requires_jornaya, \
             c.ping_template AS ping_template, c.post_template AS post_template \
             FROM buyer_service_zip_codes z \
             JOIN buyer_service_configs c ON c.buyer_id = z.buyer_id AND c.service_type_id = z.service_type_id \
             JOIN buyers b ON b.id = z.buyer_id \
             WHERE z.service_type_id = $1 AND z.zip_code = $2 \
               AND z.active AND c.active AND b.active \
             ORDER BY z.priority ASC",
        )
        .bind(service_type_id)
        .bind(zip_code)
        .fetch_all(&self.pool)
        .await
        .map_err(GatewayError::from)?;

        Ok(rows
            .into_iter()
            .map(|r| EligibilityCandidate {
                buyer_id: r.buyer_id,
                buyer_name: r.buyer_name,
                priority: r.zip_priority,
                max_leads_per_day: r.max_leads_per_day.map(|v| v as u32),
                // The zip row's bid bounds are authoritative when present;
                // the service config's bounds are the fallback (§9 open question).
                min_bid: r.zip_min_bid.map(Money::from_decimal).unwrap_or(Money::from_decimal(r.config_min_bid)),
                max_bid: r.zip_max_bid.map(Money::from_decimal).unwrap_or(Money::from_decimal(r.config_max_bid)),
                requires_trusted_form: r.requires_trusted_form,
                requires_jornaya: r.requires_jornaya,
                ping_template: r.ping_template.0,
                post_template: r.post_template.0,
            })
            .collect())
    }

    async fn count_buyer_daily_posts(
        &self,
        buyer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, CoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions \
             WHERE buyer_id = $1 AND action_type = 'POST' AND status = 'SUCCESS' AND created_at >= $2",
        )
        .bind(buyer_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(count as u32)
    }

    async fn get_highest_ping_bid(&self, lead_id: Uuid) -> Result<Option<Money>, CoreError> {
        let amount: Option<rust_decimal::Decimal> = sqlx::query_scalar(
            "SELECT MAX(bid_amount) FROM transactions \
             WHERE lead_id = $1 AND action_type = 'PING' AND status = 'SUCCESS'",
        )
        .bind(lead_id)
        .fetch_one(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(amount.map(Money::from_decimal))
    }

    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO transactions (id, lead_id, buyer_id, action_type, status, bid_amount, \
             response_time_ms, payload, response, compliance_included, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(txn.id)
        .bind(txn.lead_id)
        .bind(txn.buyer_id)
        .bind(rows::action_type_str(txn.action_type))
        .bind(rows::txn_status_str(txn.status))
        .bind(txn.bid_amount.map(|m| m.raw()))
        .bind(txn.response_time_ms as i32)
        .bind(serde_json::Value::from(txn.payload.clone()))
        .bind(serde_json::Value::from(txn.response.clone()))
        .bind(txn.compliance_included)
        .bind(txn.created_at)
        .execute(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn insert_audit_log(&self, log: &ComplianceAuditLog) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO compliance_audit_log (id, lead_id, event_type, event_data, ip_address, \
             user_agent, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(log.id)
        .bind(log.lead_id)
        .bind(&log.event_type)
        .bind(serde_json::Value::from(log.event_data.clone()))
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn insert_webhook_audit(&self, audit: &WebhookAudit) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO webhook_audit (id, buyer_id, lead_id, action, raw_body, transaction_id, \
             signature_valid, http_status, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(audit.id)
        .bind(audit.buyer_id)
        .bind(audit.lead_id)
        .bind(&audit.action)
        .bind(&audit.raw_body)
        .bind(&audit.transaction_id)
        .bind(audit.signature_valid)
        .bind(audit.http_status as i16)
        .bind(audit.created_at)
        .execute(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn find_webhook_audit_by_dedup(
        &self,
        buyer_id: Uuid,
        transaction_id: &str,
    ) -> Result<Option<WebhookAudit>, CoreError> {
        let row: Option<WebhookAuditRow> = sqlx::query_as(
            "SELECT * FROM webhook_audit WHERE buyer_id = $1 AND transaction_id = $2",
        )
        .bind(buyer_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(row.map(Into::into))
    }

    async fn enqueue_job(&self, lead_id: Uuid, priority: &str) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO lead_jobs (lead_id, priority, status, attempts, created_at) \
             VALUES ($1, $2, 'queued', 0, now()) \
             ON CONFLICT (lead_id) DO NOTHING",
        )
        .bind(lead_id)
        .bind(priority)
        .execute(&self.pool)
        .await
        .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn dequeue_job(&self, lease_for: chrono::Duration) -> Result<Option<QueuedJob>, CoreError> {
        let mut tx = self.pool.begin().await.map_err(GatewayError::from)?;
        let row: Option<(Uuid, String, i32)> = sqlx::query_as(
            "SELECT lead_id, priority, attempts FROM lead_jobs \
             WHERE status = 'queued' \
             ORDER BY priority ASC, created_at ASC \
             LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(GatewayError::from)?;

        let Some((lead_id, priority, attempts)) = row else {
            tx.commit().await.map_err(GatewayError::from)?;
            return Ok(None);
        };

        let lease_expires = Utc::now() + lease_for;
        sqlx::query(
            "UPDATE lead_jobs SET status = 'leased', attempts = attempts + 1, lease_expires_at = $1 \
             WHERE lead_id = $2",
        )
        .bind(lease_expires)
        .bind(lead_id)
        .execute(&mut *tx)
        .await
        .map_err(GatewayError::from)?;
        tx.commit().await.map_err(GatewayError::from)?;

        Ok(Some(QueuedJob { lead_id, priority, attempts: attempts + 1 }))
    }

    async fn mark_job_done(&self, lead_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("UPDATE lead_jobs SET status = 'done' WHERE lead_id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn mark_job_dead(&self, lead_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("UPDATE lead_jobs SET status = 'dead', failed_at = now() WHERE lead_id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead_jobs WHERE status = 'queued'")
            .fetch_one(&self.pool)
            .await
            .map_err(GatewayError::from)?;
        Ok(count as u64)
    }
}
