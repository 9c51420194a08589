//! Row <-> domain-type conversions. sqlx maps columns onto these `FromRow`
//! structs; the `From`/`TryFrom` impls translate them into `lead_core::domain`
//! types (and back, for inserts).

use chrono::{DateTime, Utc};
use lead_core::domain::{
    ActionType, AuthConfig, Buyer, BuyerType, ComplianceAuditLog, ComplianceData, Lead, LeadStatus,
    LeadStatusHistory, Timeframe, Transaction, TransactionStatus, WebhookAudit,
};
use lead_core::mapping::FieldMapping;
use lead_core::money::Money;
use lead_core::value::Value;
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

fn money_from_opt(d: Option<Decimal>) -> Option<Money> {
    d.map(Money::from_decimal)
}

fn value_from_json(json: serde_json::Value) -> Value {
    Value::from(json)
}

#[derive(Debug, sqlx::FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub service_type_id: Uuid,
    pub zip_code: String,
    pub owns_home: bool,
    pub timeframe: String,
    pub form_data: serde_json::Value,
    pub trusted_form_cert_url: Option<String>,
    pub trusted_form_cert_id: Option<String>,
    pub jornaya_lead_id: Option<String>,
    pub tcpa_consent: bool,
    pub attribution: serde_json::Value,
    pub trusted_form_compliance_score: Option<i16>,
    pub lead_quality_score: i32,
    pub status: String,
    pub winning_buyer_id: Option<Uuid>,
    pub winning_bid: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        Lead {
            id: row.id,
            service_type_id: row.service_type_id,
            zip_code: row.zip_code,
            owns_home: row.owns_home,
            timeframe: parse_timeframe(&row.timeframe),
            form_data: value_from_json(row.form_data),
            compliance: ComplianceData {
                trusted_form_cert_url: row.trusted_form_cert_url,
                trusted_form_cert_id: row.trusted_form_cert_id,
                jornaya_lead_id: row.jornaya_lead_id,
                tcpa_consent: row.tcpa_consent,
                attribution: value_from_json(row.attribution),
                trusted_form_compliance_score: row.trusted_form_compliance_score.map(|v| v as u8),
            },
            lead_quality_score: row.lead_quality_score,
            status: parse_lead_status(&row.status),
            winning_buyer_id: row.winning_buyer_id,
            winning_bid: money_from_opt(row.winning_bid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub fn lead_status_str(status: LeadStatus) -> &'static str {
    match status {
        LeadStatus::Pending => "PENDING",
        LeadStatus::Processing => "PROCESSING",
        LeadStatus::Sold => "SOLD",
        LeadStatus::Rejected => "REJECTED",
        LeadStatus::Failed => "FAILED",
    }
}

fn parse_lead_status(s: &str) -> LeadStatus {
    match s {
        "PROCESSING" => LeadStatus::Processing,
        "SOLD" => LeadStatus::Sold,
        "REJECTED" => LeadStatus::Rejected,
        "FAILED" => LeadStatus::Failed,
        _ => LeadStatus::Pending,
    }
}

pub fn timeframe_str(t: Timeframe) -> &'static str {
    match t {
        Timeframe::Immediately => "immediately",
        Timeframe::WithinMonth => "within_month",
        Timeframe::Within3Months => "within_3_months",
        Timeframe::Researching => "researching",
    }
}

fn parse_timeframe(s: &str) -> Timeframe {
    match s {
        "within_month" => Timeframe::WithinMonth,
        "within_3_months" => Timeframe::Within3Months,
        "researching" => Timeframe::Researching,
        _ => Timeframe::Immediately,
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct BuyerRow {
    pub id: Uuid,
    pub name: String,
    pub buyer_type: String,
    pub api_url: String,
    pub auth_config: Json<AuthConfig>,
    pub ping_timeout_ms: i32,
    pub post_timeout_ms: i32,
    pub active: bool,
    pub compliance_field_mappings: Option<Json<FieldMapping>>,
    pub webhook_secret: Option<String>,
}

impl From<BuyerRow> for Buyer {
    fn from(row: BuyerRow) -> Self {
        Buyer {
            id: row.id,
            name: row.name,
            buyer_type: if row.buyer_type == "NETWORK" { BuyerType::Network } else { BuyerType::Contractor },
            api_url: row.api_url,
            auth_config: row.auth_config.0,
            ping_timeout_ms: row.ping_timeout_ms as u32,
            post_timeout_ms: row.post_timeout_ms as u32,
            active: row.active,
            compliance_field_mappings: row.compliance_field_mappings.map(|j| j.0),
            webhook_secret: row.webhook_secret,
        }
    }
}

/// The joined result of the C3 step 1-2 read pass: a zip row paired with its
/// buyer and service-config context.
#[derive(Debug, sqlx::FromRow)]
pub struct EligibilityCandidateRow {
    pub buyer_id: Uuid,
    pub buyer_name: String,
    pub zip_priority: i32,
    pub max_leads_per_day: Option<i32>,
    pub zip_min_bid: Option<Decimal>,
    pub zip_max_bid: Option<Decimal>,
    pub config_min_bid: Decimal,
    pub config_max_bid: Decimal,
    pub requires_trusted_form: bool,
    pub requires_jornaya: bool,
    pub ping_template: Json<FieldMapping>,
    pub post_template: Json<FieldMapping>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub buyer_id: Uuid,
    pub action_type: String,
    pub status: String,
    pub bid_amount: Option<Decimal>,
    pub response_time_ms: i32,
    pub payload: serde_json::Value,
    pub response: serde_json::Value,
    pub compliance_included: bool,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.id,
            lead_id: row.lead_id,
            buyer_id: row.buyer_id,
            action_type: if row.action_type == "POST" { ActionType::Post } else { ActionType::Ping },
            status: parse_txn_status(&row.status),
            bid_amount: money_from_opt(row.bid_amount),
            response_time_ms: row.response_time_ms as u32,
            payload: value_from_json(row.payload),
            response: value_from_json(row.response),
            compliance_included: row.compliance_included,
            created_at: row.created_at,
        }
    }
}

pub fn action_type_str(a: ActionType) -> &'static str {
    match a {
        ActionType::Ping => "PING",
        ActionType::Post => "POST",
    }
}

pub fn txn_status_str(s: TransactionStatus) -> &'static str {
    match s {
        TransactionStatus::Success => "SUCCESS",
        TransactionStatus::Failed => "FAILED",
        TransactionStatus::Timeout => "TIMEOUT",
    }
}

fn parse_txn_status(s: &str) -> TransactionStatus {
    match s {
        "FAILED" => TransactionStatus::Failed,
        "TIMEOUT" => TransactionStatus::Timeout,
        _ => TransactionStatus::Success,
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for ComplianceAuditLog {
    fn from(row: AuditLogRow) -> Self {
        ComplianceAuditLog {
            id: row.id,
            lead_id: row.lead_id,
            event_type: row.event_type,
            event_data: value_from_json(row.event_data),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct WebhookAuditRow {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub action: String,
    pub raw_body: String,
    pub transaction_id: Option<String>,
    pub signature_valid: bool,
    pub http_status: i16,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookAuditRow> for WebhookAudit {
    fn from(row: WebhookAuditRow) -> Self {
        WebhookAudit {
            id: row.id,
            buyer_id: row.buyer_id,
            lead_id: row.lead_id,
            action: row.action,
            raw_body: row.raw_body,
            transaction_id: row.transaction_id,
            signature_valid: row.signature_valid,
            http_status: row.http_status as u16,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct StatusHistoryRow {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StatusHistoryRow> for LeadStatusHistory {
    fn from(row: StatusHistoryRow) -> Self {
        LeadStatusHistory {
            id: row.id,
            lead_id: row.lead_id,
            from_status: row.from_status.as_deref().map(parse_lead_status),
            to_status: parse_lead_status(&row.to_status),
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

