//! The data model (§3): Lead, Buyer, BuyerServiceConfig, BuyerServiceZipCode,
//! Transaction, ComplianceAuditLog, ServiceType, and the supplemental
//! LeadStatusHistory/WebhookAudit tables (SPEC_FULL §3).

use crate::mapping::FieldMapping;
use crate::money::Money;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeadStatus {
    Pending,
    Processing,
    Sold,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Immediately,
    WithinMonth,
    Within3Months,
    Researching,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceData {
    pub trusted_form_cert_url: Option<String>,
    pub trusted_form_cert_id: Option<String>,
    pub jornaya_lead_id: Option<String>,
    pub tcpa_consent: bool,
    pub attribution: Value,
    /// TrustedForm's own confidence score, when present, used to compute
    /// `lead_quality_score` per §6.1.
    pub trusted_form_compliance_score: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub service_type_id: Uuid,
    pub zip_code: String,
    pub owns_home: bool,
    pub timeframe: Timeframe,
    pub form_data: Value,
    pub compliance: ComplianceData,
    pub lead_quality_score: i32,
    pub status: LeadStatus,
    pub winning_buyer_id: Option<Uuid>,
    pub winning_bid: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// A source view composing `{ lead, formData, compliance, attribution }`
    /// for the field mapper (§4.4, §9).
    pub fn as_source_view(&self) -> Value {
        let mut root = Value::map();
        root.set_path("lead.id", Value::from(self.id.to_string()));
        root.set_path("lead.serviceTypeId", Value::from(self.service_type_id.to_string()));
        root.set_path("lead.zipCode", Value::from(self.zip_code.clone()));
        root.set_path("lead.ownsHome", Value::from(self.owns_home));
        root.set_path("lead.timeframe", Value::from(format!("{:?}", self.timeframe)));
        root.set_path("lead.leadQualityScore", Value::Num(self.lead_quality_score.into()));
        root.set_path("formData", self.form_data.clone());
        root.set_path(
            "compliance.trustedForm.certUrl",
            self.compliance
                .trusted_form_cert_url
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        root.set_path(
            "compliance.trustedForm.certId",
            self.compliance
                .trusted_form_cert_id
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        root.set_path(
            "compliance.jornaya.leadId",
            self.compliance.jornaya_lead_id.clone().map(Value::from).unwrap_or(Value::Null),
        );
        root.set_path("compliance.tcpaConsent", Value::from(self.compliance.tcpa_consent));
        root.set_path("attribution", self.compliance.attribution.clone());
        root
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuyerType {
    Contractor,
    Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthConfig {
    Bearer { token: String },
    Basic { username: String, password: String },
    Custom { headers: HashMap<String, String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buyer {
    pub id: Uuid,
    pub name: String,
    pub buyer_type: BuyerType,
    pub api_url: String,
    pub auth_config: AuthConfig,
    pub ping_timeout_ms: u32,
    pub post_timeout_ms: u32,
    pub active: bool,
    pub compliance_field_mappings: Option<FieldMapping>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerServiceConfig {
    pub buyer_id: Uuid,
    pub service_type_id: Uuid,
    pub ping_template: FieldMapping,
    pub post_template: FieldMapping,
    pub min_bid: Money,
    pub max_bid: Money,
    pub priority: u8,
    pub requires_trusted_form: bool,
    pub requires_jornaya: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerServiceZipCode {
    pub buyer_id: Uuid,
    pub service_type_id: Uuid,
    pub zip_code: String,
    pub active: bool,
    pub priority: u16,
    pub max_leads_per_day: Option<u32>,
    pub min_bid: Option<Money>,
    pub max_bid: Option<Money>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Ping,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Success,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub buyer_id: Uuid,
    pub action_type: ActionType,
    pub status: TransactionStatus,
    pub bid_amount: Option<Money>,
    pub response_time_ms: u32,
    pub payload: Value,
    pub response: Value,
    pub compliance_included: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAuditLog {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub event_type: String,
    pub event_data: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub form_schema: Value,
    pub active: bool,
}

/// SPEC_FULL §3 supplement: one row per `Lead.status` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadStatusHistory {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub from_status: Option<LeadStatus>,
    pub to_status: LeadStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// SPEC_FULL §3 supplement: retained 30 days, backs webhook idempotency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAudit {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub action: String,
    pub raw_body: String,
    pub transaction_id: Option<String>,
    pub signature_valid: bool,
    pub http_status: u16,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            service_type_id: Uuid::new_v4(),
            zip_code: "90210".into(),
            owns_home: true,
            timeframe: Timeframe::Immediately,
            form_data: Value::map(),
            compliance: ComplianceData {
                trusted_form_cert_url: Some("https://cert".into()),
                trusted_form_cert_id: None,
                jornaya_lead_id: None,
                tcpa_consent: true,
                attribution: Value::map(),
                trusted_form_compliance_score: Some(90),
            },
            lead_quality_score: 85,
            status: LeadStatus::Pending,
            winning_buyer_id: None,
            winning_bid: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn source_view_exposes_compliance_and_lead_fields() {
        let lead = sample_lead();
        let view = lead.as_source_view();
        assert_eq!(view.get_path("lead.zipCode").unwrap().as_str(), Some("90210"));
        assert_eq!(
            view.get_path("compliance.trustedForm.certUrl").unwrap().as_str(),
            Some("https://cert")
        );
        assert_eq!(view.get_path("compliance.jornaya.leadId"), Some(&Value::Null));
    }
}
