//! Constructors for tests across the workspace, mirroring the shape of a
//! hand-rolled fixture builder rather than a generic `Default`.

use crate::domain::{
    AuthConfig, Buyer, BuyerServiceConfig, BuyerServiceZipCode, BuyerType, ComplianceData, Lead,
    LeadStatus, Timeframe,
};
use crate::mapping::{FieldEntry, FieldMapping};
use crate::money::Money;
use crate::value::Value;
use chrono::Utc;
use uuid::Uuid;

pub fn test_service_type_id() -> Uuid {
    Uuid::from_u128(1)
}

pub fn test_lead(service_type_id: Uuid, zip_code: &str) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        service_type_id,
        zip_code: zip_code.to_string(),
        owns_home: true,
        timeframe: Timeframe::Immediately,
        form_data: Value::map(),
        compliance: ComplianceData {
            trusted_form_cert_url: None,
            trusted_form_cert_id: None,
            jornaya_lead_id: None,
            tcpa_consent: true,
            attribution: Value::map(),
            trusted_form_compliance_score: None,
        },
        lead_quality_score: 50,
        status: LeadStatus::Pending,
        winning_buyer_id: None,
        winning_bid: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn identity_mapping(fields: &[(&str, &str)]) -> FieldMapping {
    FieldMapping {
        entries: fields
            .iter()
            .map(|(source, target)| FieldEntry {
                source_path: source.to_string(),
                target_path: target.to_string(),
                transform_id: None,
                default: None,
            })
            .collect(),
        compliance_aliases: vec![],
    }
}

pub fn test_buyer(name: &str) -> Buyer {
    Buyer {
        id: Uuid::new_v4(),
        name: name.to_string(),
        buyer_type: BuyerType::Contractor,
        api_url: format!("https://buyers.example/{name}"),
        auth_config: AuthConfig::Bearer { token: "test-token".to_string() },
        ping_timeout_ms: 2000,
        post_timeout_ms: 5000,
        active: true,
        compliance_field_mappings: None,
        webhook_secret: Some("test-secret".to_string()),
    }
}

pub fn test_service_config(buyer_id: Uuid, service_type_id: Uuid, priority: u8) -> BuyerServiceConfig {
    BuyerServiceConfig {
        buyer_id,
        service_type_id,
        ping_template: identity_mapping(&[("lead.zipCode", "zip")]),
        post_template: identity_mapping(&[("lead.zipCode", "zip")]),
        min_bid: Money::from_str_opt(Some("0")).unwrap(),
        max_bid: Money::from_str_opt(Some("10000")).unwrap(),
        priority,
        requires_trusted_form: false,
        requires_jornaya: false,
        active: true,
    }
}

pub fn test_zip_row(
    buyer_id: Uuid,
    service_type_id: Uuid,
    zip_code: &str,
    priority: u16,
) -> BuyerServiceZipCode {
    BuyerServiceZipCode {
        buyer_id,
        service_type_id,
        zip_code: zip_code.to_string(),
        active: true,
        priority,
        max_leads_per_day: None,
        min_bid: None,
        max_bid: None,
    }
}
