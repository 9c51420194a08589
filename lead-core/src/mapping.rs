//! The declarative field mapper (§4.4): projects a composite source view
//! into a buyer-specific outbound payload.

use crate::transforms;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// One mapping entry. `transform_id` is looked up in the transform registry;
/// an absent or unknown id is a pass-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldEntry {
    pub source_path: String,
    pub target_path: String,
    #[serde(default)]
    pub transform_id: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// A buyer's PING or POST template: an ordered list of field entries plus the
/// compliance-field alias table (one value fanned out to multiple target
/// keys, per §4.4 "compliance mapping").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMapping {
    pub entries: Vec<FieldEntry>,
    #[serde(default)]
    pub compliance_aliases: Vec<ComplianceAlias>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAlias {
    pub source_path: String,
    pub target_paths: Vec<String>,
}

/// Applies a mapping against a composite source view, producing the
/// outbound JSON-shaped `Value`.
pub fn apply(mapping: &FieldMapping, source: &Value) -> Value {
    let mut output = Value::map();

    for entry in &mapping.entries {
        let raw = source.get_path(&entry.source_path).cloned().unwrap_or(Value::Null);
        let transformed = match &entry.transform_id {
            Some(id) => transforms::apply(id, &raw),
            None => raw,
        };

        match (transformed.is_null(), &entry.default) {
            (false, _) => output.set_path(&entry.target_path, transformed),
            (true, Some(default)) => output.set_path(&entry.target_path, default.clone()),
            (true, None) => {}
        }
    }

    for alias in &mapping.compliance_aliases {
        let value = source.get_path(&alias.source_path).cloned();
        if let Some(value) = value {
            if !value.is_null() {
                for target in &alias.target_paths {
                    output.set_path(target, value.clone());
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Value {
        Value::from(serde_json::json!({
            "lead": { "ownsHome": true, "zipCode": "90210" },
            "compliance": { "trustedForm": { "certUrl": "https://cert" } },
            "formData": {},
            "attribution": {}
        }))
    }

    #[test]
    fn maps_with_transform_and_default() {
        let mapping = FieldMapping {
            entries: vec![
                FieldEntry {
                    source_path: "lead.ownsHome".into(),
                    target_path: "owns_home".into(),
                    transform_id: Some("yesNo".into()),
                    default: None,
                },
                FieldEntry {
                    source_path: "lead.missing".into(),
                    target_path: "fallback".into(),
                    transform_id: None,
                    default: Some(Value::from("n/a")),
                },
                FieldEntry {
                    source_path: "lead.missingNoDefault".into(),
                    target_path: "omitted".into(),
                    transform_id: None,
                    default: None,
                },
            ],
            compliance_aliases: vec![],
        };

        let out = apply(&mapping, &source());
        assert_eq!(out.get_path("owns_home").unwrap().as_str(), Some("Yes"));
        assert_eq!(out.get_path("fallback").unwrap().as_str(), Some("n/a"));
        assert!(out.get_path("omitted").is_none());
    }

    #[test]
    fn compliance_aliases_fan_out_one_value_to_many_keys() {
        let mapping = FieldMapping {
            entries: vec![],
            compliance_aliases: vec![ComplianceAlias {
                source_path: "compliance.trustedForm.certUrl".into(),
                target_paths: vec!["xxTrustedFormCertUrl".into(), "trustedFormToken".into()],
            }],
        };

        let out = apply(&mapping, &source());
        assert_eq!(out.get_path("xxTrustedFormCertUrl").unwrap().as_str(), Some("https://cert"));
        assert_eq!(out.get_path("trustedFormToken").unwrap().as_str(), Some("https://cert"));
    }

    #[test]
    fn unknown_transform_id_passes_value_through() {
        let mapping = FieldMapping {
            entries: vec![FieldEntry {
                source_path: "lead.zipCode".into(),
                target_path: "zip".into(),
                transform_id: Some("not-a-real-transform".into()),
                default: None,
            }],
            compliance_aliases: vec![],
        };
        let out = apply(&mapping, &source());
        assert_eq!(out.get_path("zip").unwrap().as_str(), Some("90210"));
    }
}
