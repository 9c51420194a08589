//! A tagged value tree used for lead/compliance/attribution data and for the
//! outbound JSON payloads built by the field mapper. Dotted-path lookup is a
//! left-fold over map keys and list indices.

use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(Number),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Looks up a dotted path such as `compliance.trustedForm.certUrl`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                Value::Map(map) => map.get(segment)?,
                Value::List(list) => {
                    let index: usize = segment.parse().ok()?;
                    list.get(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets a dotted path, creating intermediate maps as needed. Only
    /// map-shaped targets are supported (the field mapper never targets list
    /// indices).
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::set_recursive(self, &segments, value);
    }

    fn set_recursive(node: &mut Value, segments: &[&str], value: Value) {
        if segments.is_empty() {
            return;
        }
        if !matches!(node, Value::Map(_)) {
            *node = Value::map();
        }
        let Value::Map(map) = node else { unreachable!() };
        let (head, rest) = (segments[0], &segments[1..]);
        if rest.is_empty() {
            map.insert(head.to_string(), value);
        } else {
            let entry = map.entry(head.to_string()).or_insert_with(Value::map);
            Self::set_recursive(entry, rest, value);
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::Value::from(self.clone()))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Num(n),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Num(n) => serde_json::Value::Number(n),
            Value::Str(s) => serde_json::Value::String(s),
            Value::List(l) => serde_json::Value::Array(l.into_iter().map(Into::into).collect()),
            Value::Map(m) => {
                serde_json::Value::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_json::Value::from(self.clone()).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        let json = serde_json::json!({
            "lead": { "zipCode": "90210" },
            "compliance": { "trustedForm": { "certUrl": "https://x" } },
            "attribution": { "source": null }
        });
        Value::from(json)
    }

    #[test]
    fn gets_nested_path() {
        let v = sample();
        assert_eq!(v.get_path("lead.zipCode").unwrap().as_str(), Some("90210"));
        assert_eq!(
            v.get_path("compliance.trustedForm.certUrl").unwrap().as_str(),
            Some("https://x")
        );
    }

    #[test]
    fn missing_path_is_none() {
        let v = sample();
        assert!(v.get_path("lead.missing.deeper").is_none());
        assert!(v.get_path("nope").is_none());
    }

    #[test]
    fn null_leaf_is_some_null() {
        let v = sample();
        assert_eq!(v.get_path("attribution.source"), Some(&Value::Null));
    }

    #[test]
    fn set_path_builds_intermediate_maps() {
        let mut target = Value::map();
        target.set_path("xxTrustedFormCertUrl", Value::from("https://x"));
        target.set_path("nested.inner", Value::from(true));
        assert_eq!(target.get_path("xxTrustedFormCertUrl").unwrap().as_str(), Some("https://x"));
        assert_eq!(target.get_path("nested.inner").unwrap().as_bool(), Some(true));
    }
}
