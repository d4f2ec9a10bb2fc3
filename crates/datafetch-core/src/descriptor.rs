//! Resource descriptors and their canonical record key.
//!
//! A descriptor names a fetchable artifact independently of transport: a
//! resource name plus request parameters. The record key is the compact JSON
//! encoding of `{"name": .., "params": ..}` with params held in a `BTreeMap`,
//! so insertion order never changes the key while any differing value does.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    #[serde(serialize_with = "serialize_float")]
    Float(f64),
    Str(String),
}

/// JSON has no NaN or infinities; they become `{"float":"NaN"}` (`"inf"`, `"-inf"`)
/// so each keeps a distinct key instead of collapsing to `null`.
fn serialize_float<S: Serializer>(x: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if x.is_finite() {
        return serializer.serialize_f64(*x);
    }
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry("float", &x.to_string())?;
    map.end()
}

impl Scalar {
    /// Parse a CLI-style value: integer, float, `true`/`false`, else string.
    /// Numbers only qualify when they print back identically, so `"02"` stays a string.
    pub fn parse_loose(s: &str) -> Self {
        if let Ok(i) = s.parse::<i64>() {
            if i.to_string() == s {
                return Scalar::Int(i);
            }
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() && f.to_string() == s {
                return Scalar::Float(f);
            }
        }
        match s {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => Scalar::Str(s.to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

/// A parameter: one scalar or a list of scalars (list order is significant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::One(Scalar::Str(s.to_string()))
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::One(Scalar::Str(s))
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::One(Scalar::Int(i))
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::One(Scalar::Float(x))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::One(Scalar::Bool(b))
    }
}

impl From<Vec<Scalar>> for ParamValue {
    fn from(v: Vec<Scalar>) -> Self {
        ParamValue::Many(v)
    }
}

/// Logical identifier of a fetchable artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insertion.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parse params from a JSON object (`{"year": "2021", "time": ["00:00", "06:00"]}`).
    pub fn with_params_json(name: impl Into<String>, json: &str) -> serde_json::Result<Self> {
        let params: BTreeMap<String, ParamValue> = serde_json::from_str(json)?;
        Ok(Self {
            name: name.into(),
            params,
        })
    }

    /// Canonical record key. Deterministic for equal descriptors.
    pub fn key(&self) -> String {
        // BTreeMap keeps params sorted; struct fields serialize in declaration order.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{}?{:?}", self.name, self.params))
    }

    /// Params as a JSON object, as sent to remote job APIs.
    pub fn params_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
