//! Metric descriptors
//!
//! An output may be marked as a metric: a small file holding reportable
//! scalar or structured values rather than opaque data. Persisted pipeline
//! files encode this as `false`, `true`, or `{type, xpath}`.

use crate::error::{OutputError, Result};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key holding the metric type in a structured descriptor
pub const PARAM_METRIC_TYPE: &str = "type";
/// Key holding the metric xpath in a structured descriptor
pub const PARAM_METRIC_XPATH: &str = "xpath";

/// Whether and how an output is a metric
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Metric {
    /// Opaque data
    #[default]
    NotAMetric,
    /// Metric without further description
    Simple,
    /// Metric with a format and an optional path to the value
    Structured {
        /// Metric file format (e.g. `json`, `csv`)
        metric_type: Option<String>,
        /// Path to the value inside the file
        xpath: Option<String>,
    },
}

impl Metric {
    /// Structured metric shorthand
    pub fn structured(metric_type: impl Into<String>, xpath: impl Into<String>) -> Self {
        Metric::Structured {
            metric_type: Some(metric_type.into()),
            xpath: Some(xpath.into()),
        }
    }

    /// Whether the output is a metric at all
    pub fn is_metric(&self) -> bool {
        !matches!(self, Metric::NotAMetric)
    }

    /// Copy with an empty `xpath` dropped
    pub fn normalized(&self) -> Metric {
        match self {
            Metric::Structured { metric_type, xpath } => Metric::Structured {
                metric_type: metric_type.clone(),
                xpath: xpath.clone().filter(|x| !x.is_empty()),
            },
            other => other.clone(),
        }
    }

    /// Persisted form of the metric
    pub fn to_value(&self) -> Value {
        match self.normalized() {
            Metric::NotAMetric => Value::Bool(false),
            Metric::Simple => Value::Bool(true),
            Metric::Structured { metric_type, xpath } => {
                let mut map = serde_json::Map::new();
                map.insert(
                    PARAM_METRIC_TYPE.to_string(),
                    metric_type.map_or(Value::Null, Value::String),
                );
                if let Some(xpath) = xpath {
                    map.insert(PARAM_METRIC_XPATH.to_string(), Value::String(xpath));
                }
                Value::Object(map)
            }
        }
    }

    /// Parse a persisted metric, validating it against the metric schema
    ///
    /// Accepted: `null`, a boolean, or an object whose only keys are `type`
    /// and `xpath`, each a string or null.
    pub fn from_value(value: &Value) -> Result<Metric> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Metric::NotAMetric),
            Value::Bool(true) => Ok(Metric::Simple),
            Value::Object(map) => {
                let field = |key: &str| -> Result<Option<String>> {
                    match map.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(Value::String(s)) => Ok(Some(s.clone())),
                        Some(other) => Err(OutputError::InvalidMetric(format!(
                            "'{}' must be a string, got {}",
                            key, other
                        ))),
                    }
                };
                if let Some(unknown) = map
                    .keys()
                    .find(|k| k.as_str() != PARAM_METRIC_TYPE && k.as_str() != PARAM_METRIC_XPATH)
                {
                    return Err(OutputError::InvalidMetric(format!("unknown key '{}'", unknown)));
                }
                Ok(Metric::Structured {
                    metric_type: field(PARAM_METRIC_TYPE)?,
                    xpath: field(PARAM_METRIC_XPATH)?,
                })
            }
            other => Err(OutputError::InvalidMetric(format!(
                "expected bool or object, got {}",
                other
            ))),
        }
    }
}

impl From<bool> for Metric {
    fn from(flag: bool) -> Self {
        if flag {
            Metric::Simple
        } else {
            Metric::NotAMetric
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.to_value() {
            Value::Bool(flag) => serializer.serialize_bool(flag),
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in &map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            _ => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Metric::from_value(&value).map_err(de::Error::custom)
    }
}
