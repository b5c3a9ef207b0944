//! Persisted form of an output
//!
//! Pipeline files store an output as a flat mapping: the fingerprint fields
//! followed by `path`, and for outputs (not dependencies) `cache` and
//! `metric`:
//!
//! ```json
//! {"sha256": "9f86d0...", "size": "4", "path": "data/train.csv", "cache": true, "metric": false}
//! ```

use super::{Output, OutputOptions, Role};
use crate::context::ProjectContext;
use crate::error::{OutputError, Result};
use crate::fingerprint::Fingerprint;
use crate::metric::Metric;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Key holding the declared location
pub const PARAM_PATH: &str = "path";
/// Key holding the cache flag
pub const PARAM_CACHE: &str = "cache";
/// Key holding the metric descriptor
pub const PARAM_METRIC: &str = "metric";

impl Output {
    /// Persisted mapping for this output
    pub fn dumpd(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(info) = &self.info {
            for (key, value) in info.iter() {
                map.insert(key.clone(), Value::String(value.clone()));
            }
        }
        map.insert(PARAM_PATH.to_string(), Value::String(self.identity.url.clone()));

        if self.is_dependency() {
            return map;
        }

        map.insert(PARAM_CACHE.to_string(), Value::Bool(self.use_cache));
        map.insert(PARAM_METRIC.to_string(), self.metric.to_value());
        map
    }

    /// Rebuild an output from its persisted mapping
    ///
    /// `cache` defaults to true and `metric` to false; every other key is a
    /// fingerprint field.
    ///
    /// # Errors
    ///
    /// - [`OutputError::InvalidEntry`] if `path` is missing or a field has the
    ///   wrong type
    /// - [`OutputError::InvalidMetric`] if `metric` violates the metric schema
    /// - any construction error of [`Output::new`]
    pub fn loadd(ctx: Arc<ProjectContext>, map: &Map<String, Value>, role: Role) -> Result<Output> {
        let url = match map.get(PARAM_PATH) {
            Some(Value::String(url)) => url.clone(),
            Some(other) => {
                return Err(OutputError::InvalidEntry(format!(
                    "'{}' must be a string, got {}",
                    PARAM_PATH, other
                )));
            }
            None => return Err(OutputError::InvalidEntry(format!("missing '{}'", PARAM_PATH))),
        };

        let cache = match map.get(PARAM_CACHE) {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(OutputError::InvalidEntry(format!(
                    "'{}' must be a boolean, got {}",
                    PARAM_CACHE, other
                )));
            }
        };
        let metric = map.get(PARAM_METRIC).map(Metric::from_value).transpose()?.unwrap_or_default();

        let mut info = Fingerprint::new();
        for (key, value) in map {
            if key == PARAM_PATH || key == PARAM_CACHE || key == PARAM_METRIC {
                continue;
            }
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(OutputError::InvalidEntry(format!(
                        "fingerprint field '{}' must be a string, got {}",
                        key, other
                    )));
                }
            };
            info.insert(key.clone(), value);
        }

        Output::new(
            ctx,
            url,
            OutputOptions {
                info: (!info.is_empty()).then_some(info),
                remote: None,
                cache,
                metric,
                role,
            },
        )
    }
}
