//! Building outputs for a stage

use super::{Output, OutputOptions, Role};
use crate::context::ProjectContext;
use crate::error::Result;
use crate::metric::Metric;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Creates outputs, picking the backend that claims each url
pub struct OutputFactory;

impl OutputFactory {
    /// Output for a single declared location
    ///
    /// # Errors
    ///
    /// - [`OutputError::UnsupportedUrl`](crate::OutputError::UnsupportedUrl) if no
    ///   backend claims `url`
    pub fn create(ctx: Arc<ProjectContext>, url: &str, options: OutputOptions) -> Result<Output> {
        let output = Output::new(ctx, url, options)?;
        debug!("Created {:?}", output);
        Ok(output)
    }

    /// Outputs from persisted mappings
    pub fn load(ctx: &Arc<ProjectContext>, entries: &[Map<String, Value>], role: Role) -> Result<Vec<Output>> {
        let outputs = entries
            .iter()
            .map(|entry| Output::loadd(ctx.clone(), entry, role))
            .collect::<Result<Vec<_>>>()?;
        debug!("Loaded {} {:?} entries", outputs.len(), role);
        Ok(outputs)
    }

    /// Outputs for a list of declared locations sharing the same options
    pub fn load_from(
        ctx: &Arc<ProjectContext>,
        urls: &[&str],
        role: Role,
        cache: bool,
        metric: Metric,
    ) -> Result<Vec<Output>> {
        urls.iter()
            .map(|url| {
                Self::create(
                    ctx.clone(),
                    url,
                    OutputOptions {
                        cache,
                        metric: metric.clone(),
                        role,
                        ..OutputOptions::default()
                    },
                )
            })
            .collect()
    }
}
