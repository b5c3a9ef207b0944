//! Property-based testing for outtrack
//!
//! Uses proptest to check the persisted form of outputs across randomly
//! generated urls, fingerprints, cache flags and metrics.

use ::outtrack::*;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

/// Generate relative local urls and object-store urls
pub fn url_strategy() -> impl Strategy<Value = String> {
    let segment = "[a-z][a-z0-9_]{0,7}";
    prop_oneof![
        (prop::collection::vec(segment, 0..3), "[a-z]{1,8}\\.(csv|json|pkl)")
            .prop_map(|(dirs, file)| {
                let mut parts = dirs;
                parts.push(file);
                parts.join("/")
            }),
        (segment, "[a-z]{1,8}\\.(csv|json|pkl)")
            .prop_map(|(bucket, key)| format!("s3://{}/{}", bucket, key)),
    ]
}

/// Generate metrics of every variant
pub fn metric_strategy() -> impl Strategy<Value = Metric> {
    prop_oneof![
        Just(Metric::NotAMetric),
        Just(Metric::Simple),
        (
            prop::option::of(prop_oneof![Just("json".to_string()), Just("csv".to_string()), Just("tsv".to_string())]),
            prop::option::of(prop_oneof![Just(String::new()), "/[a-z]{1,5}(/[a-z]{1,5})?"]),
        )
            .prop_map(|(metric_type, xpath)| Metric::Structured { metric_type, xpath }),
    ]
}

/// Generate fingerprints shaped like the ones backends produce
pub fn fingerprint_strategy() -> impl Strategy<Value = Option<Fingerprint>> {
    prop::option::of(prop_oneof![
        ("[0-9a-f]{64}", 0u64..1_000_000).prop_map(|(hash, size)| Fingerprint::from_hash(hash, size)),
        ("[0-9a-f]{64}", 0u64..1_000_000)
            .prop_map(|(hash, size)| Fingerprint::from_hash(format!("{}.dir", hash), size)),
        ("[0-9a-f]{32}", 0u64..1_000_000).prop_map(|(etag, size)| {
            Fingerprint::new()
                .with("etag", format!("\"{}\"", etag))
                .with("size", size.to_string())
        }),
    ])
}

/// Context with caches for local and S3 outputs and no real transport
pub fn project() -> (TempDir, Arc<ProjectContext>) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ProjectConfig::default();
    config
        .cache
        .remote
        .insert("s3".to_string(), "s3://cache-bucket/cache".to_string());
    let ctx = Arc::new(
        ProjectContext::builder(temp_dir.path())
            .config(config)
            .object_store(Scheme::S3, Arc::new(MemoryObjectStore::new()))
            .scm(Arc::new(NoScm))
            .build()
            .unwrap(),
    );
    (temp_dir, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_loadd_preserves_output(
            url in url_strategy(),
            info in fingerprint_strategy(),
            cache in any::<bool>(),
            metric in metric_strategy(),
        ) {
            let (_temp_dir, ctx) = project();
            let mut builder = Output::builder(ctx.clone(), url.clone())
                .cache(cache)
                .metric(metric.clone());
            if let Some(info) = info.clone() {
                builder = builder.info(info);
            }
            let out = builder.build().unwrap();

            let text = serde_json::to_string(&out.dumpd()).unwrap();
            let map: serde_json::Map<String, Value> = serde_json::from_str(&text).unwrap();
            let reloaded = Output::loadd(ctx, &map, Role::Output).unwrap();

            prop_assert_eq!(reloaded.url(), url.as_str());
            prop_assert_eq!(reloaded.info(), info.as_ref());
            prop_assert_eq!(reloaded.use_cache(), cache);
            prop_assert_eq!(reloaded.metric(), &metric.normalized());
        }

        #[test]
        fn prop_dependency_never_persists_cache_or_metric(
            url in url_strategy(),
            cache in any::<bool>(),
            metric in metric_strategy(),
        ) {
            let (_temp_dir, ctx) = project();
            let dep = Output::builder(ctx, url)
                .cache(cache)
                .metric(metric)
                .role(Role::Dependency)
                .build()
                .unwrap();

            let map = dep.dumpd();
            prop_assert!(!map.contains_key("cache"));
            prop_assert!(!map.contains_key("metric"));
            prop_assert!(!dep.use_cache());
            prop_assert_eq!(dep.metric(), &Metric::NotAMetric);
        }

        #[test]
        fn prop_empty_xpath_is_dropped(
            metric_type in "(json|csv|tsv|htsv)",
            xpath in prop_oneof![Just(String::new()), "/[a-z]{1,5}/[a-z]{1,5}"],
        ) {
            let value = Metric::structured(metric_type.clone(), xpath.clone()).to_value();
            let map = value.as_object().unwrap();

            prop_assert_eq!(map.get("type"), Some(&Value::String(metric_type)));
            if xpath.is_empty() {
                prop_assert!(!map.contains_key("xpath"));
            } else {
                prop_assert_eq!(map.get("xpath"), Some(&Value::String(xpath)));
            }
        }

        #[test]
        fn prop_missing_artifact_is_always_changed(
            url in url_strategy(),
            info in fingerprint_strategy(),
            cache in any::<bool>(),
        ) {
            prop_assume!(!url.starts_with("s3://"));
            let (_temp_dir, ctx) = project();
            let mut builder = Output::builder(ctx, url).cache(cache);
            if let Some(info) = info {
                builder = builder.info(info);
            }
            let out = builder.build().unwrap();
            prop_assert!(out.changed().unwrap());
            prop_assert_eq!(out.status().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_xpath_examples() {
        let dropped = Metric::structured("csv", "").to_value();
        assert_eq!(dropped, serde_json::json!({"type": "csv"}));

        let kept = Metric::structured("csv", "/a/b").to_value();
        assert_eq!(kept, serde_json::json!({"type": "csv", "xpath": "/a/b"}));
    }
}
