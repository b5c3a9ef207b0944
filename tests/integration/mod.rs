//! Integration tests for outtrack
//!
//! Drive outputs through the public API against real project directories:
//! a git-style ignore file, the local cache, and an in-memory object store
//! standing in for S3.

use ::outtrack::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A project directory with its context
pub struct ProjectHarness {
    pub temp_dir: TempDir,
    pub ctx: Arc<ProjectContext>,
}

impl ProjectHarness {
    /// Project using git ignore files and the default local cache
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let ctx = Arc::new(
            ProjectContext::builder(temp_dir.path())
                .scm(Arc::new(Git::new(temp_dir.path())))
                .build()
                .unwrap(),
        );
        Self { temp_dir, ctx }
    }

    /// Project with an S3 remote named `storage` and an S3 cache under it
    pub fn with_s3(store: Arc<MemoryObjectStore>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ProjectConfig::default();
        config
            .remotes
            .insert("storage".to_string(), "s3://bucket/project".to_string());
        config
            .cache
            .remote
            .insert("s3".to_string(), "remote://storage/cache".to_string());

        let ctx = Arc::new(
            ProjectContext::builder(temp_dir.path())
                .config(config)
                .object_store(Scheme::S3, store)
                .scm(Arc::new(NoScm))
                .build()
                .unwrap(),
        );
        Self { temp_dir, ctx }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.ctx.root().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn output(&self, url: &str) -> Output {
        Output::builder(self.ctx.clone(), url).build().unwrap()
    }

    /// Lines of the ignore file in `dir` (empty if there is none)
    pub fn ignored(&self, dir: &str) -> Vec<String> {
        fs::read_to_string(self.path(dir).join(".gitignore"))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl Default for ProjectHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    #[test]
    fn test_save_is_idempotent() {
        let harness = ProjectHarness::new();
        harness.write("data/train.csv", "a,b\n1,2\n");

        let mut out = harness.output("data/train.csv");
        assert_eq!(out.status_detail().unwrap(), OutputStatus::New);
        out.save().unwrap();
        let first = out.info().cloned().unwrap();
        out.save().unwrap();

        assert_eq!(out.info(), Some(&first));
        assert_eq!(first.size(), Some(8));
        assert_eq!(out.status_detail().unwrap(), OutputStatus::Unchanged);
    }

    #[test]
    fn test_move_updates_ignore_entries() {
        let harness = ProjectHarness::new();
        harness.write("data/train.csv", "a,b\n1,2\n");
        fs::create_dir_all(harness.path("data2")).unwrap();

        let mut out = harness.output("data/train.csv");
        out.verify().unwrap();
        out.save().unwrap();
        harness.ctx.scm().ignore(&harness.path("data/train.csv")).unwrap();
        assert_eq!(harness.ignored("data"), vec!["/train.csv"]);

        let target = Output::builder(harness.ctx.clone(), "data2/train.csv")
            .build()
            .unwrap();
        out.move_to(&target).unwrap();

        assert_eq!(out.url(), "data2/train.csv");
        assert!(!harness.path("data/train.csv").exists());
        assert_eq!(
            fs::read_to_string(harness.path("data2/train.csv")).unwrap(),
            "a,b\n1,2\n"
        );
        assert!(harness.ignored("data").is_empty());
        assert_eq!(harness.ignored("data2"), vec!["/train.csv"]);
        assert!(!out.changed().unwrap());
    }

    #[test]
    fn test_remove_drops_ignore_entry() {
        let harness = ProjectHarness::new();
        harness.write("model.pkl", "weights");
        fs::write(harness.path(".gitignore"), "*.log\n").unwrap();

        let mut out = harness.output("model.pkl");
        out.save().unwrap();
        harness.ctx.scm().ignore(&harness.path("model.pkl")).unwrap();
        assert_eq!(harness.ignored("."), vec!["*.log", "/model.pkl"]);

        out.remove(true).unwrap();
        assert!(!harness.path("model.pkl").exists());
        assert_eq!(harness.ignored("."), vec!["*.log"]);
        assert_eq!(out.status_detail().unwrap(), OutputStatus::Missing);
    }

    #[test]
    fn test_uncached_checkout_leaves_workspace_alone() {
        let harness = ProjectHarness::new();
        harness.write("metrics.json", "{\"auc\": 0.9}");

        let out = Output::builder(harness.ctx.clone(), "metrics.json")
            .cache(false)
            .info(Fingerprint::from_hash("0000", 1))
            .build()
            .unwrap();
        let before = files_under(harness.ctx.root());

        out.checkout(true).unwrap();
        assert_eq!(files_under(harness.ctx.root()), before);
        assert_eq!(
            fs::read_to_string(harness.path("metrics.json")).unwrap(),
            "{\"auc\": 0.9}"
        );
    }

    #[test]
    fn test_missing_artifact_is_changed() {
        let harness = ProjectHarness::new();
        for cache in [true, false] {
            let out = Output::builder(harness.ctx.clone(), "gone.csv")
                .cache(cache)
                .info(Fingerprint::from_hash("abc", 3))
                .build()
                .unwrap();
            assert!(out.changed().unwrap());
            assert_eq!(out.status().unwrap().get("gone.csv").map(String::as_str), Some("changed"));
        }
    }

    #[test]
    fn test_unconfigured_cache_fails_at_construction() {
        let harness = ProjectHarness::new();
        let err = Output::builder(harness.ctx.clone(), "s3://bucket/model.pkl")
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        // Dependencies are never cached, so the same url is fine
        let dep = Output::builder(harness.ctx.clone(), "s3://bucket/model.pkl")
            .role(Role::Dependency)
            .build()
            .unwrap();
        assert!(!dep.use_cache());
    }

    #[test]
    fn test_modified_output_checkout_requires_force() {
        let harness = ProjectHarness::new();
        harness.write("data/train.csv", "a,b\n1,2\n");
        let mut out = harness.output("data/train.csv");
        out.save().unwrap();

        harness.write("data/train.csv", "a,b\n3,4\n5,6\n");
        assert_eq!(out.status_detail().unwrap(), OutputStatus::Modified);

        let err = out.checkout(false).unwrap_err();
        assert!(matches!(err, OutputError::CheckoutConflict { .. }));
        out.checkout(true).unwrap();
        assert_eq!(
            fs::read_to_string(harness.path("data/train.csv")).unwrap(),
            "a,b\n1,2\n"
        );
    }

    #[test]
    fn test_stage_file_roundtrip() {
        let harness = ProjectHarness::new();
        harness.write("data/in.csv", "x\n");
        harness.write("data/out.csv", "y\n");

        let mut dep = Output::builder(harness.ctx.clone(), "data/in.csv")
            .role(Role::Dependency)
            .build()
            .unwrap();
        let mut out = harness.output("data/out.csv");
        dep.save().unwrap();
        out.save().unwrap();

        let text = serde_json::to_string(&serde_json::json!({
            "deps": [dep.dumpd()],
            "outs": [out.dumpd()],
        }))
        .unwrap();
        let stage: Map<String, Value> = serde_json::from_str(&text).unwrap();
        let entries = |key: &str| -> Vec<Map<String, Value>> {
            stage[key]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_object().cloned().unwrap())
                .collect()
        };

        let deps = OutputFactory::load(&harness.ctx, &entries("deps"), Role::Dependency).unwrap();
        let outs = OutputFactory::load(&harness.ctx, &entries("outs"), Role::Output).unwrap();
        assert_eq!(deps[0].info(), dep.info());
        assert_eq!(outs[0].info(), out.info());
        assert!(!deps[0].changed().unwrap());
        assert!(!outs[0].changed().unwrap());

        harness.write("data/in.csv", "zz\n");
        assert!(deps[0].changed().unwrap());
    }

    #[test]
    fn test_object_output_through_alias() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("bucket/project/model.pkl", b"weights").unwrap();
        let harness = ProjectHarness::with_s3(store.clone());

        let mut out = harness.output("remote://storage/model.pkl");
        assert_eq!(out.scheme(), Scheme::S3);
        out.verify().unwrap();
        out.save().unwrap();
        assert!(out.info().unwrap().get("etag").is_some());
        assert!(!out.changed().unwrap());

        store.put("bucket/project/model.pkl", b"other weights").unwrap();
        assert!(out.changed().unwrap());
        out.checkout(true).unwrap();
        assert_eq!(store.get("bucket/project/model.pkl").unwrap(), b"weights");
    }

    #[test]
    fn test_context_reopens_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ProjectContext::init(temp_dir.path()).unwrap();
        fs::write(ctx.root().join("a.txt"), "a").unwrap();

        let mut out = Output::builder(Arc::new(ctx), "a.txt").build().unwrap();
        out.save().unwrap();
        let persisted = out.dumpd();
        out.context().persist_state().unwrap();
        drop(out);

        let nested = temp_dir.path().join("sub");
        fs::create_dir(&nested).unwrap();
        let root = find_root(&nested).unwrap();
        let ctx = Arc::new(ProjectContext::open(&root).unwrap());
        let reloaded = Output::loadd(ctx, &persisted, Role::Output).unwrap();
        assert!(!reloaded.changed().unwrap());
    }
}
