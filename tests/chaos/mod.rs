//! Chaos testing for outtrack
//!
//! Damages the workspace, the cache and the hash state behind an output's
//! back and checks that failures surface as the right error kind and never
//! leave an output half-updated.

use ::outtrack::*;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Project with git ignore files, a local cache and persisted hash state
pub struct ChaosProject {
    pub temp_dir: TempDir,
    pub ctx: Arc<ProjectContext>,
}

impl ChaosProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        ProjectConfig::default().save(temp_dir.path()).unwrap();
        let ctx = Self::open(temp_dir.path());
        Self { temp_dir, ctx }
    }

    pub fn open(root: &Path) -> Arc<ProjectContext> {
        Arc::new(
            ProjectContext::builder(root)
                .config(ProjectConfig::load(root).unwrap())
                .scm(Arc::new(Git::new(root)))
                .persistent_state()
                .build()
                .unwrap(),
        )
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.ctx.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Every stored object file in the local cache
    pub fn cache_objects(&self) -> Vec<PathBuf> {
        let objects = self.ctx.project_dir().join("cache").join("objects");
        walkdir::WalkDir::new(objects)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_path_buf())
            .collect()
    }
}

impl Default for ChaosProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Shift a file's mtime without touching its content
pub fn shift_mtime(path: &Path, seconds: i64) {
    let metadata = fs::metadata(path).unwrap();
    let mtime = FileTime::from_last_modification_time(&metadata);
    let shifted = FileTime::from_unix_time(mtime.unix_seconds() + seconds, mtime.nanoseconds());
    filetime::set_file_mtime(path, shifted).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_move_keeps_identity() {
        let project = ChaosProject::new();
        let source = project.write("data/train.csv", b"a,b\n1,2\n");

        let mut out = Output::builder(project.ctx.clone(), "data/train.csv").build().unwrap();
        out.save().unwrap();
        project.ctx.scm().ignore(&source).unwrap();
        let identity = out.identity().clone();
        let info = out.info().cloned();

        // Artifact vanishes before the move
        fs::remove_file(&source).unwrap();
        let target = Output::builder(project.ctx.clone(), "data2/train.csv").build().unwrap();
        assert!(out.move_to(&target).is_err());

        assert_eq!(out.identity(), &identity);
        assert_eq!(out.info().cloned(), info);
        assert_eq!(
            fs::read_to_string(project.ctx.root().join("data/.gitignore")).unwrap(),
            "/train.csv\n"
        );
        assert!(!project.ctx.root().join("data2/.gitignore").exists());

        // The output is still usable at its old location
        out.checkout(false).unwrap();
        assert_eq!(fs::read(&source).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_move_into_own_subdirectory_leaves_workspace_intact() {
        let project = ChaosProject::new();
        project.write("d/a.txt", b"a");

        let mut out = Output::builder(project.ctx.clone(), "d").build().unwrap();
        out.save().unwrap();
        let identity = out.identity().clone();

        let target = Output::builder(project.ctx.clone(), "d/sub").build().unwrap();
        let err = out.move_to(&target).unwrap_err();
        assert!(matches!(err, OutputError::MoveIntoItself { .. }));
        assert!(err.is_user_error());

        assert_eq!(out.identity(), &identity);
        let entries: Vec<PathBuf> = walkdir::WalkDir::new(project.ctx.root().join("d"))
            .min_depth(1)
            .into_iter()
            .map(|entry| entry.unwrap().path().to_path_buf())
            .collect();
        assert_eq!(entries, vec![project.ctx.root().join("d/a.txt")]);
        assert!(!out.changed().unwrap());
    }

    #[test]
    fn test_move_onto_itself_keeps_artifact() {
        let project = ChaosProject::new();
        let path = project.write("model.pkl", b"weights");

        let mut out = Output::builder(project.ctx.clone(), "model.pkl").build().unwrap();
        out.save().unwrap();
        let target = Output::builder(project.ctx.clone(), "model.pkl").build().unwrap();
        out.move_to(&target).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"weights");
        assert!(!out.changed().unwrap());
    }

    #[test]
    fn test_corrupt_cache_object_is_detected() {
        let project = ChaosProject::new();
        let path = project.write("model.pkl", b"weights weights weights");

        let mut out = Output::builder(project.ctx.clone(), "model.pkl").build().unwrap();
        out.save().unwrap();
        let objects = project.cache_objects();
        assert_eq!(objects.len(), 1);
        fs::write(&objects[0], b"garbage that is not an object").unwrap();

        fs::remove_file(&path).unwrap();
        let err = out.checkout(false).unwrap_err();
        assert!(err.is_corruption(), "unexpected error: {}", err);
        assert!(!path.exists());
    }

    #[test]
    fn test_truncated_cache_object_is_detected() {
        let project = ChaosProject::new();
        let path = project.write("data/a.csv", b"1,2,3\n");

        let mut out = Output::builder(project.ctx.clone(), "data/a.csv").build().unwrap();
        out.save().unwrap();
        for object in project.cache_objects() {
            fs::write(&object, b"xy").unwrap();
        }

        fs::remove_file(&path).unwrap();
        assert!(out.checkout(false).unwrap_err().is_corruption());
    }

    #[test]
    fn test_missing_cache_object() {
        let project = ChaosProject::new();
        let path = project.write("model.pkl", b"weights");

        let mut out = Output::builder(project.ctx.clone(), "model.pkl").build().unwrap();
        out.save().unwrap();
        for object in project.cache_objects() {
            fs::remove_file(object).unwrap();
        }

        // The workspace copy still matches, but the cache cannot restore it
        assert!(out.changed().unwrap());
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            out.checkout(false).unwrap_err(),
            OutputError::ObjectNotFound(_)
        ));
    }

    #[test]
    fn test_corrupt_state_index_is_discarded() {
        let project = ChaosProject::new();
        project.write("data/train.csv", b"a,b\n1,2\n");

        let mut out = Output::builder(project.ctx.clone(), "data/train.csv").build().unwrap();
        out.save().unwrap();
        project.ctx.persist_state().unwrap();
        let state_file = project.ctx.project_dir().join("state.bin");
        assert!(state_file.exists());
        let persisted = out.dumpd();

        fs::write(&state_file, b"\xff\xff\xff not bincode").unwrap();
        let ctx = ChaosProject::open(project.ctx.root());
        assert!(ctx.hasher().state().is_empty());

        let reloaded = Output::loadd(ctx, &persisted, Role::Output).unwrap();
        assert!(!reloaded.changed().unwrap());
    }

    #[test]
    fn test_same_size_rewrite_with_new_mtime_is_changed() {
        let project = ChaosProject::new();
        let path = project.write("data/train.csv", b"a,b\n1,2\n");

        let mut out = Output::builder(project.ctx.clone(), "data/train.csv").build().unwrap();
        out.save().unwrap();
        assert!(!out.changed().unwrap());

        let metadata = fs::metadata(&path).unwrap();
        let mtime = FileTime::from_last_modification_time(&metadata);
        fs::write(&path, b"a,b\n3,4\n").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime.unix_seconds() + 10, 0)).unwrap();

        assert!(out.changed().unwrap());
        out.checkout(true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_touched_file_is_not_changed() {
        let project = ChaosProject::new();
        let path = project.write("data/train.csv", b"a,b\n1,2\n");

        let mut out = Output::builder(project.ctx.clone(), "data/train.csv").build().unwrap();
        out.save().unwrap();
        shift_mtime(&path, 3600);

        assert!(!out.changed().unwrap());
        assert_eq!(out.status_detail().unwrap(), OutputStatus::Unchanged);
    }

    #[test]
    fn test_remote_without_transport() {
        let project = ChaosProject::new();
        let out = Output::builder(project.ctx.clone(), "s3://bucket/model.pkl")
            .cache(false)
            .build()
            .unwrap();

        let err = out.exists().unwrap_err();
        assert!(matches!(err, OutputError::RemoteNotConfigured { .. }));
        assert!(err.is_configuration());
        assert!(out.changed().is_err());
    }

    #[test]
    fn test_verify_rejects_missing_and_special_files() {
        let project = ChaosProject::new();
        let out = Output::builder(project.ctx.clone(), "nothing.csv").build().unwrap();
        assert!(matches!(out.verify().unwrap_err(), OutputError::DoesNotExist(_)));

        #[cfg(unix)]
        {
            let fifo = project.ctx.root().join("pipe");
            let created = std::process::Command::new("mkfifo").arg(&fifo).status();
            if created.map(|s| s.success()).unwrap_or(false) {
                let out = Output::builder(project.ctx.clone(), "pipe").build().unwrap();
                assert!(matches!(out.verify().unwrap_err(), OutputError::IsNotFileOrDir(_)));
            }
        }
    }
}
