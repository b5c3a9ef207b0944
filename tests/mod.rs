//! Main test module for outtrack
//!
//! This module includes all test suites:
//! - Integration tests for whole output lifecycles
//! - Chaos tests for failed moves and damaged on-disk state
//! - Property-based tests for the persisted form

pub mod chaos;
pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::outtrack::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn project() -> (TempDir, Arc<ProjectContext>) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = Arc::new(
            ProjectContext::builder(temp_dir.path())
                .scm(Arc::new(NoScm))
                .build()
                .unwrap(),
        );
        (temp_dir, ctx)
    }

    #[test]
    fn test_empty_file() {
        let (_temp_dir, ctx) = project();
        fs::write(ctx.root().join("empty.txt"), b"").unwrap();

        let mut out = Output::builder(ctx.clone(), "empty.txt").build().unwrap();
        out.save().unwrap();
        assert_eq!(out.info().unwrap().size(), Some(0));

        fs::remove_file(ctx.root().join("empty.txt")).unwrap();
        out.checkout(false).unwrap();
        assert_eq!(fs::read(ctx.root().join("empty.txt")).unwrap(), b"");
    }

    #[test]
    fn test_empty_directory() {
        let (_temp_dir, ctx) = project();
        fs::create_dir(ctx.root().join("features")).unwrap();

        let mut out = Output::builder(ctx.clone(), "features").build().unwrap();
        out.save().unwrap();
        assert!(out.info().unwrap().is_dir());
        assert!(!out.changed().unwrap());
    }

    #[test]
    fn test_unicode_filenames() {
        let (_temp_dir, ctx) = project();
        let names = ["файл.csv", "文件.csv", "🚀.csv"];

        let mut created = Vec::new();
        for name in &names {
            if fs::write(ctx.root().join(name), format!("content of {}", name)).is_ok() {
                created.push(*name);
            }
        }

        for name in created {
            let mut out = Output::builder(ctx.clone(), name).build().unwrap();
            out.save().unwrap();
            fs::remove_file(ctx.root().join(name)).unwrap();
            out.checkout(false).unwrap();
            assert_eq!(
                fs::read_to_string(ctx.root().join(name)).unwrap(),
                format!("content of {}", name)
            );
        }
    }

    #[test]
    fn test_nested_directory_checkout() {
        let (_temp_dir, ctx) = project();
        let dir = ctx.root().join("images");
        fs::create_dir_all(dir.join("train/cats")).unwrap();
        fs::create_dir_all(dir.join("test")).unwrap();
        fs::write(dir.join("train/cats/1.png"), b"cat").unwrap();
        fs::write(dir.join("test/2.png"), b"dog").unwrap();

        let mut out = Output::builder(ctx.clone(), "images").build().unwrap();
        out.save().unwrap();
        assert_eq!(out.info().unwrap().size(), Some(6));

        fs::remove_dir_all(&dir).unwrap();
        out.checkout(false).unwrap();
        assert_eq!(fs::read(dir.join("train/cats/1.png")).unwrap(), b"cat");
        assert_eq!(fs::read(dir.join("test/2.png")).unwrap(), b"dog");
        assert!(!out.changed().unwrap());
    }

    #[test]
    fn test_url_outside_project() {
        let (_temp_dir, ctx) = project();
        let outside = TempDir::new().unwrap();
        let path = outside.path().join("shared.csv");
        fs::write(&path, b"x").unwrap();

        let out = Output::builder(ctx, path.to_string_lossy())
            .cache(false)
            .build()
            .unwrap();
        assert!(!out.is_local());
        assert!(out.exists().unwrap());
    }
}
