//! # outtrack - Output tracking for data pipelines
//!
//! The output/cache layer of a data-versioning tool: it decides whether a
//! tracked artifact changed since it was last recorded, stores artifact
//! content in a content-addressable cache, restores cached content into the
//! workspace, and delegates byte transfer to a backend chosen by URL scheme.
//!
//! ## Overview
//!
//! The core type is [`Output`]. An output binds a declared location (a local
//! path such as `data/train.csv`, or a URL such as `s3://bucket/model.pkl`)
//! to:
//!
//! - a [`Backend`] for its scheme, which fingerprints, moves and removes the
//!   artifact
//! - optionally, the [`Cache`] registered for its scheme in the
//!   [`ProjectContext`], which stores and restores the artifact's content
//!
//! Outputs persist as flat mappings (see [`Output::dumpd`] and
//! [`Output::loadd`]) that a pipeline engine embeds in its stage files.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outtrack::{Output, ProjectContext};
//! use std::sync::Arc;
//!
//! # fn main() -> outtrack::Result<()> {
//! let ctx = Arc::new(ProjectContext::init("./my_project")?);
//!
//! // Track an artifact produced by a stage
//! let mut out = Output::builder(ctx.clone(), "data/train.csv").build()?;
//! out.verify()?;
//! out.save()?;
//!
//! // Later: restore it if the workspace copy went missing
//! if out.changed()? {
//!     out.checkout(false)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Fingerprints
//!
//! A [`Fingerprint`] is the opaque field map a backend or cache produces for an
//! artifact's content: `sha256` + `size` for local artifacts, `etag` + `size`
//! for object stores. Directories hash to a manifest hash with a `.dir`
//! suffix.
//!
//! ### Cache-backed outputs
//!
//! With caching enabled (the default), `save` stores the content in the cache
//! and `checkout` restores it. Local caches deduplicate by content hash and
//! compress objects with LZ4. Cache-backed local outputs are also kept out of
//! version control through the project's [`Scm`] handle.
//!
//! ### Dependencies
//!
//! An output constructed with [`Role::Dependency`] is never cached and never
//! a metric; it only records a fingerprint so a stage can tell when its
//! inputs changed.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with [`OutputError`]. Construction
//! fails with [`OutputError::Configuration`] when caching is requested for a
//! scheme without a cache; tracking checks raise
//! [`OutputError::DoesNotExist`], [`OutputError::IsNotFileOrDir`] and
//! [`OutputError::AlreadyTracked`].
//!
//! ## Module Organization
//!
//! - [`output`]: the `Output` type, its persisted form and the factory
//! - [`remote`]: backends per scheme
//! - [`cache`]: cache trait, registry, local and object-store caches
//! - [`context`]: project context and root discovery
//! - [`config`]: project configuration file
//! - [`path_info`]: URL resolution and remote aliases
//! - [`scm`]: ignore-file maintenance
//! - [`error`]: error types

pub mod cache;
pub mod compression;
pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod manifest;
pub mod metric;
pub mod output;
pub mod path_info;
pub mod remote;
pub mod scm;
pub mod state;
pub mod utils;

pub use cache::{Cache, CacheRegistry, LocalCache, ObjectCache};
pub use compression::{CompressionEngine, CompressionStrategy};
pub use config::ProjectConfig;
pub use context::{find_root, ProjectContext, ProjectContextBuilder};
pub use error::{OutputError, Result};
pub use fingerprint::Fingerprint;
pub use metric::Metric;
pub use output::{Identity, Output, OutputBuilder, OutputFactory, OutputOptions, OutputStatus, Role};
pub use path_info::{PathInfo, Scheme};
pub use remote::{Backend, MemoryObjectStore, ObjectStore, Remote};
pub use scm::{Git, NoScm, Scm};
