//! LDP Package Deposit Library
//!
//! This library deposits packages of linked resources into a Linked Data
//! Platform repository as one atomic unit, and rewrites the package-local
//! links between them to the URIs the repository assigned.
//!
//! # Overview
//!
//! A package is a tree of resources: containers, RDF sources, and binaries
//! with an optional RDF description. Resources refer to each other by
//! package-local ids. A deposit:
//!
//! 1. Opens a session (a repository transaction) through a [`SessionFactory`]
//! 2. Walks the tree top-down, creating each resource under its parent and
//!    recording `local id -> repository URI`
//! 3. Fetches every RDF-bearing resource again, replaces package-local ids
//!    with repository URIs, and writes back the minimal patch
//! 4. Commits, or rolls back the entire package on the first failure
//!
//! Progress is reported as [`DepositEvent`]s to a [`Notifier`].
//!
//! # Usage
//!
//! ```ignore
//! use ldp_deposit::{load_package, DepositManager, LdpSessionFactory, TracingNotifier};
//!
//! let tree = load_package(Path::new("thesis.zip"))?;
//! let factory = LdpSessionFactory::new(config.repository.clone())?;
//! let report = DepositManager::new(factory).deposit_package(
//!     &tree,
//!     config.target_container(),
//!     &TracingNotifier,
//! )?;
//! println!("{}", report.summary());
//! ```
//!
//! [`MemoryRepository`] implements the same session contract in memory and
//! backs the `plan` command and the tests.

pub mod config;
pub mod diff;
pub mod error;
pub mod graph;
pub mod ldp;
pub mod logging;
pub mod manager;
pub mod memory;
pub mod notify;
pub mod package;
pub mod remap;
pub mod resource;
pub mod session;
pub mod vocab;
pub mod walker;

// Re-export main types for convenience
pub use crate::config::{DepositConfig, LogFormat, LoggingConfig, PatchMode, RepositoryConfig};
pub use crate::diff::{diff, GraphDiff};
pub use crate::error::DepositError;
pub use crate::graph::{from_jsonld, Graph, Term, Triple};
pub use crate::ldp::{LdpSession, LdpSessionFactory};
pub use crate::logging::init_logging;
pub use crate::manager::{deposit_with_session, DepositManager, DepositReport};
pub use crate::memory::{MemoryRepository, MemorySession};
pub use crate::notify::{
    DepositEvent, EventKind, EventRecord, FanoutNotifier, JsonLinesNotifier, NoOpNotifier,
    Notifier, RecordingNotifier, TracingNotifier,
};
pub use crate::package::{load_package, tree_from_manifest_str};
pub use crate::remap::{remap, skolemize};
pub use crate::resource::{
    Binary, BinarySource, DepositedRecord, ResourceKind, ResourceNode, UriMap,
};
pub use crate::session::{ConcurrencyToken, DepositSession, SessionFactory, SessionState};
pub use crate::walker::{walk, WalkOutcome};
