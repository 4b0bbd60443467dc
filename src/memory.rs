//! In-memory repository
//!
//! Behaves like a small LDP server: it mints identifiers below the parent
//! container, resolves self references in uploaded graphs against the new
//! resource, keeps a version counter per resource as concurrency token, and
//! stages every write of a session until commit. Used for dry runs and tests.
//!
//! Containment is staged as `(parent, child)` additions and merged into the
//! parent at commit, so sessions depositing under the same container do not
//! overwrite each other. Patches to resources that existed before the session
//! are checked against the committed version when the session commits.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

use crate::diff::GraphDiff;
use crate::error::DepositError;
use crate::graph::{Graph, Term, Triple};
use crate::remap::{remap, resolve_relative, skolemize};
use crate::resource::{DepositedRecord, ResourceKind, ResourceNode, UriMap};
use crate::session::{ConcurrencyToken, DepositSession, SessionFactory, SessionState};
use crate::vocab::LDP_CONTAINS;

/// Path segment of a binary's description, below the binary's URI
pub const DESCRIPTION_SEGMENT: &str = "fcr:metadata";

#[derive(Debug, Clone, PartialEq)]
struct StoredResource {
    kind: ResourceKind,
    graph: Graph,
    binary: Option<(String, Vec<u8>)>,
    version: u64,
}

impl StoredResource {
    fn rdf(kind: ResourceKind, graph: Graph) -> Self {
        Self {
            kind,
            graph,
            binary: None,
            version: 1,
        }
    }
}

/// Shared, thread-safe repository state
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    resources: Arc<Mutex<BTreeMap<String, StoredResource>>>,
}

impl MemoryRepository {
    /// Repository with a single empty root container
    pub fn new(root_uri: impl Into<String>) -> Self {
        let mut resources = BTreeMap::new();
        resources.insert(
            root_uri.into(),
            StoredResource::rdf(ResourceKind::Container, Graph::new()),
        );
        Self {
            resources: Arc::new(Mutex::new(resources)),
        }
    }

    /// Start a session against this repository
    pub fn session(&self) -> MemorySession {
        MemorySession {
            repository: self.clone(),
            state: SessionState::Idle,
            staged: BTreeMap::new(),
            contained: Vec::new(),
            base_versions: BTreeMap::new(),
            requests: 0,
        }
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.resources.lock().contains_key(uri)
    }

    /// Number of committed resources, root included
    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    pub fn kind(&self, uri: &str) -> Option<ResourceKind> {
        self.resources.lock().get(uri).map(|r| r.kind)
    }

    /// Committed graph of an RDF resource
    pub fn graph(&self, uri: &str) -> Option<Graph> {
        self.resources
            .lock()
            .get(uri)
            .filter(|r| r.kind != ResourceKind::NonRdfSource)
            .map(|r| r.graph.clone())
    }

    /// Committed bytes and media type of a binary
    pub fn binary(&self, uri: &str) -> Option<(String, Vec<u8>)> {
        self.resources
            .lock()
            .get(uri)
            .and_then(|r| r.binary.clone())
    }

    /// Committed URIs, sorted
    pub fn uris(&self) -> Vec<String> {
        self.resources.lock().keys().cloned().collect()
    }
}

impl SessionFactory for MemoryRepository {
    type Session = MemorySession;

    fn open(&self) -> Result<MemorySession, DepositError> {
        Ok(self.session())
    }
}

/// One transaction against a [`MemoryRepository`]
pub struct MemorySession {
    repository: MemoryRepository,
    state: SessionState,
    staged: BTreeMap<String, StoredResource>,
    /// (parent, child) containment additions
    contained: Vec<(String, String)>,
    /// Committed version of each pre-existing resource this session patched
    base_versions: BTreeMap<String, u64>,
    requests: usize,
}

impl MemorySession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of simulated repository requests issued so far
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Staged view first, then committed state, plus this session's
    /// containment additions
    fn lookup(&self, uri: &str) -> Option<StoredResource> {
        let mut resource = self
            .staged
            .get(uri)
            .cloned()
            .or_else(|| self.repository.resources.lock().get(uri).cloned())?;
        for (parent, child) in &self.contained {
            if parent == uri {
                resource.graph.insert(contains_triple(parent, child));
            }
        }
        Some(resource)
    }

    fn mint(&self, parent_uri: &str) -> String {
        format!(
            "{}/{}",
            parent_uri.trim_end_matches('/'),
            Ulid::new().to_string().to_lowercase()
        )
    }

    /// Prepare an uploaded graph the way a server stores it
    fn ingest_graph(graph: &Graph, local_id: &str, uri: &str) -> Result<Graph, DepositError> {
        let mut self_ref = UriMap::new();
        self_ref.record(local_id, uri)?;
        Ok(resolve_relative(&remap(&skolemize(graph), &self_ref), uri))
    }
}

impl DepositSession for MemorySession {
    fn deposit(
        &mut self,
        node: &ResourceNode,
        parent_uri: &str,
    ) -> Result<DepositedRecord, DepositError> {
        self.state.enter_operation("deposit")?;
        self.requests += 1;

        match self.lookup(parent_uri) {
            Some(p) if p.kind == ResourceKind::Container => {}
            Some(_) => {
                return Err(DepositError::failure(
                    parent_uri,
                    "parent is not a container",
                ))
            }
            None => return Err(DepositError::failure(parent_uri, "parent not found")),
        };

        let uri = self.mint(parent_uri);
        let mut record = DepositedRecord::new(uri.clone());

        match node.kind() {
            ResourceKind::Container | ResourceKind::RdfSource => {
                let graph = node.graph().cloned().unwrap_or_default();
                let stored = Self::ingest_graph(&graph, &node.local_id, &uri)?;
                self.staged
                    .insert(uri.clone(), StoredResource::rdf(node.kind(), stored));
            }
            ResourceKind::NonRdfSource => {
                let binary = node.binary_content().ok_or_else(|| {
                    DepositError::InvalidPackage(format!("{} has no content", node.local_id))
                })?;
                let bytes = binary.source.read_all()?;
                self.staged.insert(
                    uri.clone(),
                    StoredResource {
                        kind: ResourceKind::NonRdfSource,
                        graph: Graph::new(),
                        binary: Some((binary.media_type.clone(), bytes)),
                        version: 1,
                    },
                );

                if let Some(description) = node.description() {
                    let desc_uri = format!("{}/{}", uri, DESCRIPTION_SEGMENT);
                    let graph = description.graph().cloned().unwrap_or_default();
                    let stored = Self::ingest_graph(&graph, &description.local_id, &desc_uri)?;
                    self.staged.insert(
                        desc_uri.clone(),
                        StoredResource::rdf(ResourceKind::RdfSource, stored),
                    );
                    record = record.with_description(desc_uri);
                }
            }
        }

        self.contained.push((parent_uri.to_string(), uri.clone()));

        debug!(local_id = %node.local_id, uri = %uri, "Staged resource");
        Ok(record)
    }

    fn fetch_graph(&mut self, uri: &str) -> Result<(Graph, ConcurrencyToken), DepositError> {
        self.state.enter_operation("fetch graph")?;
        self.requests += 1;

        match self.lookup(uri) {
            Some(r) if r.kind == ResourceKind::NonRdfSource => {
                Err(DepositError::failure(uri, "resource is not an RDF source"))
            }
            Some(r) => Ok((r.graph, ConcurrencyToken::new(r.version.to_string()))),
            None => Err(DepositError::failure(uri, "resource not found")),
        }
    }

    fn apply_patch(
        &mut self,
        uri: &str,
        patch: &GraphDiff,
        token: &ConcurrencyToken,
    ) -> Result<(), DepositError> {
        self.state.enter_operation("apply patch")?;
        if patch.is_empty() {
            return Ok(());
        }
        self.requests += 1;

        let mut resource = self
            .lookup(uri)
            .ok_or_else(|| DepositError::failure(uri, "resource not found"))?;
        if resource.version.to_string() != token.as_str() {
            return Err(DepositError::ConcurrentModification {
                uri: uri.to_string(),
            });
        }
        if !self.staged.contains_key(uri) {
            self.base_versions.insert(uri.to_string(), resource.version);
        }
        patch.apply_to(&mut resource.graph);
        resource.version += 1;
        self.staged.insert(uri.to_string(), resource);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DepositError> {
        self.state.check_finish("commit")?;
        let mut resources = self.repository.resources.lock();
        for (uri, base) in &self.base_versions {
            if resources.get(uri).map(|r| r.version) != Some(*base) {
                return Err(DepositError::ConcurrentModification { uri: uri.clone() });
            }
        }

        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        resources.extend(staged);
        for (parent_uri, child) in self.contained.drain(..) {
            if let Some(parent) = resources.get_mut(&parent_uri) {
                if parent.graph.insert(contains_triple(&parent_uri, &child)) {
                    parent.version += 1;
                }
            }
        }
        drop(resources);
        self.base_versions.clear();
        self.state.finish(true);
        debug!(resources = count, "Committed memory session");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DepositError> {
        self.state.check_finish("rollback")?;
        let discarded = self.staged.len();
        self.staged.clear();
        self.contained.clear();
        self.base_versions.clear();
        self.state.finish(false);
        debug!(resources = discarded, "Rolled back memory session");
        Ok(())
    }
}

fn contains_triple(parent: &str, child: &str) -> Triple {
    Triple::new(Term::iri(parent), LDP_CONTAINS, Term::iri(child))
}
