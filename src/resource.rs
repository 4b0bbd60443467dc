//! Resource tree model
//!
//! The package analyzer produces a tree of [`ResourceNode`]s. The tree is
//! read-only during a deposit; the only thing a deposit produces is the
//! [`UriMap`] from package-local identifiers to repository URIs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;

use crate::error::DepositError;
use crate::graph::Graph;

/// The closed set of resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Container,
    RdfSource,
    NonRdfSource,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Container => "container",
            ResourceKind::RdfSource => "rdf-source",
            ResourceKind::NonRdfSource => "non-rdf-source",
        }
    }
}

/// Where the bytes of a binary come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinarySource {
    /// Bytes already in memory (e.g. extracted from an archive)
    Bytes(Vec<u8>),
    /// A file read lazily at deposit time
    File(PathBuf),
}

impl BinarySource {
    /// Open the byte stream
    pub fn open(&self) -> Result<Box<dyn Read + Send>, DepositError> {
        match self {
            BinarySource::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            BinarySource::File(path) => {
                let file = File::open(path).map_err(|e| DepositError::InvalidPackage(format!(
                    "cannot open binary {}: {}",
                    path.display(),
                    e
                )))?;
                Ok(Box::new(file))
            }
        }
    }

    /// Read the whole stream into memory
    pub fn read_all(&self) -> Result<Vec<u8>, DepositError> {
        match self {
            BinarySource::Bytes(bytes) => Ok(bytes.clone()),
            BinarySource::File(_) => {
                let mut buf = Vec::new();
                self.open()?.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

/// Opaque byte content with its media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub media_type: String,
    pub source: BinarySource,
}

/// Kind-specific payload of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Container {
        graph: Graph,
        children: Vec<ResourceNode>,
    },
    RdfSource {
        graph: Graph,
    },
    NonRdfSource {
        binary: Binary,
        /// Always an `RdfSource` without children or description
        description: Option<Box<ResourceNode>>,
    },
}

/// One resource of a package
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    /// Identifier of the resource inside the package
    pub local_id: String,
    pub content: NodeContent,
}

impl ResourceNode {
    pub fn container(
        local_id: impl Into<String>,
        graph: Graph,
        children: Vec<ResourceNode>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            content: NodeContent::Container { graph, children },
        }
    }

    pub fn rdf_source(local_id: impl Into<String>, graph: Graph) -> Self {
        Self {
            local_id: local_id.into(),
            content: NodeContent::RdfSource { graph },
        }
    }

    pub fn binary(
        local_id: impl Into<String>,
        media_type: impl Into<String>,
        source: BinarySource,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            content: NodeContent::NonRdfSource {
                binary: Binary {
                    media_type: media_type.into(),
                    source,
                },
                description: None,
            },
        }
    }

    /// Attach a description to a binary node
    ///
    /// Fails unless `self` is a binary and `description` is an `RdfSource`.
    pub fn with_description(mut self, description: ResourceNode) -> Result<Self, DepositError> {
        if description.kind() != ResourceKind::RdfSource {
            return Err(DepositError::InvalidPackage(format!(
                "description {} of {} must be an rdf-source, got {}",
                description.local_id,
                self.local_id,
                description.kind().as_str()
            )));
        }
        match &mut self.content {
            NodeContent::NonRdfSource { description: slot, .. } => {
                *slot = Some(Box::new(description));
                Ok(self)
            }
            _ => Err(DepositError::InvalidPackage(format!(
                "only non-rdf-source nodes carry a description, {} is a {}",
                self.local_id,
                self.kind().as_str()
            ))),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match &self.content {
            NodeContent::Container { .. } => ResourceKind::Container,
            NodeContent::RdfSource { .. } => ResourceKind::RdfSource,
            NodeContent::NonRdfSource { .. } => ResourceKind::NonRdfSource,
        }
    }

    /// The node's graph, if it is RDF-bearing
    pub fn graph(&self) -> Option<&Graph> {
        match &self.content {
            NodeContent::Container { graph, .. } | NodeContent::RdfSource { graph } => Some(graph),
            NodeContent::NonRdfSource { .. } => None,
        }
    }

    pub fn children(&self) -> &[ResourceNode] {
        match &self.content {
            NodeContent::Container { children, .. } => children,
            _ => &[],
        }
    }

    pub fn description(&self) -> Option<&ResourceNode> {
        match &self.content {
            NodeContent::NonRdfSource { description, .. } => description.as_deref(),
            _ => None,
        }
    }

    pub fn binary_content(&self) -> Option<&Binary> {
        match &self.content {
            NodeContent::NonRdfSource { binary, .. } => Some(binary),
            _ => None,
        }
    }

    pub fn is_rdf_bearing(&self) -> bool {
        self.kind() != ResourceKind::NonRdfSource
    }

    /// Number of nodes in this subtree, descriptions included
    pub fn count(&self) -> usize {
        1 + self.description().map_or(0, |_| 1)
            + self.children().iter().map(ResourceNode::count).sum::<usize>()
    }
}

/// Every local id of a tree in walk order, descriptions right after their binary
pub fn local_ids(tree: &[ResourceNode]) -> Vec<&str> {
    fn visit<'a>(node: &'a ResourceNode, out: &mut Vec<&'a str>) {
        out.push(&node.local_id);
        if let Some(desc) = node.description() {
            out.push(&desc.local_id);
        }
        for child in node.children() {
            visit(child, out);
        }
    }

    let mut out = Vec::new();
    for root in tree {
        visit(root, &mut out);
    }
    out
}

/// Outcome of depositing one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositedRecord {
    pub repository_uri: String,
    /// Present iff the deposited node had a description
    pub description_uri: Option<String>,
}

impl DepositedRecord {
    pub fn new(repository_uri: impl Into<String>) -> Self {
        Self {
            repository_uri: repository_uri.into(),
            description_uri: None,
        }
    }

    pub fn with_description(mut self, description_uri: impl Into<String>) -> Self {
        self.description_uri = Some(description_uri.into());
        self
    }
}

/// Mapping from package-local identifier to repository URI
///
/// Write-once per key: every local id is deposited exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriMap {
    entries: HashMap<String, String>,
}

impl UriMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping, refusing to overwrite an existing key
    pub fn record(
        &mut self,
        local_id: impl Into<String>,
        repository_uri: impl Into<String>,
    ) -> Result<(), DepositError> {
        let local_id = local_id.into();
        if self.entries.contains_key(&local_id) {
            return Err(DepositError::InvalidPackage(format!(
                "local id {} appears more than once in the package",
                local_id
            )));
        }
        self.entries.insert(local_id, repository_uri.into());
        Ok(())
    }

    pub fn get(&self, local_id: &str) -> Option<&str> {
        self.entries.get(local_id).map(String::as_str)
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.entries.contains_key(local_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Vec<ResourceNode> {
        let binary = ResourceNode::binary(
            "urn:pkg:c",
            "image/png",
            BinarySource::Bytes(vec![1, 2, 3]),
        )
        .with_description(ResourceNode::rdf_source("urn:pkg:d", Graph::new()))
        .unwrap();

        vec![
            ResourceNode::container(
                "urn:pkg:a",
                Graph::new(),
                vec![ResourceNode::rdf_source("urn:pkg:b", Graph::new())],
            ),
            binary,
        ]
    }

    #[test]
    fn test_local_ids_walk_order() {
        let tree = sample_tree();
        assert_eq!(
            local_ids(&tree),
            vec!["urn:pkg:a", "urn:pkg:b", "urn:pkg:c", "urn:pkg:d"]
        );
        assert_eq!(tree.iter().map(ResourceNode::count).sum::<usize>(), 4);
    }

    #[test]
    fn test_with_description_requires_rdf_source() {
        let binary = ResourceNode::binary("urn:pkg:c", "text/plain", BinarySource::Bytes(vec![]));
        let not_rdf = ResourceNode::container("urn:pkg:d", Graph::new(), vec![]);
        assert!(matches!(
            binary.with_description(not_rdf),
            Err(DepositError::InvalidPackage(_))
        ));

        let container = ResourceNode::container("urn:pkg:a", Graph::new(), vec![]);
        let desc = ResourceNode::rdf_source("urn:pkg:d", Graph::new());
        assert!(container.with_description(desc).is_err());
    }

    #[test]
    fn test_kind_accessors() {
        let tree = sample_tree();
        assert_eq!(tree[0].kind(), ResourceKind::Container);
        assert!(tree[0].is_rdf_bearing());
        assert_eq!(tree[0].children().len(), 1);
        assert_eq!(tree[1].kind(), ResourceKind::NonRdfSource);
        assert!(!tree[1].is_rdf_bearing());
        assert!(tree[1].graph().is_none());
        assert_eq!(tree[1].description().unwrap().local_id, "urn:pkg:d");
        assert_eq!(tree[1].binary_content().unwrap().media_type, "image/png");
    }

    #[test]
    fn test_uri_map_is_write_once() {
        let mut map = UriMap::new();
        map.record("urn:pkg:a", "http://repo/1").unwrap();
        assert!(map.record("urn:pkg:a", "http://repo/2").is_err());
        assert_eq!(map.get("urn:pkg:a"), Some("http://repo/1"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_binary_source_read_all() {
        let source = BinarySource::Bytes(b"hello".to_vec());
        assert_eq!(source.read_all().unwrap(), b"hello");

        let missing = BinarySource::File(PathBuf::from("/definitely/not/here.bin"));
        assert!(missing.read_all().is_err());
    }
}
