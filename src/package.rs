//! Package loading
//!
//! A package is a directory or zip archive holding a `manifest.json` that
//! describes the resource tree, plus the JSON-LD graph files and binaries it
//! references by relative path. Only structure is checked here; content is
//! taken as-is.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

use crate::error::DepositError;
use crate::graph::{from_jsonld, Graph};
use crate::resource::{BinarySource, ResourceKind, ResourceNode};
use crate::vocab::{MANIFEST_FILENAME, OCTET_STREAM};

/// Top level of `manifest.json`
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub resources: Vec<ManifestNode>,
}

/// Graph content: a path to a JSON-LD file or the JSON-LD itself
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GraphSource {
    File(String),
    Inline(Value),
}

#[derive(Debug, Deserialize)]
pub struct ManifestNode {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub graph: Option<GraphSource>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub description: Option<Box<ManifestNode>>,
    #[serde(default)]
    pub children: Vec<ManifestNode>,
}

/// Access to files referenced from the manifest
trait PackageFiles {
    fn read(&mut self, relative: &str) -> Result<Vec<u8>, DepositError>;
    fn binary_source(&mut self, relative: &str) -> Result<BinarySource, DepositError>;
}

/// Manifests parsed from a string carry their graphs inline and have no files
struct NoFiles;

impl PackageFiles for NoFiles {
    fn read(&mut self, relative: &str) -> Result<Vec<u8>, DepositError> {
        Err(DepositError::InvalidPackage(format!(
            "{} is not available without a package root",
            relative
        )))
    }

    fn binary_source(&mut self, relative: &str) -> Result<BinarySource, DepositError> {
        self.read(relative).map(BinarySource::Bytes)
    }
}

/// Where package files are read from
enum PackageReader {
    Directory(PathBuf),
    Zip {
        path: PathBuf,
        archive: ZipArchive<File>,
        /// Top-level directory the archive was created from, if any
        root_prefix: String,
    },
}

impl PackageReader {
    fn open(path: &Path) -> Result<Self, DepositError> {
        if path.is_dir() {
            return Ok(PackageReader::Directory(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(DepositError::InvalidPath(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| {
            DepositError::InvalidPackage(format!(
                "failed to read zip archive {}: {}",
                path.display(),
                e
            ))
        })?;
        let root_prefix = find_manifest_prefix(&mut archive)?;
        Ok(PackageReader::Zip {
            path: path.to_path_buf(),
            archive,
            root_prefix,
        })
    }
}

impl PackageFiles for PackageReader {
    fn read(&mut self, relative: &str) -> Result<Vec<u8>, DepositError> {
        check_relative(relative)?;
        match self {
            PackageReader::Directory(root) => {
                let full = root.join(relative);
                std::fs::read(&full).map_err(|e| {
                    DepositError::InvalidPackage(format!("cannot read {}: {}", full.display(), e))
                })
            }
            PackageReader::Zip {
                path,
                archive,
                root_prefix,
            } => {
                let entry_name = if root_prefix.is_empty() {
                    relative.to_string()
                } else {
                    format!("{}/{}", root_prefix, relative)
                };
                let mut entry = archive.by_name(&entry_name).map_err(|e| {
                    DepositError::InvalidPackage(format!(
                        "failed to extract {} from {}: {}",
                        entry_name,
                        path.display(),
                        e
                    ))
                })?;
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Directory binaries are streamed at deposit time, archive entries are extracted now
    fn binary_source(&mut self, relative: &str) -> Result<BinarySource, DepositError> {
        check_relative(relative)?;
        match self {
            PackageReader::Directory(root) => {
                let full = root.join(relative);
                if !full.is_file() {
                    return Err(DepositError::InvalidPackage(format!(
                        "binary {} does not exist",
                        full.display()
                    )));
                }
                Ok(BinarySource::File(full))
            }
            PackageReader::Zip { .. } => Ok(BinarySource::Bytes(self.read(relative)?)),
        }
    }
}

/// Manifest at the archive root, or in the single top-level directory
fn find_manifest_prefix(archive: &mut ZipArchive<File>) -> Result<String, DepositError> {
    let entries: Vec<String> = archive.file_names().map(String::from).collect();

    if entries.iter().any(|e| e == MANIFEST_FILENAME) {
        return Ok(String::new());
    }

    let top_level: HashSet<&str> = entries
        .iter()
        .filter_map(|e| e.split('/').next())
        .filter(|s| !s.is_empty())
        .collect();
    if top_level.len() == 1 {
        if let Some(prefix) = top_level.into_iter().next() {
            let expected = format!("{}/{}", prefix, MANIFEST_FILENAME);
            if entries.iter().any(|e| *e == expected) {
                return Ok(prefix.to_string());
            }
        }
    }

    Err(DepositError::InvalidPackage(format!(
        "no {} found at archive root",
        MANIFEST_FILENAME
    )))
}

/// Reject absolute paths and parent traversal
fn check_relative(relative: &str) -> Result<(), DepositError> {
    let path = Path::new(relative);
    let ok = !relative.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(DepositError::InvalidPackage(format!(
            "package path '{}' must be relative and stay inside the package",
            relative
        )))
    }
}

/// Load the resource tree of a package directory or zip archive
pub fn load_package(path: &Path) -> Result<Vec<ResourceNode>, DepositError> {
    let mut reader = PackageReader::open(path)?;
    let manifest_bytes = reader.read(MANIFEST_FILENAME)?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;
    build_tree(manifest, &mut reader)
}

/// Parse a manifest whose graphs are all inline
pub fn tree_from_manifest_str(manifest: &str) -> Result<Vec<ResourceNode>, DepositError> {
    let manifest: Manifest = serde_json::from_str(manifest)?;
    build_tree(manifest, &mut NoFiles)
}

fn build_tree(
    manifest: Manifest,
    files: &mut dyn PackageFiles,
) -> Result<Vec<ResourceNode>, DepositError> {
    let mut seen = HashSet::new();
    manifest
        .resources
        .into_iter()
        .map(|node| build_node(node, files, &mut seen))
        .collect()
}

fn build_node(
    node: ManifestNode,
    files: &mut dyn PackageFiles,
    seen: &mut HashSet<String>,
) -> Result<ResourceNode, DepositError> {
    if !seen.insert(node.id.clone()) {
        return Err(DepositError::InvalidPackage(format!(
            "duplicate resource id {}",
            node.id
        )));
    }

    match node.kind {
        ResourceKind::Container => {
            reject_binary_fields(&node)?;
            let graph = load_graph(&node, files)?;
            let children = node
                .children
                .into_iter()
                .map(|child| build_node(child, files, seen))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ResourceNode::container(node.id, graph, children))
        }
        ResourceKind::RdfSource => {
            reject_binary_fields(&node)?;
            if !node.children.is_empty() {
                return Err(DepositError::InvalidPackage(format!(
                    "rdf-source {} cannot have children",
                    node.id
                )));
            }
            let graph = load_graph(&node, files)?;
            Ok(ResourceNode::rdf_source(node.id, graph))
        }
        ResourceKind::NonRdfSource => {
            if node.graph.is_some() || !node.children.is_empty() {
                return Err(DepositError::InvalidPackage(format!(
                    "non-rdf-source {} cannot have a graph or children",
                    node.id
                )));
            }
            if let Some(desc) = &node.description {
                if desc.kind != ResourceKind::RdfSource
                    || desc.description.is_some()
                    || !desc.children.is_empty()
                {
                    return Err(DepositError::InvalidPackage(format!(
                        "description {} must be a plain rdf-source",
                        desc.id
                    )));
                }
            }
            let file = node.file.as_deref().ok_or_else(|| {
                DepositError::InvalidPackage(format!("non-rdf-source {} needs a file", node.id))
            })?;
            let source = files.binary_source(file)?;
            let media_type = node
                .media_type
                .clone()
                .unwrap_or_else(|| OCTET_STREAM.to_string());
            let binary = ResourceNode::binary(node.id, media_type, source);

            match node.description {
                Some(desc) => {
                    let description = build_node(*desc, files, seen)?;
                    binary.with_description(description)
                }
                None => Ok(binary),
            }
        }
    }
}

fn reject_binary_fields(node: &ManifestNode) -> Result<(), DepositError> {
    if node.file.is_some() || node.media_type.is_some() || node.description.is_some() {
        return Err(DepositError::InvalidPackage(format!(
            "{} {} cannot have file, media_type or description",
            node.kind.as_str(),
            node.id
        )));
    }
    Ok(())
}

fn load_graph(node: &ManifestNode, files: &mut dyn PackageFiles) -> Result<Graph, DepositError> {
    match &node.graph {
        None => Ok(Graph::new()),
        Some(GraphSource::Inline(doc)) => from_jsonld(doc),
        Some(GraphSource::File(path)) => {
            let doc: Value = serde_json::from_slice(&files.read(path)?)?;
            from_jsonld(&doc)
        }
    }
}
