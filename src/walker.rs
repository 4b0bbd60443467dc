//! Package walker
//!
//! Deposits a resource tree top-down so every parent exists before its
//! children are created, and records where each local id ended up.

use tracing::debug;

use crate::error::DepositError;
use crate::notify::{DepositEvent, Notifier};
use crate::resource::{ResourceNode, UriMap};
use crate::session::DepositSession;

/// A node that received a repository URI during the walk
#[derive(Debug, Clone, Copy)]
pub struct VisitedNode<'a> {
    pub node: &'a ResourceNode,
    pub repository_uri: &'a str,
}

/// Result of a complete walk
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub uri_map: UriMap,
    /// Local ids in deposit order, descriptions right after their binary
    pub order: Vec<String>,
    /// Number of `deposit` calls made
    pub deposits: usize,
    /// Number of descriptions whose URI was recorded
    pub descriptions: usize,
}

impl WalkOutcome {
    /// Nodes in walk order paired with their repository URI
    ///
    /// `tree` must be the tree this outcome was produced from.
    pub fn visited<'a>(&'a self, tree: &'a [ResourceNode]) -> Vec<VisitedNode<'a>> {
        fn visit<'a>(node: &'a ResourceNode, map: &'a UriMap, out: &mut Vec<VisitedNode<'a>>) {
            if let Some(uri) = map.get(&node.local_id) {
                out.push(VisitedNode {
                    node,
                    repository_uri: uri,
                });
            }
            if let Some(desc) = node.description() {
                if let Some(uri) = map.get(&desc.local_id) {
                    out.push(VisitedNode {
                        node: desc,
                        repository_uri: uri,
                    });
                }
            }
            for child in node.children() {
                visit(child, map, out);
            }
        }

        let mut out = Vec::new();
        for root in tree {
            visit(root, &self.uri_map, &mut out);
        }
        out
    }
}

/// Deposit every root of `tree` under `target_container`, preorder
///
/// The first failure aborts the walk; nothing below a failed node is
/// attempted.
pub fn walk(
    tree: &[ResourceNode],
    target_container: &str,
    session: &mut dyn DepositSession,
    notifier: &dyn Notifier,
) -> Result<WalkOutcome, DepositError> {
    let mut outcome = WalkOutcome::default();
    for root in tree {
        walk_node(root, target_container, session, notifier, &mut outcome)?;
    }
    Ok(outcome)
}

fn walk_node(
    node: &ResourceNode,
    parent_uri: &str,
    session: &mut dyn DepositSession,
    notifier: &dyn Notifier,
    outcome: &mut WalkOutcome,
) -> Result<(), DepositError> {
    let record = session.deposit(node, parent_uri)?;
    outcome.deposits += 1;
    debug!(
        local_id = %node.local_id,
        uri = %record.repository_uri,
        parent = %parent_uri,
        "Deposited {}",
        node.kind().as_str()
    );

    outcome
        .uri_map
        .record(node.local_id.clone(), record.repository_uri.clone())?;
    outcome.order.push(node.local_id.clone());
    notifier.notify(&DepositEvent::deposit(&record.repository_uri, node));

    if let Some(description) = node.description() {
        let description_uri = record
            .description_uri
            .as_deref()
            .ok_or_else(|| DepositError::MissingDescriptionUri(record.repository_uri.clone()))?;
        outcome
            .uri_map
            .record(description.local_id.clone(), description_uri)?;
        outcome.order.push(description.local_id.clone());
        outcome.descriptions += 1;
        notifier.notify(&DepositEvent::deposit(description_uri, description));
    }

    for child in node.children() {
        walk_node(child, &record.repository_uri, session, notifier, outcome)?;
    }
    Ok(())
}
