//! Deposit orchestration
//!
//! Runs the walk, rewrites package-local links in every RDF-bearing resource
//! once all repository URIs are known, and commits. Any failure on the way
//! rolls the whole package back.

use tracing::{debug, error, info, warn};

use crate::diff::diff;
use crate::error::DepositError;
use crate::notify::{DepositEvent, Notifier};
use crate::remap::remap;
use crate::resource::{ResourceNode, UriMap};
use crate::session::{DepositSession, SessionFactory};
use crate::walker::{walk, VisitedNode};

/// Statistics from a committed deposit
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DepositReport {
    /// Number of resources created through `deposit`
    pub resources_deposited: usize,
    /// Number of binary descriptions whose URI was recorded
    pub descriptions_recorded: usize,
    /// Number of graphs patched during remapping
    pub graphs_remapped: usize,
    /// Number of graphs that needed no patch
    pub graphs_unchanged: usize,
}

impl DepositReport {
    pub fn summary(&self) -> String {
        format!(
            "{} resources deposited, {} descriptions, {} graphs remapped, {} unchanged",
            self.resources_deposited,
            self.descriptions_recorded,
            self.graphs_remapped,
            self.graphs_unchanged
        )
    }
}

/// Deposits packages, one session per package
pub struct DepositManager<F> {
    factory: F,
}

impl<F: SessionFactory> DepositManager<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Deposit `tree` below `target_container` as one transaction
    pub fn deposit_package(
        &self,
        tree: &[ResourceNode],
        target_container: &str,
        notifier: &dyn Notifier,
    ) -> Result<DepositReport, DepositError> {
        let mut session = match self.factory.open() {
            Ok(session) => session,
            Err(e) => {
                error!(target_container, "Failed to open deposit session: {}", e);
                notifier.notify(&DepositEvent::error(e.to_string()));
                return Err(e);
            }
        };
        deposit_with_session(&mut session, tree, target_container, notifier)
    }
}

/// Deposit `tree` through an already opened session
///
/// Exactly one of `commit` or `rollback` is called on `session`, unless a
/// session method reports [`DepositError::IllegalState`], which is returned
/// as-is.
pub fn deposit_with_session(
    session: &mut dyn DepositSession,
    tree: &[ResourceNode],
    target_container: &str,
    notifier: &dyn Notifier,
) -> Result<DepositReport, DepositError> {
    info!(target_container, roots = tree.len(), "Starting package deposit");

    let report = match run_phases(session, tree, target_container, notifier) {
        Ok(report) => report,
        Err(e) if e.is_illegal_state() => return Err(e),
        Err(e) => {
            warn!(target_container, "Deposit failed, rolling back: {}", e);
            if let Err(rollback_err) = session.rollback() {
                error!(
                    primary = %e,
                    "Rollback failed: {}",
                    rollback_err
                );
            }
            notifier.notify(&DepositEvent::error(e.to_string()));
            return Err(e);
        }
    };

    if let Err(e) = session.commit() {
        error!(target_container, "Commit failed: {}", e);
        notifier.notify(&DepositEvent::error(e.to_string()));
        return Err(e);
    }

    info!(target_container, "{}", report.summary());
    notifier.notify(&DepositEvent::success(target_container, report.summary()));
    Ok(report)
}

/// Walk, then remap; the URI map lives only for the duration of this call
fn run_phases(
    session: &mut dyn DepositSession,
    tree: &[ResourceNode],
    target_container: &str,
    notifier: &dyn Notifier,
) -> Result<DepositReport, DepositError> {
    let outcome = walk(tree, target_container, session, notifier)?;
    let mut report = DepositReport {
        resources_deposited: outcome.deposits,
        descriptions_recorded: outcome.descriptions,
        ..Default::default()
    };

    let visited = outcome.visited(tree);
    remap_phase(session, &visited, &outcome.uri_map, notifier, &mut report)?;
    Ok(report)
}

/// Rewrite package-local links of every RDF-bearing resource
///
/// Binaries carry no links and are never fetched or patched.
fn remap_phase(
    session: &mut dyn DepositSession,
    visited: &[VisitedNode<'_>],
    uri_map: &UriMap,
    notifier: &dyn Notifier,
    report: &mut DepositReport,
) -> Result<(), DepositError> {
    for v in visited.iter().filter(|v| v.node.is_rdf_bearing()) {
        let (original, token) = session.fetch_graph(v.repository_uri)?;
        let updated = remap(&original, uri_map);
        let patch = diff(&original, &updated);

        if patch.is_empty() {
            debug!(uri = v.repository_uri, "Graph has no package-local links");
            report.graphs_unchanged += 1;
            continue;
        }

        session.apply_patch(v.repository_uri, &patch, &token)?;
        report.graphs_remapped += 1;
        debug!(
            uri = v.repository_uri,
            added = patch.added.len(),
            removed = patch.removed.len(),
            "Remapped graph"
        );
        notifier.notify(&DepositEvent::remap(
            v.repository_uri,
            v.node,
            format!("+{} -{}", patch.added.len(), patch.removed.len()),
        ));
    }
    Ok(())
}
