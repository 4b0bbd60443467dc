//! Triple-level diff between two graph snapshots
//!
//! Triples, not serialized documents, are the unit of comparison, so the
//! resulting patch does not depend on formatting or statement order.

use crate::graph::Graph;

/// Statements to insert and delete to turn one graph into another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDiff {
    pub added: Graph,
    pub removed: Graph,
}

impl GraphDiff {
    /// True when applying the diff would change nothing
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of statements touched
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Render as a SPARQL 1.1 Update request
    ///
    /// Deletions come first so a statement that is both removed and re-added
    /// under a different term ends up present. Empty clauses are omitted; an
    /// empty diff renders as an empty string.
    pub fn to_sparql_update(&self) -> String {
        let mut parts = Vec::new();
        if !self.removed.is_empty() {
            parts.push(format!("DELETE DATA {{\n{}}}", self.removed.to_ntriples()));
        }
        if !self.added.is_empty() {
            parts.push(format!("INSERT DATA {{\n{}}}", self.added.to_ntriples()));
        }
        parts.join(" ;\n")
    }

    /// Apply to a graph in place
    pub fn apply_to(&self, graph: &mut Graph) {
        for triple in &self.removed {
            graph.remove(triple);
        }
        graph.extend(self.added.iter().cloned());
    }
}

/// Compute `(updated - original, original - updated)`
///
/// Uses exact triple equality.
pub fn diff(original: &Graph, updated: &Graph) -> GraphDiff {
    GraphDiff {
        added: updated.difference(original),
        removed: original.difference(updated),
    }
}
