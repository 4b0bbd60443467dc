//! URI rewriting over RDF graphs
//!
//! Pure transforms used once repository URIs are known: replacing
//! package-local identifiers, turning blank nodes into addressable
//! fragment URIs, and moving URIs between bases.

use crate::graph::{Graph, Term, Triple};
use crate::resource::UriMap;
use crate::vocab::{SKOLEM_HASH_LEN, SKOLEM_PREFIX};

/// Split a URI into the part before `#` and the fragment (including `#`)
///
/// "urn:a#x" -> ("urn:a", "#x"), "urn:a" -> ("urn:a", "")
pub fn split_fragment(uri: &str) -> (&str, &str) {
    match uri.find('#') {
        Some(pos) => (&uri[..pos], &uri[pos..]),
        None => (uri, ""),
    }
}

/// Move a URI from one base to another
///
/// Returns `None` when `uri` is not under `from_base`. Both bases are
/// compared without trailing slashes, and only whole path segments match:
/// "http://x/tx:1/a" rebases from "http://x/tx:1", "http://x/tx:12" does not.
pub fn rebase_uri(uri: &str, from_base: &str, to_base: &str) -> Option<String> {
    let from = from_base.trim_end_matches('/');
    let to = to_base.trim_end_matches('/');
    let rest = uri.strip_prefix(from)?;
    if rest.is_empty() || rest.starts_with('/') || rest.starts_with('#') {
        Some(format!("{}{}", to, rest))
    } else {
        None
    }
}

/// Remap a single term, keeping its fragment
///
/// Only IRIs are touched; blank nodes and literals pass through.
pub fn remap_term(term: &Term, uri_map: &UriMap) -> Term {
    match term {
        Term::Iri(iri) => {
            let (base, fragment) = split_fragment(iri);
            match uri_map.get(base) {
                Some(mapped) => Term::Iri(format!("{}{}", mapped, fragment)),
                None => term.clone(),
            }
        }
        _ => term.clone(),
    }
}

/// Replace package-local URIs with repository URIs in subjects and objects
///
/// Predicates are never remapped. Remapping a graph with no matching bases
/// yields an identical graph.
pub fn remap(graph: &Graph, uri_map: &UriMap) -> Graph {
    graph
        .iter()
        .map(|t| Triple {
            subject: remap_term(&t.subject, uri_map),
            predicate: t.predicate.clone(),
            object: remap_term(&t.object, uri_map),
        })
        .collect()
}

/// Fragment URI a blank node label skolemizes to ("#_<hex>")
pub fn skolem_fragment(label: &str) -> String {
    let hash = blake3::hash(label.as_bytes());
    let hex = hash.to_hex();
    format!("{}{}", SKOLEM_PREFIX, &hex.as_str()[..SKOLEM_HASH_LEN])
}

/// Replace every blank node with a fragment-relative URI
///
/// The same label always maps to the same fragment, so skolemizing twice is
/// stable.
pub fn skolemize(graph: &Graph) -> Graph {
    let skolem = |term: &Term| -> Term {
        match term {
            Term::Blank(label) => Term::Iri(skolem_fragment(label)),
            other => other.clone(),
        }
    };

    graph
        .iter()
        .map(|t| Triple {
            subject: skolem(&t.subject),
            predicate: t.predicate.clone(),
            object: skolem(&t.object),
        })
        .collect()
}

/// Resolve fragment-relative IRIs ("" and "#x") against a resource URI
pub fn resolve_relative(graph: &Graph, base: &str) -> Graph {
    let resolve = |term: &Term| -> Term {
        match term {
            Term::Iri(iri) if iri.is_empty() || iri.starts_with('#') => {
                Term::Iri(format!("{}{}", base, iri))
            }
            other => other.clone(),
        }
    };

    graph
        .iter()
        .map(|t| Triple {
            subject: resolve(&t.subject),
            predicate: t.predicate.clone(),
            object: resolve(&t.object),
        })
        .collect()
}

/// Rebase every IRI of a graph that lies under `from_base`
pub fn rebase_graph(graph: &Graph, from_base: &str, to_base: &str) -> Graph {
    let rebase = |term: &Term| -> Term {
        match term {
            Term::Iri(iri) => match rebase_uri(iri, from_base, to_base) {
                Some(rebased) => Term::Iri(rebased),
                None => term.clone(),
            },
            other => other.clone(),
        }
    };

    graph
        .iter()
        .map(|t| Triple {
            subject: rebase(&t.subject),
            predicate: t.predicate.clone(),
            object: rebase(&t.object),
        })
        .collect()
}
