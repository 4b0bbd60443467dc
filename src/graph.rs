//! RDF graph value type
//!
//! A graph is a set of triples compared by syntactic term identity. Nothing
//! here canonicalizes literals or blank node labels.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_set;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::DepositError;
use crate::vocab::{RDF_TYPE, XSD_STRING};

const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

/// A node or value in a triple
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Term {
    /// Absolute or fragment-relative IRI
    Iri(String),
    /// Blank node label without the "_:" prefix
    Blank(String),
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    /// Plain string literal
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank(_))
    }

    /// Write the term in Turtle syntax, shortening IRIs under `base` to
    /// relative references.
    fn write_turtle(&self, out: &mut String, base: Option<&str>) {
        match self {
            Term::Iri(iri) => {
                out.push('<');
                match base.and_then(|b| relative_to(iri, b)) {
                    Some(rel) => out.push_str(rel),
                    None => out.push_str(iri),
                }
                out.push('>');
            }
            Term::Blank(label) => {
                out.push_str("_:");
                out.push_str(label);
            }
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                out.push('"');
                escape_literal(value, out);
                out.push('"');
                if let Some(lang) = language {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = datatype {
                    if dt != XSD_STRING {
                        out.push_str("^^<");
                        out.push_str(dt);
                        out.push('>');
                    }
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_turtle(&mut out, None);
        f.write_str(&out)
    }
}

/// "http://x/a" relative to "http://x/a" is "", "http://x/a#f" is "#f"
fn relative_to<'a>(iri: &'a str, base: &str) -> Option<&'a str> {
    let rest = iri.strip_prefix(base)?;
    if rest.is_empty() || rest.starts_with('#') {
        Some(rest)
    } else {
        None
    }
}

fn escape_literal(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
}

/// A subject-predicate-object statement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    fn write_turtle(&self, out: &mut String, base: Option<&str>) {
        self.subject.write_turtle(out, base);
        out.push_str(" <");
        out.push_str(&self.predicate);
        out.push_str("> ");
        self.object.write_turtle(out, base);
        out.push_str(" .\n");
    }
}

/// A set of triples with deterministic iteration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the triple was already present
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    pub fn remove(&mut self, triple: &Triple) -> bool {
        self.triples.remove(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Triple> {
        self.triples.iter()
    }

    /// Triples present here but not in `other`
    pub fn difference(&self, other: &Graph) -> Graph {
        self.triples.difference(&other.triples).cloned().collect()
    }

    pub fn has_blank_nodes(&self) -> bool {
        self.triples
            .iter()
            .any(|t| t.subject.is_blank() || t.object.is_blank())
    }

    /// Every IRI in subject or object position
    pub fn iris(&self) -> BTreeSet<&str> {
        self.triples
            .iter()
            .flat_map(|t| [t.subject.as_iri(), t.object.as_iri()])
            .flatten()
            .collect()
    }

    /// Serialize as N-Triples (one statement per line, sorted)
    pub fn to_ntriples(&self) -> String {
        let mut out = String::new();
        for triple in &self.triples {
            triple.write_turtle(&mut out, None);
        }
        out
    }

    /// Serialize as Turtle with IRIs under `base` written relative, so the
    /// receiving server resolves them against the resource being written.
    pub fn to_turtle_relative(&self, base: &str) -> String {
        let mut out = String::new();
        for triple in &self.triples {
            triple.write_turtle(&mut out, Some(base));
        }
        out
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Self {
            triples: iter.into_iter().collect(),
        }
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        self.triples.extend(iter);
    }
}

impl IntoIterator for Graph {
    type Item = Triple;
    type IntoIter = btree_set::IntoIter<Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = btree_set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}

/// Read a graph from expanded or flattened JSON-LD
///
/// Accepts a node object, an array of node objects, or a document with an
/// `@graph` array. Property keys are taken as predicate IRIs verbatim, so
/// compacted documents must be expanded first. Nodes without `@id` become
/// blank nodes with labels the document does not use itself.
///
/// IRIs containing characters that cannot appear inside `<...>` in Turtle
/// or SPARQL are rejected.
pub fn from_jsonld(doc: &Value) -> Result<Graph, DepositError> {
    let mut reader = JsonLdReader::default();
    collect_blank_labels(doc, &mut reader.document_labels);
    match doc {
        Value::Array(nodes) => {
            for node in nodes {
                reader.read_node(node)?;
            }
        }
        Value::Object(obj) => match obj.get("@graph") {
            Some(Value::Array(nodes)) => {
                for node in nodes {
                    reader.read_node(node)?;
                }
            }
            Some(_) => {
                return Err(DepositError::InvalidPackage(
                    "@graph must be an array".to_string(),
                ))
            }
            None => {
                reader.read_node(doc)?;
            }
        },
        _ => {
            return Err(DepositError::InvalidPackage(
                "JSON-LD document must be an object or array".to_string(),
            ))
        }
    }
    Ok(reader.graph)
}

/// Check that `iri` can be written between angle brackets
pub fn check_iri(iri: &str) -> Result<(), DepositError> {
    let illegal = iri.chars().find(|&c| {
        c.is_control() || matches!(c, ' ' | '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
    });
    match illegal {
        Some(c) => Err(DepositError::InvalidPackage(format!(
            "IRI {:?} contains illegal character {:?}",
            iri, c
        ))),
        None => Ok(()),
    }
}

/// Every "_:label" used as an @id anywhere in the document
fn collect_blank_labels(value: &Value, labels: &mut HashSet<String>) {
    match value {
        Value::Object(obj) => {
            for (key, v) in obj {
                match (key.as_str(), v) {
                    ("@id", Value::String(id)) => {
                        if let Some(label) = id.strip_prefix("_:") {
                            labels.insert(label.to_string());
                        }
                    }
                    _ => collect_blank_labels(v, labels),
                }
            }
        }
        Value::Array(values) => {
            for v in values {
                collect_blank_labels(v, labels);
            }
        }
        _ => {}
    }
}

#[derive(Default)]
struct JsonLdReader {
    graph: Graph,
    blank_counter: usize,
    document_labels: HashSet<String>,
}

impl JsonLdReader {
    fn fresh_blank(&mut self) -> Term {
        loop {
            self.blank_counter += 1;
            let label = format!("b{}", self.blank_counter);
            if !self.document_labels.contains(&label) {
                return Term::Blank(label);
            }
        }
    }

    /// Emit the node's triples and return its subject term
    fn read_node(&mut self, node: &Value) -> Result<Term, DepositError> {
        let obj = node.as_object().ok_or_else(|| {
            DepositError::InvalidPackage(format!("expected a JSON-LD node object, got {}", node))
        })?;

        let subject = match obj.get("@id") {
            Some(Value::String(id)) => id_term(id)?,
            Some(other) => {
                return Err(DepositError::InvalidPackage(format!(
                    "@id must be a string, got {}",
                    other
                )))
            }
            None => self.fresh_blank(),
        };

        match obj.get("@type") {
            Some(Value::String(t)) => {
                check_iri(t)?;
                self.graph
                    .insert(Triple::new(subject.clone(), RDF_TYPE, Term::iri(t.clone())));
            }
            Some(Value::Array(types)) => {
                for t in types.iter().filter_map(|v| v.as_str()) {
                    check_iri(t)?;
                    self.graph
                        .insert(Triple::new(subject.clone(), RDF_TYPE, Term::iri(t)));
                }
            }
            _ => {}
        }

        for (key, value) in obj {
            if key.starts_with('@') {
                continue;
            }
            check_iri(key)?;
            match value {
                Value::Array(values) => {
                    for v in values {
                        let object = self.read_value(v)?;
                        self.graph
                            .insert(Triple::new(subject.clone(), key.clone(), object));
                    }
                }
                v => {
                    let object = self.read_value(v)?;
                    self.graph
                        .insert(Triple::new(subject.clone(), key.clone(), object));
                }
            }
        }

        Ok(subject)
    }

    fn read_value(&mut self, value: &Value) -> Result<Term, DepositError> {
        match value {
            Value::String(s) => Ok(Term::literal(s.clone())),
            Value::Bool(b) => Ok(Term::typed_literal(b.to_string(), XSD_BOOLEAN)),
            Value::Number(n) => {
                if n.is_f64() {
                    Ok(Term::typed_literal(n.to_string(), XSD_DOUBLE))
                } else {
                    Ok(Term::typed_literal(n.to_string(), XSD_INTEGER))
                }
            }
            Value::Object(obj) => {
                if let Some(v) = obj.get("@value") {
                    let lexical = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if let Some(lang) = obj.get("@language").and_then(|l| l.as_str()) {
                        return Ok(Term::lang_literal(lexical, lang));
                    }
                    return Ok(match obj.get("@type").and_then(|t| t.as_str()) {
                        Some(dt) => {
                            check_iri(dt)?;
                            Term::typed_literal(lexical, dt)
                        }
                        None => Term::literal(lexical),
                    });
                }
                // A bare reference is {"@id": ...}; anything richer is an embedded node
                if obj.len() == 1 {
                    if let Some(Value::String(id)) = obj.get("@id") {
                        return id_term(id);
                    }
                }
                self.read_node(value)
            }
            Value::Null | Value::Array(_) => Err(DepositError::InvalidPackage(format!(
                "unsupported JSON-LD value {}",
                value
            ))),
        }
    }
}

fn id_term(id: &str) -> Result<Term, DepositError> {
    match id.strip_prefix("_:") {
        Some(label) => Ok(Term::Blank(label.to_string())),
        None => {
            check_iri(id)?;
            Ok(Term::Iri(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_graph_set_semantics() {
        let mut graph = Graph::new();
        let t = Triple::new(Term::iri("urn:a"), "urn:p", Term::literal("x"));
        assert!(graph.insert(t.clone()));
        assert!(!graph.insert(t.clone()));
        assert_eq!(graph.len(), 1);
        assert!(graph.remove(&t));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_to_ntriples_escapes_literals() {
        let graph: Graph = vec![
            Triple::new(
                Term::iri("urn:a"),
                "urn:title",
                Term::literal("say \"hi\"\nbye"),
            ),
            Triple::new(Term::blank("b1"), "urn:label", Term::lang_literal("Hallo", "de")),
        ]
        .into_iter()
        .collect();

        let nt = graph.to_ntriples();
        assert!(nt.contains("<urn:a> <urn:title> \"say \\\"hi\\\"\\nbye\" .\n"));
        assert!(nt.contains("_:b1 <urn:label> \"Hallo\"@de .\n"));
    }

    #[test]
    fn test_to_turtle_relative() {
        let graph: Graph = vec![
            Triple::new(Term::iri("urn:pkg:a"), "urn:p", Term::iri("urn:pkg:a#sec")),
            Triple::new(Term::iri("urn:pkg:a"), "urn:q", Term::iri("urn:pkg:ab")),
        ]
        .into_iter()
        .collect();

        let ttl = graph.to_turtle_relative("urn:pkg:a");
        assert!(ttl.contains("<> <urn:p> <#sec> .\n"));
        // Shared prefix without a fragment boundary stays absolute
        assert!(ttl.contains("<> <urn:q> <urn:pkg:ab> .\n"));
    }

    #[test]
    fn test_typed_literal_rendering() {
        let int = Term::typed_literal("42", XSD_INTEGER);
        assert_eq!(
            int.to_string(),
            "\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
        let string = Term::typed_literal("x", XSD_STRING);
        assert_eq!(string.to_string(), "\"x\"");
    }

    #[test]
    fn test_from_jsonld_expanded() {
        let doc = json!([
            {
                "@id": "urn:pkg:b",
                "@type": ["http://purl.org/dc/dcmitype/Text"],
                "http://purl.org/dc/terms/isPartOf": [{"@id": "urn:pkg:a"}],
                "http://purl.org/dc/terms/title": [{"@value": "Chapter", "@language": "en"}],
                "http://purl.org/dc/terms/creator": [{"@id": "_:c"}]
            },
            {
                "@id": "_:c",
                "http://xmlns.com/foaf/0.1/name": "Ada"
            }
        ]);

        let graph = from_jsonld(&doc).unwrap();
        assert_eq!(graph.len(), 5);
        assert!(graph.contains(&Triple::new(
            Term::iri("urn:pkg:b"),
            "http://purl.org/dc/terms/isPartOf",
            Term::iri("urn:pkg:a"),
        )));
        assert!(graph.contains(&Triple::new(
            Term::blank("c"),
            "http://xmlns.com/foaf/0.1/name",
            Term::literal("Ada"),
        )));
        assert!(graph.has_blank_nodes());
    }

    #[test]
    fn test_from_jsonld_embedded_node_and_graph_key() {
        let doc = json!({
            "@graph": [{
                "@id": "urn:pkg:d",
                "urn:creator": {"urn:name": "Anon"},
                "urn:size": 12
            }]
        });

        let graph = from_jsonld(&doc).unwrap();
        assert!(graph.contains(&Triple::new(
            Term::iri("urn:pkg:d"),
            "urn:creator",
            Term::blank("b1"),
        )));
        assert!(graph.contains(&Triple::new(
            Term::blank("b1"),
            "urn:name",
            Term::literal("Anon"),
        )));
        assert!(graph.contains(&Triple::new(
            Term::iri("urn:pkg:d"),
            "urn:size",
            Term::typed_literal("12", XSD_INTEGER),
        )));
    }

    #[test]
    fn test_generated_blank_labels_avoid_document_labels() {
        let doc = json!([
            {"@id": "urn:pkg:d", "urn:creator": {"urn:name": "Anon"}},
            {"@id": "_:b1", "urn:name": "Someone Else"}
        ]);

        let graph = from_jsonld(&doc).unwrap();
        let names: Vec<&Term> = graph
            .iter()
            .filter(|t| t.predicate == "urn:name")
            .map(|t| &t.subject)
            .collect();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
        assert!(graph.contains(&Triple::new(
            Term::blank("b1"),
            "urn:name",
            Term::literal("Someone Else"),
        )));
        assert!(graph.contains(&Triple::new(
            Term::blank("b2"),
            "urn:name",
            Term::literal("Anon"),
        )));
    }

    #[test]
    fn test_from_jsonld_rejects_unwritable_iris() {
        let bad_iris = [
            "urn:pkg:a b",
            "urn:pkg:a>",
            "urn:\"x\"",
            "urn:{x}",
            "urn:a|b",
            "urn:a^b",
            "urn:`a`",
            "urn:a\\b",
        ];
        for bad in bad_iris {
            let as_id = from_jsonld(&json!({"@id": bad, "urn:p": "x"}));
            assert!(
                matches!(as_id, Err(DepositError::InvalidPackage(_))),
                "{} accepted as @id",
                bad
            );
        }

        let as_ref = from_jsonld(&json!({"@id": "urn:a", "urn:p": {"@id": "urn:x y"}}));
        assert!(matches!(as_ref, Err(DepositError::InvalidPackage(_))));
        let as_type = from_jsonld(&json!({"@id": "urn:a", "@type": "urn:T>"}));
        assert!(matches!(as_type, Err(DepositError::InvalidPackage(_))));
        let as_predicate = from_jsonld(&json!({"@id": "urn:a", "urn:has part": "x"}));
        assert!(matches!(as_predicate, Err(DepositError::InvalidPackage(_))));

        // Relative and fragment references are fine
        assert!(from_jsonld(&json!({"@id": "", "urn:p": {"@id": "#sec"}})).is_ok());
    }

    #[test]
    fn test_from_jsonld_rejects_scalars() {
        assert!(from_jsonld(&json!("nope")).is_err());
        assert!(from_jsonld(&json!({"@graph": "nope"})).is_err());
    }

    #[test]
    fn test_iris_collects_subjects_and_objects() {
        let graph: Graph = vec![Triple::new(
            Term::iri("urn:a"),
            "urn:p",
            Term::iri("urn:b"),
        )]
        .into_iter()
        .collect();
        let iris = graph.iris();
        assert!(iris.contains("urn:a"));
        assert!(iris.contains("urn:b"));
        assert!(!iris.contains("urn:p"));
    }
}
