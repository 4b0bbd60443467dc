//! Vocabulary definitions for LDP deposit
//!
//! IRIs, header names and media types shared by the graph model and the
//! repository adapters.

/// Base namespace of the W3C Linked Data Platform vocabulary
pub const LDP_NS: &str = "http://www.w3.org/ns/ldp#";

/// Interaction model for containers
pub const LDP_BASIC_CONTAINER: &str = "http://www.w3.org/ns/ldp#BasicContainer";

/// Interaction model for RDF sources
pub const LDP_RDF_SOURCE: &str = "http://www.w3.org/ns/ldp#RDFSource";

/// Interaction model for binaries
pub const LDP_NON_RDF_SOURCE: &str = "http://www.w3.org/ns/ldp#NonRDFSource";

/// Containment predicate maintained by the repository
pub const LDP_CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";

/// rdf:type
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Datatype assumed for plain literals
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Fragment prefix for skolemized blank nodes ("#_<hash>")
pub const SKOLEM_PREFIX: &str = "#_";

/// Number of hex characters kept from the skolem digest
pub const SKOLEM_HASH_LEN: usize = 16;

/// Link relation naming the description of a binary
pub const DESCRIBED_BY_REL: &str = "describedby";

/// Transaction endpoint below the repository base
pub const FCR_TX: &str = "fcr:tx";

/// Media types
pub const TURTLE: &str = "text/turtle";
pub const N_TRIPLES: &str = "application/n-triples";
pub const JSON_LD: &str = "application/ld+json";
pub const SPARQL_UPDATE: &str = "application/sparql-update";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Package manifest filename
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Link header value declaring the interaction model of a new resource
pub fn interaction_model_link(model: &str) -> String {
    format!("<{}>; rel=\"type\"", model)
}
