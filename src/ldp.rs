//! HTTP adapter for LDP repositories with Fedora-style transactions
//!
//! A transaction is opened with `POST {base}/fcr:tx`; the server answers
//! with a transaction base (`{base}/tx:<id>`) under which every resource is
//! addressed until commit. URIs are translated to and from that base at
//! this boundary, so callers only ever see canonical repository URIs.

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG, IF_MATCH, LINK, LOCATION};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{PatchMode, RepositoryConfig};
use crate::diff::GraphDiff;
use crate::error::DepositError;
use crate::graph::{from_jsonld, Graph};
use crate::remap::{rebase_graph, rebase_uri, skolemize};
use crate::resource::{DepositedRecord, ResourceKind, ResourceNode};
use crate::session::{ConcurrencyToken, DepositSession, SessionFactory, SessionState};
use crate::vocab::{
    interaction_model_link, DESCRIBED_BY_REL, FCR_TX, JSON_LD, LDP_BASIC_CONTAINER,
    LDP_NON_RDF_SOURCE, LDP_RDF_SOURCE, N_TRIPLES, SPARQL_UPDATE, TURTLE,
};

const PREFER_LENIENT: &str = "handling=lenient; received=\"minimal\"";

/// Opens [`LdpSession`]s against one repository
pub struct LdpSessionFactory {
    client: Client,
    config: RepositoryConfig,
}

impl LdpSessionFactory {
    pub fn new(config: RepositoryConfig) -> Result<Self, DepositError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| DepositError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

impl SessionFactory for LdpSessionFactory {
    type Session = LdpSession;

    fn open(&self) -> Result<LdpSession, DepositError> {
        let mut session = LdpSession::new(self.client.clone(), self.config.clone(), None);
        if self.config.use_transactions {
            session.begin_transaction()?;
        }
        Ok(session)
    }
}

/// One deposit against an LDP server
pub struct LdpSession {
    client: Client,
    config: RepositoryConfig,
    base_url: String,
    /// Transaction base while a server-side transaction is open
    tx_base: Option<String>,
    state: SessionState,
    /// Canonical URIs created so far, for non-transactional rollback
    created: Vec<String>,
}

impl LdpSession {
    fn new(client: Client, config: RepositoryConfig, tx_base: Option<String>) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client,
            config,
            base_url,
            tx_base,
            state: SessionState::Idle,
            created: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transaction_base(&self) -> Option<&str> {
        self.tx_base.as_deref()
    }

    fn begin_transaction(&mut self) -> Result<(), DepositError> {
        let endpoint = format!("{}/{}", self.base_url, FCR_TX);
        let response = self.send(self.request(Method::POST, &endpoint), &endpoint)?;
        let location = header_str(&response, LOCATION.as_str())
            .ok_or_else(|| DepositError::failure(&endpoint, "transaction has no Location"))?;
        info!(transaction = %location, "Opened repository transaction");
        self.tx_base = Some(location.trim_end_matches('/').to_string());
        Ok(())
    }

    /// Canonical URI -> URI addressed on the wire
    fn to_wire(&self, uri: &str) -> String {
        match &self.tx_base {
            Some(tx) => rebase_uri(uri, &self.base_url, tx).unwrap_or_else(|| uri.to_string()),
            None => uri.to_string(),
        }
    }

    /// URI returned by the server -> canonical URI
    fn from_wire(&self, uri: &str) -> String {
        match &self.tx_base {
            Some(tx) => rebase_uri(uri, tx, &self.base_url).unwrap_or_else(|| uri.to_string()),
            None => uri.to_string(),
        }
    }

    fn graph_to_wire(&self, graph: &Graph) -> Graph {
        match &self.tx_base {
            Some(tx) => rebase_graph(graph, &self.base_url, tx),
            None => graph.clone(),
        }
    }

    fn graph_from_wire(&self, graph: &Graph) -> Graph {
        match &self.tx_base {
            Some(tx) => rebase_graph(graph, tx, &self.base_url),
            None => graph.clone(),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.username {
            Some(user) => builder.basic_auth(user, self.config.password.as_deref()),
            None => builder,
        }
    }

    /// Send and turn transport errors and non-success statuses into failures
    fn send(&self, builder: RequestBuilder, uri: &str) -> Result<Response, DepositError> {
        let response = builder
            .send()
            .map_err(|e| DepositError::failure(uri, format!("HTTP request failed: {}", e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::PRECONDITION_FAILED {
            return Err(DepositError::ConcurrentModification {
                uri: uri.to_string(),
            });
        }
        let body = response.text().unwrap_or_default();
        Err(DepositError::failure(
            uri,
            format!("{} {}", status.as_u16(), body.trim()),
        ))
    }

    /// Turtle body for a graph, with the node's own id written as `<>`
    fn turtle_body(node: &ResourceNode) -> String {
        let graph = node.graph().cloned().unwrap_or_default();
        skolemize(&graph).to_turtle_relative(&node.local_id)
    }

    fn put_description(
        &self,
        description: &ResourceNode,
        wire_uri: &str,
    ) -> Result<(), DepositError> {
        let body = Self::turtle_body(description);
        self.send(
            self.request(Method::PUT, wire_uri)
                .header(CONTENT_TYPE, TURTLE)
                .header("Prefer", PREFER_LENIENT)
                .body(body),
            wire_uri,
        )?;
        Ok(())
    }

    fn replace_graph(
        &mut self,
        uri: &str,
        patch: &GraphDiff,
        token: &ConcurrencyToken,
    ) -> Result<(), DepositError> {
        let wire = self.to_wire(uri);
        let (mut graph, _) = self.fetch_wire_graph(&wire)?;
        patch.apply_to(&mut graph);
        let body = self.graph_to_wire(&graph).to_ntriples();
        self.send(
            self.request(Method::PUT, &wire)
                .header(CONTENT_TYPE, N_TRIPLES)
                .header(IF_MATCH, token.as_str())
                .header("Prefer", PREFER_LENIENT)
                .body(body),
            uri,
        )?;
        Ok(())
    }

    fn fetch_wire_graph(&self, wire: &str) -> Result<(Graph, ConcurrencyToken), DepositError> {
        let response = self.send(
            self.request(Method::GET, wire).header(ACCEPT, JSON_LD),
            wire,
        )?;
        let token = ConcurrencyToken::new(header_str(&response, ETAG.as_str()).unwrap_or_default());
        let text = response
            .text()
            .map_err(|e| DepositError::failure(wire, format!("cannot read body: {}", e)))?;
        let doc: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| DepositError::failure(wire, format!("unreadable JSON-LD: {}", e)))?;
        let graph = from_jsonld(&doc)?;
        Ok((self.graph_from_wire(&graph), token))
    }

    fn finish_transaction(&mut self, action: &str) -> Result<(), DepositError> {
        if let Some(tx) = &self.tx_base {
            let endpoint = format!("{}/{}/fcr:{}", tx, FCR_TX, action);
            self.send(self.request(Method::POST, &endpoint), &endpoint)?;
            info!(transaction = %tx, "Transaction {}", action);
        }
        Ok(())
    }

    /// Without a server transaction, undo by deleting what was created
    fn delete_created(&mut self) -> Result<(), DepositError> {
        let mut failures = Vec::new();
        while let Some(uri) = self.created.pop() {
            if let Err(e) = self.send(self.request(Method::DELETE, &uri), &uri) {
                warn!(uri = %uri, "Failed to delete during rollback: {}", e);
                failures.push(uri);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DepositError::failure(
                &self.base_url,
                format!("could not delete {} resource(s): {}", failures.len(), failures.join(", ")),
            ))
        }
    }
}

impl DepositSession for LdpSession {
    fn deposit(
        &mut self,
        node: &ResourceNode,
        parent_uri: &str,
    ) -> Result<DepositedRecord, DepositError> {
        self.state.enter_operation("deposit")?;
        let wire_parent = self.to_wire(parent_uri);

        let mut builder = self.request(Method::POST, &wire_parent);
        if let Some(slug) = slug_for(&node.local_id) {
            builder = builder.header("Slug", slug);
        }
        let builder = match node.kind() {
            ResourceKind::Container => builder
                .header(LINK, interaction_model_link(LDP_BASIC_CONTAINER))
                .header(CONTENT_TYPE, TURTLE)
                .body(Self::turtle_body(node)),
            ResourceKind::RdfSource => builder
                .header(LINK, interaction_model_link(LDP_RDF_SOURCE))
                .header(CONTENT_TYPE, TURTLE)
                .body(Self::turtle_body(node)),
            ResourceKind::NonRdfSource => {
                let binary = node.binary_content().ok_or_else(|| {
                    DepositError::InvalidPackage(format!("{} has no content", node.local_id))
                })?;
                builder
                    .header(LINK, interaction_model_link(LDP_NON_RDF_SOURCE))
                    .header(CONTENT_TYPE, binary.media_type.as_str())
                    .body(Body::new(binary.source.open()?))
            }
        };

        let response = self.send(builder, parent_uri)?;
        let location = header_str(&response, LOCATION.as_str())
            .ok_or_else(|| DepositError::failure(parent_uri, "created resource has no Location"))?;
        let described_by = response
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| find_link(v, DESCRIBED_BY_REL));

        let uri = self.from_wire(&location);
        self.created.push(uri.clone());
        debug!(local_id = %node.local_id, uri = %uri, "Created resource");
        let mut record = DepositedRecord::new(uri.clone());

        if let Some(description) = node.description() {
            let wire_desc = described_by
                .ok_or_else(|| DepositError::MissingDescriptionUri(uri.clone()))?;
            self.put_description(description, &wire_desc)?;
            record = record.with_description(self.from_wire(&wire_desc));
        }
        Ok(record)
    }

    fn fetch_graph(&mut self, uri: &str) -> Result<(Graph, ConcurrencyToken), DepositError> {
        self.state.enter_operation("fetch graph")?;
        let wire = self.to_wire(uri);
        self.fetch_wire_graph(&wire)
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
        match self.config.patch_mode {
            PatchMode::SparqlUpdate => {
                let wire = self.to_wire(uri);
                let body = sparql_body(self, patch);
                let mut builder = self
                    .request(Method::PATCH, &wire)
                    .header(CONTENT_TYPE, SPARQL_UPDATE)
                    .body(body);
                if !token.as_str().is_empty() {
                    builder = builder.header(IF_MATCH, token.as_str());
                }
                self.send(builder, uri)?;
                Ok(())
            }
            PatchMode::Replace => self.replace_graph(uri, patch, token),
        }
    }

    fn commit(&mut self) -> Result<(), DepositError> {
        self.state.check_finish("commit")?;
        if self.tx_base.is_none() {
            warn!("No repository transaction; changes were visible while depositing");
        }
        self.finish_transaction("commit")?;
        self.state.finish(true);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DepositError> {
        self.state.check_finish("rollback")?;
        let result = if self.tx_base.is_some() {
            self.finish_transaction("rollback")
        } else {
            self.delete_created()
        };
        self.state.finish(false);
        result
    }
}

/// SPARQL Update body with URIs translated to the transaction base
fn sparql_body(session: &LdpSession, patch: &GraphDiff) -> String {
    GraphDiff {
        added: session.graph_to_wire(&patch.added),
        removed: session.graph_to_wire(&patch.removed),
    }
    .to_sparql_update()
}

/// Path segment suggested to the server, from the tail of the local id
///
/// "urn:pkg:chapter-1" -> "chapter-1"; the server may ignore it.
fn slug_for(local_id: &str) -> Option<String> {
    let tail = local_id
        .trim_end_matches('/')
        .rsplit(|c| c == '/' || c == ':' || c == '#')
        .next()
        .unwrap_or_default();
    let slug: String = tail
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if slug.is_empty() || slug.starts_with('.') {
        None
    } else {
        Some(slug)
    }
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Parse an HTTP Link header into (target, relations) pairs
pub fn parse_link_header(value: &str) -> Vec<(String, Vec<String>)> {
    let mut links = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        let Some(rest) = part.strip_prefix('<') else {
            continue;
        };
        let Some(end) = rest.find('>') else {
            continue;
        };
        let target = rest[..end].to_string();
        let mut rels = Vec::new();
        for param in rest[end + 1..].split(';') {
            let param = param.trim();
            if let Some(v) = param.strip_prefix("rel=") {
                rels.extend(
                    v.trim_matches('"')
                        .split_whitespace()
                        .map(|r| r.to_ascii_lowercase()),
                );
            }
        }
        links.push((target, rels));
    }
    links
}

/// First link target carrying `rel`
pub fn find_link(value: &str, rel: &str) -> Option<String> {
    parse_link_header(value)
        .into_iter()
        .find(|(_, rels)| rels.iter().any(|r| r == rel))
        .map(|(target, _)| target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Term, Triple};

    fn session_in_tx() -> LdpSession {
        let config = RepositoryConfig {
            base_url: "http://repo/rest/".to_string(),
            ..Default::default()
        };
        LdpSession::new(Client::new(), config, Some("http://repo/rest/tx:42".to_string()))
    }

    #[test]
    fn test_parse_link_header() {
        let links = parse_link_header(
            "<http://repo/rest/a/fcr:metadata>; rel=\"describedby\", <http://www.w3.org/ns/ldp#NonRDFSource>;rel=\"type\"",
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, "http://repo/rest/a/fcr:metadata");
        assert_eq!(links[0].1, vec!["describedby"]);
        assert_eq!(links[1].1, vec!["type"]);

        assert_eq!(
            find_link("<http://x/d>; rel=\"describedby edit\"", "describedby"),
            Some("http://x/d".to_string())
        );
        assert_eq!(find_link("<http://x/d>; rel=\"type\"", "describedby"), None);
        assert!(parse_link_header("garbage").is_empty());
    }

    #[test]
    fn test_slug_for() {
        assert_eq!(slug_for("urn:pkg:chapter-1"), Some("chapter-1".to_string()));
        assert_eq!(slug_for("./data/figure 2.png"), Some("figure2.png".to_string()));
        assert_eq!(slug_for("http://example.org/items/"), Some("items".to_string()));
        assert_eq!(slug_for("urn:pkg:"), None);
        assert_eq!(slug_for("../.."), None);
    }

    #[test]
    fn test_wire_translation() {
        let session = session_in_tx();
        assert_eq!(session.to_wire("http://repo/rest/a/b"), "http://repo/rest/tx:42/a/b");
        assert_eq!(session.from_wire("http://repo/rest/tx:42/a/b"), "http://repo/rest/a/b");
        assert_eq!(session.to_wire("http://elsewhere/x"), "http://elsewhere/x");
        assert_eq!(session.transaction_base(), Some("http://repo/rest/tx:42"));
    }

    #[test]
    fn test_no_transaction_keeps_uris() {
        let session = LdpSession::new(Client::new(), RepositoryConfig::default(), None);
        assert_eq!(
            session.to_wire("http://localhost:8080/rest/a"),
            "http://localhost:8080/rest/a"
        );
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_sparql_body_uses_transaction_uris() {
        let session = session_in_tx();
        let patch = GraphDiff {
            added: vec![Triple::new(
                Term::iri("http://repo/rest/b"),
                "urn:isPartOf",
                Term::iri("http://repo/rest/a"),
            )]
            .into_iter()
            .collect(),
            removed: vec![Triple::new(
                Term::iri("http://repo/rest/b"),
                "urn:isPartOf",
                Term::iri("urn:pkg:a"),
            )]
            .into_iter()
            .collect(),
        };
        let body = sparql_body(&session, &patch);
        assert!(body.contains(
            "INSERT DATA {\n<http://repo/rest/tx:42/b> <urn:isPartOf> <http://repo/rest/tx:42/a> .\n}"
        ));
        assert!(body.contains("<urn:pkg:a>"));
    }

    #[test]
    fn test_turtle_body_is_relative_and_skolemized() {
        let node = ResourceNode::rdf_source(
            "urn:pkg:b",
            vec![
                Triple::new(Term::iri("urn:pkg:b"), "urn:title", Term::literal("B")),
                Triple::new(Term::iri("urn:pkg:b"), "urn:creator", Term::blank("x")),
            ]
            .into_iter()
            .collect(),
        );
        let body = LdpSession::turtle_body(&node);
        assert!(body.contains("<> <urn:title> \"B\" .\n"));
        assert!(body.contains("<> <urn:creator> <#_"));
        assert!(!body.contains("_:x"));
    }

    #[test]
    fn test_finished_session_rejects_operations() {
        let mut session = LdpSession::new(Client::new(), RepositoryConfig::default(), None);
        // Nothing created and no transaction: rollback needs no request
        session.rollback().unwrap();
        assert!(matches!(
            session.fetch_graph("http://localhost:8080/rest/a"),
            Err(DepositError::IllegalState { .. })
        ));
        assert!(session.commit().is_err());
    }

    mod http {
        use super::*;
        use crate::resource::BinarySource;
        use httpmock::MockServer;
        use serde_json::json;

        fn open_session(server: &MockServer, use_transactions: bool) -> LdpSession {
            open_with_mode(server, use_transactions, PatchMode::SparqlUpdate)
        }

        fn open_with_mode(
            server: &MockServer,
            use_transactions: bool,
            patch_mode: PatchMode,
        ) -> LdpSession {
            let config = RepositoryConfig {
                base_url: server.url("/rest"),
                use_transactions,
                patch_mode,
                ..Default::default()
            };
            LdpSessionFactory::new(config).unwrap().open().unwrap()
        }

        fn relink_patch(uri: &str, target: &str) -> GraphDiff {
            GraphDiff {
                added: vec![Triple::new(Term::iri(uri), "urn:rel", Term::iri(target))]
                    .into_iter()
                    .collect(),
                removed: vec![Triple::new(Term::iri(uri), "urn:rel", Term::iri("urn:pkg:a"))]
                    .into_iter()
                    .collect(),
            }
        }

        #[test]
        fn test_deposit_posts_to_parent_and_reads_location() {
            let server = MockServer::start();
            let created = server.url("/rest/a");
            let post = server.mock(|when, then| {
                when.method("POST")
                    .path("/rest")
                    .header("Slug", "a")
                    .header("Content-Type", "text/turtle")
                    .header("Link", interaction_model_link(LDP_BASIC_CONTAINER).as_str())
                    .body_contains("<> <urn:title> \"A\" .");
                then.status(201).header("Location", created.as_str());
            });

            let mut session = open_session(&server, false);
            let node = ResourceNode::container(
                "urn:pkg:a",
                vec![Triple::new(Term::iri("urn:pkg:a"), "urn:title", Term::literal("A"))]
                    .into_iter()
                    .collect(),
                vec![],
            );
            let record = session.deposit(&node, &server.url("/rest")).unwrap();

            post.assert();
            assert_eq!(record.repository_uri, created);
            assert!(record.description_uri.is_none());
            assert_eq!(session.state(), SessionState::Active);
        }

        #[test]
        fn test_deposit_without_location_fails() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method("POST").path("/rest");
                then.status(201);
            });

            let mut session = open_session(&server, false);
            let node = ResourceNode::rdf_source("urn:pkg:b", Graph::new());
            let err = session.deposit(&node, &server.url("/rest")).unwrap_err();
            assert!(err.is_deposit_failure());
        }

        fn binary_with_description() -> ResourceNode {
            ResourceNode::binary("urn:pkg:c", "text/plain", BinarySource::Bytes(b"hi".to_vec()))
                .with_description(ResourceNode::rdf_source(
                    "urn:pkg:d",
                    vec![Triple::new(
                        Term::iri("urn:pkg:d"),
                        "urn:title",
                        Term::literal("Figure"),
                    )]
                    .into_iter()
                    .collect(),
                ))
                .unwrap()
        }

        #[test]
        fn test_binary_description_written_to_describedby_target() {
            let server = MockServer::start();
            let binary_uri = server.url("/rest/c");
            let desc_uri = server.url("/rest/c/fcr:metadata");
            let described_by = format!("<{}>; rel=\"describedby\"", desc_uri);
            let post = server.mock(|when, then| {
                when.method("POST")
                    .path("/rest")
                    .header("Content-Type", "text/plain")
                    .body("hi");
                then.status(201)
                    .header("Location", binary_uri.as_str())
                    .header("Link", described_by.as_str());
            });
            let put = server.mock(|when, then| {
                when.method("PUT")
                    .path("/rest/c/fcr:metadata")
                    .header("Content-Type", "text/turtle")
                    .body_contains("<> <urn:title> \"Figure\" .");
                then.status(204);
            });

            let mut session = open_session(&server, false);
            let record = session
                .deposit(&binary_with_description(), &server.url("/rest"))
                .unwrap();

            post.assert();
            put.assert();
            assert_eq!(record.repository_uri, binary_uri);
            assert_eq!(record.description_uri, Some(desc_uri));
        }

        #[test]
        fn test_missing_describedby_header() {
            let server = MockServer::start();
            let binary_uri = server.url("/rest/c");
            server.mock(|when, then| {
                when.method("POST").path("/rest");
                then.status(201).header("Location", binary_uri.as_str());
            });
            let put = server.mock(|when, then| {
                when.method("PUT");
                then.status(204);
            });

            let mut session = open_session(&server, false);
            let err = session
                .deposit(&binary_with_description(), &server.url("/rest"))
                .unwrap_err();

            assert!(matches!(&err, DepositError::MissingDescriptionUri(uri) if *uri == binary_uri));
            assert!(err.is_deposit_failure());
            assert_eq!(put.hits(), 0);
        }

        #[test]
        fn test_precondition_failed_patch_is_concurrent_modification() {
            let server = MockServer::start();
            let uri = server.url("/rest/b");
            let patch = server.mock(|when, then| {
                when.method("PATCH")
                    .path("/rest/b")
                    .header("If-Match", "\"v1\"")
                    .header("Content-Type", "application/sparql-update")
                    .body_contains("DELETE DATA");
                then.status(412);
            });

            let mut session = open_session(&server, false);
            let err = session
                .apply_patch(
                    &uri,
                    &relink_patch(&uri, &server.url("/rest/a")),
                    &ConcurrencyToken::new("\"v1\""),
                )
                .unwrap_err();

            patch.assert();
            assert!(matches!(err, DepositError::ConcurrentModification { uri: ref u } if *u == uri));
        }

        #[test]
        fn test_replace_mode_puts_whole_graph_as_ntriples() {
            let server = MockServer::start();
            let uri = server.url("/rest/b");
            let target = server.url("/rest/a");
            let get = server.mock(|when, then| {
                when.method("GET")
                    .path("/rest/b")
                    .header("Accept", "application/ld+json");
                then.status(200)
                    .header("Content-Type", "application/ld+json")
                    .header("ETag", "\"v7\"")
                    .json_body(json!([{
                        "@id": uri.as_str(),
                        "urn:title": "B",
                        "urn:rel": [{"@id": "urn:pkg:a"}]
                    }]));
            });
            let expected = format!("<{}> <urn:rel> <{}> .", uri, target);
            let put = server.mock(|when, then| {
                when.method("PUT")
                    .path("/rest/b")
                    .header("Content-Type", "application/n-triples")
                    .header("If-Match", "\"v7\"")
                    .body_contains(expected.as_str())
                    .body_contains("\"B\"");
                then.status(204);
            });

            let mut session = open_with_mode(&server, false, PatchMode::Replace);
            let (graph, token) = session.fetch_graph(&uri).unwrap();
            assert_eq!(token.as_str(), "\"v7\"");
            assert_eq!(graph.len(), 2);

            session
                .apply_patch(&uri, &relink_patch(&uri, &target), &token)
                .unwrap();

            // One GET for fetch_graph, one inside the replace
            assert_eq!(get.hits(), 2);
            put.assert();
        }

        #[test]
        fn test_transaction_commit() {
            let server = MockServer::start();
            let tx = server.url("/rest/tx:1");
            let tx_child = server.url("/rest/tx:1/a");
            let begin = server.mock(|when, then| {
                when.method("POST").path("/rest/fcr:tx");
                then.status(201).header("Location", tx.as_str());
            });
            let post = server.mock(|when, then| {
                when.method("POST").path("/rest/tx:1");
                then.status(201).header("Location", tx_child.as_str());
            });
            let commit = server.mock(|when, then| {
                when.method("POST").path("/rest/tx:1/fcr:tx/fcr:commit");
                then.status(204);
            });

            let mut session = open_session(&server, true);
            begin.assert();
            assert_eq!(session.transaction_base(), Some(tx.as_str()));

            let node = ResourceNode::rdf_source("urn:pkg:a", Graph::new());
            let record = session.deposit(&node, &server.url("/rest")).unwrap();
            post.assert();
            // Callers see the canonical URI, not the transaction one
            assert_eq!(record.repository_uri, server.url("/rest/a"));

            session.commit().unwrap();
            commit.assert();
            assert_eq!(session.state(), SessionState::Committed);
        }

        #[test]
        fn test_transaction_rollback_deletes_nothing() {
            let server = MockServer::start();
            let tx = server.url("/rest/tx:2");
            server.mock(|when, then| {
                when.method("POST").path("/rest/fcr:tx");
                then.status(201).header("Location", tx.as_str());
            });
            let rollback = server.mock(|when, then| {
                when.method("POST").path("/rest/tx:2/fcr:tx/fcr:rollback");
                then.status(204);
            });
            let delete = server.mock(|when, then| {
                when.method("DELETE");
                then.status(204);
            });

            let mut session = open_session(&server, true);
            session.rollback().unwrap();

            rollback.assert();
            assert_eq!(delete.hits(), 0);
            assert_eq!(session.state(), SessionState::RolledBack);
        }

        #[test]
        fn test_failed_transaction_open() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method("POST").path("/rest/fcr:tx");
                then.status(503).body("maintenance");
            });

            let config = RepositoryConfig {
                base_url: server.url("/rest"),
                ..Default::default()
            };
            let err = LdpSessionFactory::new(config).unwrap().open().err().unwrap();
            match err {
                DepositError::DepositFailure { reason, .. } => {
                    assert_eq!(reason, "503 maintenance")
                }
                other => panic!("unexpected error: {}", other),
            }
        }

        /// Deposits a then b under the root without a transaction
        fn deposit_two(server: &MockServer) -> (LdpSession, String, String) {
            let a = server.url("/rest/a");
            let b = server.url("/rest/b");
            server.mock(|when, then| {
                when.method("POST").path("/rest").header("Slug", "a");
                then.status(201).header("Location", a.as_str());
            });
            server.mock(|when, then| {
                when.method("POST").path("/rest").header("Slug", "b");
                then.status(201).header("Location", b.as_str());
            });

            let mut session = open_session(server, false);
            let root = server.url("/rest");
            session
                .deposit(&ResourceNode::container("urn:pkg:a", Graph::new(), vec![]), &root)
                .unwrap();
            session
                .deposit(&ResourceNode::rdf_source("urn:pkg:b", Graph::new()), &root)
                .unwrap();
            (session, a, b)
        }

        #[test]
        fn test_rollback_without_transaction_deletes_created() {
            let server = MockServer::start();
            let delete_a = server.mock(|when, then| {
                when.method("DELETE").path("/rest/a");
                then.status(204);
            });
            let delete_b = server.mock(|when, then| {
                when.method("DELETE").path("/rest/b");
                then.status(204);
            });

            let (mut session, _, _) = deposit_two(&server);
            session.rollback().unwrap();

            delete_a.assert();
            delete_b.assert();
            assert_eq!(session.state(), SessionState::RolledBack);
        }

        #[test]
        fn test_rollback_deletes_in_reverse_creation_order() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method("DELETE");
                then.status(500).body("locked");
            });

            let (mut session, a, b) = deposit_two(&server);
            let err = session.rollback().unwrap_err();

            // Failures are listed in the order the deletes were attempted
            match err {
                DepositError::DepositFailure { reason, .. } => {
                    assert!(reason.ends_with(&format!("{}, {}", b, a)), "{}", reason)
                }
                other => panic!("unexpected error: {}", other),
            }
            // Finished either way
            assert_eq!(session.state(), SessionState::RolledBack);
        }
    }
}
