use crate::config::GraphConfig;
use crate::error::UpstreamError;
use crate::services::{check_status, http_client, require};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use std::time::Duration;

const SERVICE: &str = "graph database";

pub type Row = Map<String, Value>;

/// Runs one parameterized query and returns its rows as `column -> value` maps.
pub trait GraphStore: Send + Sync {
    fn run(&self, query: &str, params: Map<String, Value>) -> Result<Vec<Row>, UpstreamError>;
}

/// Neo4j over the HTTP transactional endpoint (`/db/{database}/tx/commit`).
pub struct Neo4jHttp {
    config: GraphConfig,
}

impl Neo4jHttp {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }
}

/// Bolt-style URIs are mapped onto the HTTP port of the same host.
fn http_base(uri: &str) -> String {
    let (scheme, rest) = uri.split_once("://").unwrap_or(("http", uri));
    let secure = matches!(scheme, "https" | "neo4j+s" | "bolt+s" | "neo4j+ssc" | "bolt+ssc");
    let bolt = scheme.starts_with("bolt") || scheme.starts_with("neo4j");
    let host = rest.split('/').next().unwrap_or(rest);
    let host = if bolt {
        match host.rsplit_once(':') {
            Some((h, _)) => format!("{h}:{}", if secure { 7473 } else { 7474 }),
            None if secure => host.to_string(),
            None => format!("{host}:7474"),
        }
    } else {
        host.to_string()
    };
    format!("{}://{}", if secure { "https" } else { "http" }, host)
}

/// `{"results": [{"columns": [..], "data": [{"row": [..]}]}], "errors": [..]}` -> rows.
fn parse_rows(body: &Value) -> Result<Vec<Row>, UpstreamError> {
    if let Some(error) = body
        .get("errors")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
    {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("query failed");
        return Err(UpstreamError::Failed {
            service: SERVICE,
            message: message.to_string(),
        });
    }
    let Some(result) = body
        .get("results")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
    else {
        return Ok(Vec::new());
    };
    let columns: Vec<&str> = result
        .get("columns")
        .and_then(|c| c.as_array())
        .map(|c| c.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let empty = Vec::new();
    let data = result.get("data").and_then(|d| d.as_array()).unwrap_or(&empty);
    Ok(data
        .iter()
        .filter_map(|entry| entry.get("row").and_then(|r| r.as_array()))
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(col, value)| (col.to_string(), value.clone()))
                .collect()
        })
        .collect())
}

impl GraphStore for Neo4jHttp {
    fn run(&self, query: &str, params: Map<String, Value>) -> Result<Vec<Row>, UpstreamError> {
        let uri = require(SERVICE, "NEO4J_URI", &self.config.uri)?;
        let user = require(SERVICE, "NEO4J_USERNAME", &self.config.username)?;
        let password = require(SERVICE, "NEO4J_PASSWORD", &self.config.password)?;
        let url = format!("{}/db/{}/tx/commit", http_base(uri), self.config.database);
        let client = http_client(SERVICE, Duration::from_secs(30))?;
        let response = client
            .post(&url)
            .basic_auth(user, Some(password))
            .json(&json!({ "statements": [{ "statement": query, "parameters": params }] }))
            .send()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        let body: Value = check_status(SERVICE, response)?
            .json()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        parse_rows(&body)
    }
}

// ---- query construction ----

fn identifier_pattern() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"))
}

/// Labels and relationship types are spliced into query text, so only plain identifiers
/// are accepted.
pub fn is_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

pub fn create_entity_query(label: &str) -> String {
    format!("CREATE (e:{label} $properties) RETURN e")
}

pub fn list_entities_query(label: &str) -> String {
    format!("MATCH (e:{label}) RETURN e")
}

pub fn create_relationship_query(from: &str, to: &str, relationship: &str) -> String {
    format!(
        "MATCH (from:{from} {{id: $from_id}}), (to:{to} {{id: $to_id}}) \
         CREATE (from)-[r:{relationship} $properties]->(to) RETURN r"
    )
}

pub const SCHEMA_QUERY: &str = "CALL db.schema.visualization()";
pub const PROBE_QUERY: &str = "RETURN 1 AS ok";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("Company", true)]
    #[case("_private2", true)]
    #[case("HAS_SUPPLIER", true)]
    #[case("2Fast", false)]
    #[case("Company) DETACH DELETE (n", false)]
    #[case("", false)]
    #[case("Kunde-A", false)]
    fn identifiers(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(is_identifier(name), ok);
    }

    #[rstest]
    #[case("bolt://localhost:7687", "http://localhost:7474")]
    #[case("neo4j+s://abc.databases.neo4j.io", "https://abc.databases.neo4j.io")]
    #[case("http://graph:7474/", "http://graph:7474")]
    #[case("graph.internal:7474", "http://graph.internal:7474")]
    fn http_bases(#[case] uri: &str, #[case] expected: &str) {
        assert_eq!(http_base(uri), expected);
    }

    #[test]
    fn rows_are_keyed_by_column() {
        let body = json!({
            "results": [{"columns": ["e", "n"], "data": [
                {"row": [{"name": "Acme"}, 1]},
                {"row": [{"name": "Globex"}, 2]}
            ]}],
            "errors": []
        });
        let rows = parse_rows(&body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["e"]["name"], "Globex");
        assert_eq!(rows[0]["n"], 1);
    }

    #[test]
    fn errors_win_over_results() {
        let body = json!({"results": [], "errors": [{"code": "X", "message": "syntax error"}]});
        assert!(matches!(
            parse_rows(&body),
            Err(UpstreamError::Failed { message, .. }) if message == "syntax error"
        ));
    }

    #[test]
    fn relationship_query_shape() {
        assert_eq!(
            create_relationship_query("Company", "Vendor", "BUYS_FROM"),
            "MATCH (from:Company {id: $from_id}), (to:Vendor {id: $to_id}) \
             CREATE (from)-[r:BUYS_FROM $properties]->(to) RETURN r"
        );
    }
}
