//! GraphQL subgraph client.

use std::sync::Arc;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{retry, HttpTransport, RetryPolicy, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubgraphError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode subgraph request: {0}")]
    Encode(String),
    #[error("failed to decode subgraph response: {0}")]
    Decode(String),
    #[error("subgraph returned errors: {0}")]
    GraphQl(String),
    #[error("subgraph response has no data")]
    MissingData,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: &'a V,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<R> {
    data: Option<R>,
    #[serde(default)]
    errors: Option<Vec<GraphQlErrorEntry>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Clone)]
pub struct SubgraphClient {
    endpoint: String,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl SubgraphClient {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            retry,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn query<V, R>(
        &self,
        operation: &str,
        query: &str,
        variables: &V,
    ) -> Result<R, SubgraphError>
    where
        V: Serialize,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(&GraphQlRequest { query, variables })
            .map_err(|err| SubgraphError::Encode(err.to_string()))?;

        debug!(
            component = "subgraph",
            event = "subgraph.query.start",
            operation,
            endpoint = %self.endpoint,
            body_bytes = body.len()
        );

        let payload = retry(self.retry, || {
            self.transport.post_json(&self.endpoint, body.clone())
        })?;

        decode_response(&payload).inspect_err(|err| {
            warn!(
                component = "subgraph",
                event = "subgraph.query.error",
                operation,
                error = %err
            );
        })
    }
}

fn decode_response<R: DeserializeOwned>(payload: &[u8]) -> Result<R, SubgraphError> {
    let response: GraphQlResponse<R> =
        serde_json::from_slice(payload).map_err(|err| SubgraphError::Decode(err.to_string()))?;

    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        let joined = errors
            .into_iter()
            .map(|entry| entry.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SubgraphError::GraphQl(joined));
    }

    response.data.ok_or(SubgraphError::MissingData)
}

/// Subgraph `BigInt`/`BigDecimal` values come back as strings, but fixtures and some
/// indexers emit plain JSON numbers. Either way the verbatim text is kept.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    match Raw::deserialize(deserializer) {
        Ok(Raw::Text(text)) => Ok(text),
        Ok(Raw::Number(number)) => Ok(number.to_string()),
        Err(_) => Err(de::Error::custom("expected a string or number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        #[serde(deserialize_with = "string_or_number")]
        value: String,
    }

    struct CannedTransport {
        body: Vec<u8>,
        seen: Mutex<Vec<String>>,
    }

    impl HttpTransport for CannedTransport {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::Request {
                url: url.to_string(),
                message: "GET not expected".to_string(),
            })
        }

        fn post_json(&self, _url: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
            self.seen
                .lock()
                .unwrap()
                .push(String::from_utf8(body).unwrap());
            Ok(self.body.clone())
        }
    }

    fn client(body: &str) -> (SubgraphClient, Arc<CannedTransport>) {
        let transport = Arc::new(CannedTransport {
            body: body.as_bytes().to_vec(),
            seen: Mutex::new(Vec::new()),
        });
        let client = SubgraphClient::new(
            "https://example.test/subgraph",
            transport.clone(),
            RetryPolicy::default(),
        );
        (client, transport)
    }

    #[test]
    fn accepts_strings_and_numbers() {
        let a: Sample = serde_json::from_str(r#"{"value":"123"}"#).unwrap();
        let b: Sample = serde_json::from_str(r#"{"value":123}"#).unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<Sample>(r#"{"value":true}"#).is_err());
    }

    #[test]
    fn request_body_carries_query_and_variables() {
        let (client, transport) = client(r#"{"data":{"ok":true}}"#);
        let data: serde_json::Value = client
            .query("sample", "query Sample($n: Int!) { ok }", &serde_json::json!({"n": 5}))
            .unwrap();

        assert_eq!(data["ok"], true);
        let sent: serde_json::Value =
            serde_json::from_str(&transport.seen.lock().unwrap()[0]).unwrap();
        assert_eq!(sent["variables"]["n"], 5);
        assert!(sent["query"].as_str().unwrap().contains("query Sample"));
    }

    #[test]
    fn graphql_errors_are_surfaced_verbatim() {
        let (client, _) = client(
            r#"{"data":null,"errors":[{"message":"bad field"},{"message":"second"}]}"#,
        );
        let err = client
            .query::<_, serde_json::Value>("sample", "{ ok }", &serde_json::json!({}))
            .unwrap_err();

        assert_eq!(err, SubgraphError::GraphQl("bad field; second".to_string()));
        assert_eq!(err.to_string(), "subgraph returned errors: bad field; second");
    }

    #[test]
    fn missing_data_and_garbage_are_errors() {
        let (missing, _) = client(r#"{"data":null}"#);
        let err = missing
            .query::<_, serde_json::Value>("lobby", "{ ok }", &serde_json::json!({}))
            .unwrap_err();
        assert_eq!(err, SubgraphError::MissingData);

        let (garbage, _) = client("<html>");
        let err = garbage
            .query::<_, serde_json::Value>("sample", "{ ok }", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, SubgraphError::Decode(_)));
    }
}
