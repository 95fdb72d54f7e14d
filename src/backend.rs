use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of passages the backend retrieves per query.
const TOP_K: u32 = 5;

/// Shown when the backend answers 2xx but the `response` field is missing or empty.
pub const EMPTY_RESPONSE_FALLBACK: &str = "Sorry, I couldn't process your request.";

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    top_k: u32,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    response: String,
}

/// Failure categories for a backend query, in classification priority order:
/// a failure that could match several categories surfaces as the first one.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("connection to the backend failed")]
    Connect,
    #[error("query endpoint not found (HTTP 404)")]
    NotFound,
    #[error("backend reported an internal error (HTTP 500)")]
    Server,
    #[error("network error during the request")]
    Network,
    #[error("request could not be sent")]
    Unreachable,
    #[error("{0}")]
    Other(String),
}

impl QueryError {
    fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => QueryError::NotFound,
            StatusCode::INTERNAL_SERVER_ERROR => QueryError::Server,
            _ => QueryError::Other(format!("unexpected HTTP status {status}")),
        }
    }

    /// The assistant-voiced reply shown in the transcript for this failure.
    /// Same category, same text, regardless of the underlying detail.
    pub fn user_message(&self, base_url: &str) -> String {
        match self {
            QueryError::Connect => format!(
                "Unable to connect to the backend API. Please make sure the server is running at {base_url}"
            ),
            QueryError::NotFound => {
                "The query endpoint was not found. Please check if the backend is running correctly."
                    .to_string()
            }
            QueryError::Server => {
                "The server encountered an error. This could be due to missing content in the \
                 knowledge base or API configuration issues. Check that you have populated the \
                 vector database with content."
                    .to_string()
            }
            QueryError::Network => {
                "Network error occurred. Please check your connection and try again.".to_string()
            }
            QueryError::Unreachable => format!(
                "Cannot reach the backend server. Please ensure the API server is running at {base_url}"
            ),
            QueryError::Other(_) => {
                "Sorry, I'm having trouble connecting to the knowledge base. Please try again."
                    .to_string()
            }
        }
    }
}

/// HTTP client for the retrieval backend. The base URL is injected once at
/// construction and read-only afterwards.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the query to `{base_url}/query` and return the answer text.
    /// An empty string means the backend replied without an answer.
    pub async fn query(&self, query: &str) -> Result<String, QueryError> {
        let url = format!("{}/query", self.base_url);
        let request = QueryRequest { query, top_k: TOP_K };

        tracing::debug!(%url, "sending query to backend");
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        tracing::debug!(%status, "backend responded");
        if !status.is_success() {
            return Err(QueryError::from_status(status));
        }

        let body: QueryResponse = response.json().await.map_err(classify_body_error)?;
        Ok(body.response)
    }
}

/// Classify a failure to send the request or receive the response headers.
/// Checked in priority order; the first matching category wins.
fn classify_send_error(err: reqwest::Error) -> QueryError {
    tracing::warn!("query request failed: {err}");
    if err.is_connect() {
        QueryError::Connect
    } else if err.is_timeout() {
        QueryError::Network
    } else if err.is_request() {
        QueryError::Unreachable
    } else {
        QueryError::Other(err.to_string())
    }
}

/// Classify a failure while reading or decoding the response body.
fn classify_body_error(err: reqwest::Error) -> QueryError {
    tracing::warn!("failed to read backend response: {err}");
    if err.is_timeout() || err.is_body() {
        QueryError::Network
    } else {
        QueryError::Other(err.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{canned_backend, read_http_request};
    use super::*;
    use tokio::net::TcpListener;

    fn client(base_url: &str) -> BackendClient {
        BackendClient::new(base_url, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_query_returns_response_text() {
        let (url, mut requests) =
            canned_backend("200 OK", r#"{"response": "Topics carry typed messages."}"#).await;
        let answer = client(&url).query("what is a topic").await.unwrap();
        assert_eq!(answer, "Topics carry typed messages.");

        let raw = requests.recv().await.unwrap();
        assert!(raw.starts_with("POST /query "));
        assert!(raw.contains(r#""query":"what is a topic""#));
        assert!(raw.contains(r#""top_k":5"#));
    }

    #[tokio::test]
    async fn test_missing_response_field_yields_empty_answer() {
        let (url, _requests) = canned_backend("200 OK", "{}").await;
        let answer = client(&url).query("anything").await.unwrap();
        assert_eq!(answer, "");
    }

    #[tokio::test]
    async fn test_http_404_maps_to_not_found() {
        let (url, _requests) = canned_backend("404 Not Found", "{}").await;
        let err = client(&url).query("q").await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound));
    }

    #[tokio::test]
    async fn test_http_500_maps_to_server() {
        let (url, _requests) = canned_backend("500 Internal Server Error", "{}").await;
        let err = client(&url).query("q").await.unwrap_err();
        assert!(matches!(err, QueryError::Server));
    }

    #[tokio::test]
    async fn test_other_http_statuses_map_to_other() {
        let (url, _requests) = canned_backend("502 Bad Gateway", "{}").await;
        let err = client(&url).query("q").await.unwrap_err();
        assert!(matches!(err, QueryError::Other(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_other() {
        let (url, _requests) = canned_backend("200 OK", "this is not json").await;
        let err = client(&url).query("q").await.unwrap_err();
        assert!(matches!(err, QueryError::Other(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_connect() {
        // Bind then drop to get a local port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}")).query("q").await.unwrap_err();
        assert!(matches!(err, QueryError::Connect));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_network() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let _request = read_http_request(&mut socket).await;
            // Hold the connection open without ever answering.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let slow = BackendClient::new(&format!("http://{addr}"), Duration::from_millis(200));
        let err = slow.query("q").await.unwrap_err();
        assert!(matches!(err, QueryError::Network));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            QueryError::from_status(StatusCode::NOT_FOUND),
            QueryError::NotFound
        ));
        assert!(matches!(
            QueryError::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            QueryError::Server
        ));
        assert!(matches!(
            QueryError::from_status(StatusCode::IM_A_TEAPOT),
            QueryError::Other(_)
        ));
    }

    #[test]
    fn test_user_messages_name_the_endpoint() {
        let base = "http://localhost:8000";
        assert_eq!(
            QueryError::Connect.user_message(base),
            "Unable to connect to the backend API. Please make sure the server is running at http://localhost:8000"
        );
        assert_eq!(
            QueryError::Unreachable.user_message(base),
            "Cannot reach the backend server. Please ensure the API server is running at http://localhost:8000"
        );
        assert!(QueryError::NotFound
            .user_message(base)
            .contains("query endpoint was not found"));
        assert!(QueryError::Server.user_message(base).contains("knowledge base"));
        assert!(QueryError::Network
            .user_message(base)
            .contains("Network error occurred"));
    }

    #[test]
    fn test_user_message_ignores_error_detail() {
        let a = QueryError::Other("first detail".to_string()).user_message("http://x");
        let b = QueryError::Other("second detail".to_string()).user_message("http://x");
        assert_eq!(a, b);
        assert_eq!(
            a,
            "Sorry, I'm having trouble connecting to the knowledge base. Please try again."
        );
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = BackendClient::new("http://localhost:8000/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
