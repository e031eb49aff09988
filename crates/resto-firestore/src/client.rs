//! Firestore REST API client.
//!
//! - Service-account tokens through a refresh-ahead cache, or the local
//!   emulator when `FIRESTORE_EMULATOR_HOST` is set
//! - One transparent re-authentication on an expired token
//! - Tracing spans and request metrics on every call
//!
//! Every call is a single attempt. Retry policy belongs to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::token_cache::TokenCache;
use crate::types::{Document, Value};

/// Where and how to reach Firestore.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Usually "(default)"
    pub database_id: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// `host:port` of a Firestore emulator; disables service-account auth
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Read `GCP_PROJECT_ID` (or `FIREBASE_PROJECT_ID`), `FIRESTORE_DATABASE_ID`,
    /// `FIRESTORE_CONNECT_TIMEOUT_SECS` and `FIRESTORE_EMULATOR_HOST`.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = ["GCP_PROJECT_ID", "FIREBASE_PROJECT_ID"]
            .iter()
            .find_map(|key| non_empty_var(key))
            .ok_or_else(|| FirestoreError::auth_error("no Firestore project: set GCP_PROJECT_ID"))?;

        let connect_secs = non_empty_var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: non_empty_var("FIRESTORE_DATABASE_ID").unwrap_or_else(|| "(default)".into()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_secs),
            emulator_host: non_empty_var("FIRESTORE_EMULATOR_HOST"),
        })
    }

    /// Configuration for an emulator (or test server) at `host`.
    pub fn emulator(project_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            emulator_host: Some(host.into()),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
enum Auth {
    ServiceAccount(Arc<TokenCache>),
    /// The emulator accepts any bearer token
    Emulator,
}

/// Firestore REST API client. Cheap to clone.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: Auth,
}

impl FirestoreClient {
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("resto-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let (auth, origin) = match &config.emulator_host {
            Some(host) => (Auth::Emulator, format!("http://{}", host)),
            None => (
                Auth::ServiceAccount(Arc::new(TokenCache::new(Self::service_account()?))),
                "https://firestore.googleapis.com".to_string(),
            ),
        };

        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            origin, config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            auth,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn service_account() -> FirestoreResult<Arc<dyn TokenProvider>> {
        CustomServiceAccount::from_env()
            .map_err(|e| FirestoreError::auth_error(format!("service account unreadable: {}", e)))?
            .map(|sa| Arc::new(sa) as Arc<dyn TokenProvider>)
            .ok_or_else(|| {
                FirestoreError::auth_error("GOOGLE_APPLICATION_CREDENTIALS must point to a service account key")
            })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        )
    }

    async fn bearer(&self) -> FirestoreResult<String> {
        match &self.auth {
            Auth::ServiceAccount(cache) => cache.get_token().await,
            Auth::Emulator => Ok("owner".to_string()),
        }
    }

    /// Send a request, re-authenticating once if the token has expired.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.bearer().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match &self.auth {
            Auth::ServiceAccount(cache) if is_access_token_expired(&body) => {
                cache.invalidate().await;
                let token = cache.get_token().await?;
                Ok(build(&token).send().await?)
            }
            _ => Err(FirestoreError::from_http_status(401, body)),
        }
    }

    // =========================================================================
    // Document operations
    // =========================================================================

    /// Fetch a document; `None` if it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);

        self.execute_request("get_document", collection, doc_id, async {
            let response = self.send(|token| self.http.get(&url).bearer_auth(token)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document; fails with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        self.execute_request("create_document", collection, doc_id, async {
            let response = self
                .send(|token| self.http.post(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Write a document, creating it if missing.
    ///
    /// Without a mask the document is replaced. With a mask only the
    /// listed fields are written and the rest are kept (merge).
    pub async fn set_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
    ) -> FirestoreResult<Document> {
        let mut url = self.document_url(collection, doc_id);
        if let Some(mask) = update_mask {
            let params: Vec<String> = mask
                .iter()
                .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
                .collect();
            url = format!("{}?{}", url, params.join("&"));
        }
        let body = Document::new(fields);

        self.execute_request("set_document", collection, doc_id, async {
            let response = self
                .send(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                status => Err(error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a request future under a span and record its outcome.
    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: &str,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection,
            doc_id = %doc_id
        );

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }
}

fn is_access_token_expired(body: &str) -> bool {
    body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
}

async fn error_from_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let hint_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        if let Some(ms) = hint_ms {
            return FirestoreError::RateLimited(ms);
        }
    }
    let body = response.text().await.unwrap_or_default();
    FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_requires_a_project() {
        std::env::remove_var("FIREBASE_PROJECT_ID");
        std::env::set_var("GCP_PROJECT_ID", "  ");
        assert!(FirestoreConfig::from_env().is_err());
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults_and_emulator() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.database_id, "(default)");
        assert_eq!(config.emulator_host.as_deref(), Some("localhost:8080"));
        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    fn test_access_token_expired_detection() {
        assert!(is_access_token_expired(r#"{"error":{"status":"UNAUTHENTICATED"}}"#));
        assert!(!is_access_token_expired("permission denied"));
    }
}
