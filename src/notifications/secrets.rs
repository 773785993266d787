//! Secret lookup with an in-process TTL cache.
//!
//! Resolution order for a named secret: process environment, then the
//! cache, then the backing [`SecretStore`] (whose answer is cached).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default time a fetched secret stays cached.
pub const DEFAULT_SECRET_TTL: Duration = Duration::from_secs(3600);

/// Environment variables consulted for the GCP project id, in order.
const PROJECT_ENV_VARS: &[&str] = &["GCLOUD_PROJECT", "GCP_PROJECT", "GOOGLE_CLOUD_PROJECT"];

/// Errors from secret resolution.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret store configured for '{0}'")]
    NotConfigured(String),
    #[error(
        "Could not determine GCP project ID from environment variables (GCLOUD_PROJECT, GCP_PROJECT, GOOGLE_CLOUD_PROJECT)"
    )]
    MissingProject,
    #[error("Failed to retrieve secret {name}: {reason}")]
    Fetch { name: String, reason: String },
    #[error("Secret {0} is not valid UTF-8 / base64")]
    Decode(String),
}

/// Backing source of secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError>;
}

/// Store used when no secret backend is configured.
#[derive(Debug, Clone, Default)]
pub struct NoSecretStore;

#[async_trait]
impl SecretStore for NoSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError> {
        Err(SecretError::NotConfigured(name.to_string()))
    }
}

#[derive(Debug, Clone)]
struct CachedSecret {
    value: String,
    expires_at: Instant,
}

/// Key → value cache with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct SecretCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CachedSecret>>>,
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET_TTL)
    }
}

impl SecretCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, name: &str) -> Option<String> {
        self.get_at(name, Instant::now()).await
    }

    /// Cached value if it has not expired at `now`.
    pub async fn get_at(&self, name: &str, now: Instant) -> Option<String> {
        self.entries
            .read()
            .await
            .get(name)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, name: &str, value: String) {
        self.insert_at(name, value, Instant::now()).await
    }

    /// Cache `value`, expiring one TTL after `now`.
    pub async fn insert_at(&self, name: &str, value: String, now: Instant) {
        self.entries.write().await.insert(
            name.to_string(),
            CachedSecret {
                value,
                expires_at: now + self.ttl,
            },
        );
    }
}

/// Resolves named secrets from env, cache, then store.
#[derive(Clone)]
pub struct SecretResolver {
    cache: SecretCache,
    store: Arc<dyn SecretStore>,
}

impl SecretResolver {
    pub fn new(cache: SecretCache, store: Arc<dyn SecretStore>) -> Self {
        Self { cache, store }
    }

    /// Resolver that only consults the environment.
    pub fn env_only() -> Self {
        Self::new(SecretCache::default(), Arc::new(NoSecretStore))
    }

    pub async fn resolve(&self, name: &str) -> Result<String, SecretError> {
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                return Ok(value);
            }
        }

        if let Some(value) = self.cache.get(name).await {
            debug!("Secret {} served from cache", name);
            return Ok(value);
        }

        let value = self.store.fetch_secret(name).await?;
        self.cache.insert(name, value.clone()).await;
        Ok(value)
    }
}

/// Google Cloud Secret Manager over its REST API.
///
/// The access token comes from `GOOGLE_OAUTH_ACCESS_TOKEN` when set,
/// otherwise from the instance metadata server.
pub struct GcpSecretManagerStore {
    client: reqwest::Client,
    api_base: String,
    metadata_base: String,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: AccessPayload,
}

#[derive(Deserialize)]
struct AccessPayload {
    data: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GcpSecretManagerStore {
    pub fn new(timeout: Duration) -> Result<Self, SecretError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SecretError::Fetch {
                name: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_base: "https://secretmanager.googleapis.com/v1".to_string(),
            metadata_base: "http://metadata.google.internal".to_string(),
        })
    }

    /// Point the store at different endpoints (used by tests).
    pub fn with_endpoints(mut self, api_base: &str, metadata_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.metadata_base = metadata_base.trim_end_matches('/').to_string();
        self
    }

    /// Project id from the first set environment variable.
    pub fn project_id() -> Result<String, SecretError> {
        PROJECT_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .ok_or(SecretError::MissingProject)
    }

    async fn access_token(&self, name: &str) -> Result<String, SecretError> {
        if let Some(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            return Ok(token);
        }

        let fetch_err = |reason: String| SecretError::Fetch {
            name: name.to_string(),
            reason,
        };
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.metadata_base
        );
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
            .error_for_status()
            .map_err(|e| fetch_err(e.to_string()))?;
        let token: TokenResponse = response.json().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn access_secret(&self, project: &str, name: &str) -> Result<String, SecretError> {
        let fetch_err = |reason: String| SecretError::Fetch {
            name: name.to_string(),
            reason,
        };
        let token = self.access_token(name).await?;
        let url = format!(
            "{}/projects/{}/secrets/{}/versions/latest:access",
            self.api_base, project, name
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
            .error_for_status()
            .map_err(|e| fetch_err(e.to_string()))?;
        let body: AccessResponse = response.json().await.map_err(|e| fetch_err(e.to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body.payload.data.as_bytes())
            .map_err(|_| SecretError::Decode(name.to_string()))?;
        String::from_utf8(bytes).map_err(|_| SecretError::Decode(name.to_string()))
    }
}

#[async_trait]
impl SecretStore for GcpSecretManagerStore {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError> {
        let project = Self::project_id()?;
        let value = self.access_secret(&project, name).await?;
        info!("Retrieved secret {} from Google Cloud Secret Manager", name);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        async fn fetch_secret(&self, name: &str) -> Result<String, SecretError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}-v{}", name, n))
        }
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = SecretCache::new(Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at("TOKEN", "abc".to_string(), start).await;

        assert_eq!(
            cache.get_at("TOKEN", start + Duration::from_secs(59)).await.as_deref(),
            Some("abc")
        );
        assert_eq!(cache.get_at("TOKEN", start + Duration::from_secs(60)).await, None);
        assert_eq!(cache.get_at("OTHER", start).await, None);
    }

    #[tokio::test]
    async fn test_resolver_caches_store_result() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let resolver = SecretResolver::new(SecretCache::default(), store.clone());

        let name = "ROTOM_TEST_SECRET_NOT_IN_ENV";
        assert_eq!(resolver.resolve(name).await.unwrap(), format!("{}-v0", name));
        assert_eq!(resolver.resolve(name).await.unwrap(), format!("{}-v0", name));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_env_token_falls_back_to_metadata_server() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let metadata = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/computeMetadata/v1/instance/service-accounts/default/token",
            ))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "from-metadata" })),
            )
            .expect(1)
            .mount(&metadata)
            .await;

        std::env::set_var("GOOGLE_OAUTH_ACCESS_TOKEN", "");
        let store = GcpSecretManagerStore::new(Duration::from_secs(5))
            .unwrap()
            .with_endpoints("http://127.0.0.1:9", &metadata.uri());
        let token = store.access_token("TELEGRAM_BOT_TOKEN").await.unwrap();
        std::env::remove_var("GOOGLE_OAUTH_ACCESS_TOKEN");

        assert_eq!(token, "from-metadata");
    }

    #[tokio::test]
    async fn test_env_only_resolver_fails_without_env() {
        let err = SecretResolver::env_only()
            .resolve("ROTOM_TEST_SECRET_ABSENT")
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::NotConfigured(_)));
    }
}
