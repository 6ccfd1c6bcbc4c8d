//! OAuth token lifecycle for the external services.
//!
//! One credential row per service, owned by [`TokenManager`]. Access tokens
//! are refreshed through the shared refresh token before they expire; a
//! per-service mutex keeps concurrent callers from issuing duplicate refresh
//! requests.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

use kirana_core::config::OauthServiceConfig;
use kirana_core::domain::sync::{Credential, TargetService};
use kirana_db::repositories::CredentialRepository;

use crate::error::AdapterError;

/// Tokens expiring within this window are refreshed eagerly so an in-flight
/// API call never races the expiry.
const EXPIRY_WINDOW_SECS: i64 = 300;

#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3_600
}

/// Remote side of the OAuth dance. Faked in tests.
#[async_trait::async_trait]
pub trait AuthorizationServer: Send + Sync {
    async fn exchange_code(
        &self,
        service: TargetService,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AdapterError>;

    async fn refresh(
        &self,
        service: TargetService,
        refresh_token: &str,
    ) -> Result<TokenResponse, AdapterError>;
}

pub struct HttpAuthorizationServer {
    client: reqwest::Client,
    crm: OauthServiceConfig,
    accounting: OauthServiceConfig,
}

impl HttpAuthorizationServer {
    pub fn new(
        client: reqwest::Client,
        crm: OauthServiceConfig,
        accounting: OauthServiceConfig,
    ) -> Self {
        Self { client, crm, accounting }
    }

    fn service_config(&self, service: TargetService) -> &OauthServiceConfig {
        match service {
            TargetService::Crm => &self.crm,
            TargetService::Accounting => &self.accounting,
        }
    }

    fn client_credentials(
        &self,
        service: TargetService,
    ) -> Result<(&str, &str), AdapterError> {
        let config = self.service_config(service);
        match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => Ok((id.as_str(), secret.expose_secret())),
            _ => Err(AdapterError::AuthUnavailable(service)),
        }
    }

    async fn token_request(
        &self,
        service: TargetService,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, AdapterError> {
        let config = self.service_config(service);
        let response = self.client.post(&config.token_url).form(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api { service, status: status.as_u16(), message });
        }

        let token = response.json::<TokenResponse>().await?;
        Ok(token)
    }
}

#[async_trait::async_trait]
impl AuthorizationServer for HttpAuthorizationServer {
    async fn exchange_code(
        &self,
        service: TargetService,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AdapterError> {
        let (client_id, client_secret) = self.client_credentials(service)?;
        self.token_request(
            service,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    async fn refresh(
        &self,
        service: TargetService,
        refresh_token: &str,
    ) -> Result<TokenResponse, AdapterError> {
        let (client_id, client_secret) = self.client_credentials(service)?;
        self.token_request(
            service,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
        )
        .await
    }
}

pub struct TokenManager {
    repository: Arc<dyn CredentialRepository>,
    server: Arc<dyn AuthorizationServer>,
    crm: OauthServiceConfig,
    accounting: OauthServiceConfig,
    crm_refresh: Mutex<()>,
    accounting_refresh: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        server: Arc<dyn AuthorizationServer>,
        crm: OauthServiceConfig,
        accounting: OauthServiceConfig,
    ) -> Self {
        Self {
            repository,
            server,
            crm,
            accounting,
            crm_refresh: Mutex::new(()),
            accounting_refresh: Mutex::new(()),
        }
    }

    pub fn service_config(&self, service: TargetService) -> &OauthServiceConfig {
        match service {
            TargetService::Crm => &self.crm,
            TargetService::Accounting => &self.accounting,
        }
    }

    /// Authorization URL to send an operator to for the consent step.
    pub fn authorize_url(
        &self,
        service: TargetService,
        state_token: &str,
    ) -> Result<String, AdapterError> {
        let config = self.service_config(service);
        let client_id =
            config.client_id.as_deref().ok_or(AdapterError::AuthUnavailable(service))?;
        let redirect_uri =
            config.redirect_uri.as_deref().ok_or(AdapterError::AuthUnavailable(service))?;

        Ok(format!(
            "{authorize}?response_type=code&access_type=offline&client_id={client_id}&scope={scope}&redirect_uri={redirect_uri}&state={state}",
            authorize = config.authorize_url,
            scope = encode_query(&config.scope),
            redirect_uri = encode_query(redirect_uri),
            state = encode_query(state_token),
        ))
    }

    /// Trades an authorization code for tokens and persists the credential.
    pub async fn complete_authorization(
        &self,
        service: TargetService,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, AdapterError> {
        let token = self.server.exchange_code(service, code, redirect_uri).await?;
        let credential = self.store_token(service, token, None).await?;
        info!(event_name = "oauth.connected", service = %service, "service connected");
        Ok(credential)
    }

    /// Access token guaranteed valid for at least the expiry window. Expired
    /// or near-expiry credentials are refreshed in-place, single-flight.
    pub async fn get_valid_token(&self, service: TargetService) -> Result<String, AdapterError> {
        let credential = self
            .repository
            .find(service)
            .await?
            .ok_or(AdapterError::AuthUnavailable(service))?;

        if fresh_enough(&credential, Utc::now()) {
            return Ok(credential.access_token);
        }

        let _guard = match service {
            TargetService::Crm => self.crm_refresh.lock().await,
            TargetService::Accounting => self.accounting_refresh.lock().await,
        };

        // Another caller may have refreshed while this one waited for the lock.
        let credential = self
            .repository
            .find(service)
            .await?
            .ok_or(AdapterError::AuthUnavailable(service))?;
        if fresh_enough(&credential, Utc::now()) {
            return Ok(credential.access_token);
        }

        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or(AdapterError::AuthUnavailable(service))?;
        let token = self.server.refresh(service, &refresh_token).await?;
        let stored = self.store_token(service, token, Some(refresh_token)).await?;
        info!(event_name = "oauth.token_refreshed", service = %service, "access token refreshed");
        Ok(stored.access_token)
    }

    /// Forgets the stored credential; subsequent API calls fail until the
    /// OAuth flow is completed again.
    pub async fn disconnect(&self, service: TargetService) -> Result<(), AdapterError> {
        self.repository.delete(service).await?;
        info!(event_name = "oauth.disconnected", service = %service, "service disconnected");
        Ok(())
    }

    async fn store_token(
        &self,
        service: TargetService,
        token: TokenResponse,
        previous_refresh_token: Option<String>,
    ) -> Result<Credential, AdapterError> {
        let now = Utc::now();
        let credential = Credential {
            service,
            access_token: token.access_token,
            // Refresh responses usually omit the refresh token; keep the one
            // already on file.
            refresh_token: token.refresh_token.or(previous_refresh_token),
            expires_at: now + Duration::seconds(token.expires_in),
            scope: token.scope,
            updated_at: now,
        };
        self.repository.upsert(credential.clone()).await?;
        Ok(credential)
    }
}

fn fresh_enough(credential: &Credential, now: DateTime<Utc>) -> bool {
    credential.expires_at > now + Duration::seconds(EXPIRY_WINDOW_SECS)
}

pub(crate) fn encode_query(value: &str) -> String {
    value.replace('+', "%2B").replace(' ', "%20").replace('/', "%2F").replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use kirana_core::config::OauthServiceConfig;
    use kirana_core::domain::sync::{Credential, TargetService};
    use kirana_db::repositories::{CredentialRepository, InMemoryCredentialRepository};

    use super::{AuthorizationServer, TokenManager, TokenResponse};
    use crate::error::AdapterError;

    struct FakeAuthorizationServer {
        refresh_calls: AtomicUsize,
    }

    impl FakeAuthorizationServer {
        fn new() -> Self {
            Self { refresh_calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait::async_trait]
    impl AuthorizationServer for FakeAuthorizationServer {
        async fn exchange_code(
            &self,
            _service: TargetService,
            code: &str,
            _redirect_uri: &str,
        ) -> Result<TokenResponse, AdapterError> {
            Ok(TokenResponse {
                access_token: format!("access-for-{code}"),
                refresh_token: Some("refresh-1".to_string()),
                expires_in: 3_600,
                scope: Some("ZohoCRM.modules.ALL".to_string()),
            })
        }

        async fn refresh(
            &self,
            _service: TargetService,
            _refresh_token: &str,
        ) -> Result<TokenResponse, AdapterError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            Ok(TokenResponse {
                access_token: "refreshed-token".to_string(),
                refresh_token: None,
                expires_in: 3_600,
                scope: None,
            })
        }
    }

    fn service_config() -> OauthServiceConfig {
        OauthServiceConfig {
            client_id: Some("1000.CLIENT".to_string()),
            client_secret: Some("shh".to_string().into()),
            redirect_uri: Some("https://shop.example.com/oauth/callback".to_string()),
            authorize_url: "https://accounts.zoho.com/oauth/v2/auth".to_string(),
            token_url: "https://accounts.zoho.com/oauth/v2/token".to_string(),
            api_base_url: "https://www.zohoapis.com/crm/v2".to_string(),
            scope: "ZohoCRM.modules.ALL".to_string(),
            organization_id: None,
        }
    }

    fn manager(
        repository: Arc<InMemoryCredentialRepository>,
        server: Arc<FakeAuthorizationServer>,
    ) -> TokenManager {
        TokenManager::new(repository, server, service_config(), service_config())
    }

    #[tokio::test]
    async fn authorize_url_carries_client_scope_and_state() {
        let repository = Arc::new(InMemoryCredentialRepository::new());
        let server = Arc::new(FakeAuthorizationServer::new());
        let manager = manager(repository, server);

        let url = manager.authorize_url(TargetService::Crm, "state-123").expect("url");

        assert!(url.starts_with("https://accounts.zoho.com/oauth/v2/auth?"));
        assert!(url.contains("client_id=1000.CLIENT"));
        assert!(url.contains("state=state-123"));
        assert!(url.contains("scope=ZohoCRM.modules.ALL"));
    }

    #[tokio::test]
    async fn missing_credential_yields_auth_unavailable() {
        let repository = Arc::new(InMemoryCredentialRepository::new());
        let server = Arc::new(FakeAuthorizationServer::new());
        let manager = manager(repository, server);

        let result = manager.get_valid_token(TargetService::Accounting).await;
        assert!(matches!(result, Err(AdapterError::AuthUnavailable(TargetService::Accounting))));
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let repository = Arc::new(InMemoryCredentialRepository::new());
        let server = Arc::new(FakeAuthorizationServer::new());
        repository
            .insert(Credential {
                service: TargetService::Crm,
                access_token: "still-good".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_at: Utc::now() + Duration::hours(1),
                scope: None,
                updated_at: Utc::now(),
            })
            .await;
        let manager = manager(repository, server.clone());

        let token = manager.get_valid_token(TargetService::Crm).await.expect("token");

        assert_eq!(token, "still-good");
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn near_expiry_token_is_refreshed_and_refresh_token_kept() {
        let repository = Arc::new(InMemoryCredentialRepository::new());
        let server = Arc::new(FakeAuthorizationServer::new());
        repository
            .insert(Credential {
                service: TargetService::Crm,
                access_token: "nearly-dead".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_at: Utc::now() + Duration::seconds(60),
                scope: None,
                updated_at: Utc::now(),
            })
            .await;
        let manager = manager(repository.clone(), server.clone());

        let token = manager.get_valid_token(TargetService::Crm).await.expect("token");

        assert_eq!(token, "refreshed-token");
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);

        let stored =
            repository.find(TargetService::Crm).await.expect("find").expect("credential");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
        assert!(stored.expires_at > Utc::now() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn concurrent_requests_near_expiry_refresh_once() {
        let repository = Arc::new(InMemoryCredentialRepository::new());
        let server = Arc::new(FakeAuthorizationServer::new());
        repository
            .insert(Credential {
                service: TargetService::Crm,
                access_token: "nearly-dead".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_at: Utc::now() + Duration::seconds(60),
                scope: None,
                updated_at: Utc::now(),
            })
            .await;
        let manager = manager(repository, server.clone());

        let (first, second) = tokio::join!(
            manager.get_valid_token(TargetService::Crm),
            manager.get_valid_token(TargetService::Crm),
        );

        assert_eq!(first.expect("first token"), "refreshed-token");
        assert_eq!(second.expect("second token"), "refreshed-token");
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_is_unusable() {
        let repository = Arc::new(InMemoryCredentialRepository::new());
        let server = Arc::new(FakeAuthorizationServer::new());
        repository
            .insert(Credential {
                service: TargetService::Crm,
                access_token: "dead".to_string(),
                refresh_token: None,
                expires_at: Utc::now() - Duration::hours(1),
                scope: None,
                updated_at: Utc::now(),
            })
            .await;
        let manager = manager(repository, server);

        let result = manager.get_valid_token(TargetService::Crm).await;
        assert!(matches!(result, Err(AdapterError::AuthUnavailable(TargetService::Crm))));
    }

    #[tokio::test]
    async fn completed_authorization_persists_credential() {
        let repository = Arc::new(InMemoryCredentialRepository::new());
        let server = Arc::new(FakeAuthorizationServer::new());
        let manager = manager(repository.clone(), server);

        manager
            .complete_authorization(
                TargetService::Accounting,
                "code-9",
                "https://shop.example.com/oauth/callback",
            )
            .await
            .expect("exchange");

        let stored =
            repository.find(TargetService::Accounting).await.expect("find").expect("credential");
        assert_eq!(stored.access_token, "access-for-code-9");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));

        manager.disconnect(TargetService::Accounting).await.expect("disconnect");
        assert!(repository.find(TargetService::Accounting).await.expect("find").is_none());
    }
}
