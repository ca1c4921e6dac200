//! Transport registry: the single seam mapping provider identifiers to
//! concrete transport constructors

use crate::config::{GoogleOAuthConfig, ProviderEndpoints, SendConfig};
use crate::error::{OutreachError, Result};
use crate::transport::boldtrail::BoldTrailTransport;
use crate::transport::followupboss::FollowUpBossTransport;
use crate::transport::gmail::GmailTransport;
use crate::transport::token::{HttpTokenRefresher, OAuthToken, TokenRefresher, TokenSink};
use crate::transport::Transport;
use crate::vault::SecretBag;
use async_trait::async_trait;
use nurture_types::UserId;
use std::sync::Arc;

/// Provider identifiers with a registered constructor
pub const SUPPORTED_PROVIDERS: &[&str] = &["boldtrail", "followupboss", "gmail"];

/// Receives refreshed OAuth secret bags for re-encryption and storage
#[async_trait]
pub trait CredentialWriter: Send + Sync {
    async fn save_secrets(&self, user_id: UserId, provider: &str, secrets: &SecretBag)
        -> Result<()>;
}

/// Resolves a provider identifier plus decrypted secrets into a transport.
/// Fronts the registry so tests can substitute a fixed fake transport.
pub trait TransportResolver: Send + Sync {
    fn resolve(
        &self,
        user_id: UserId,
        provider: &str,
        secrets: SecretBag,
    ) -> Result<Arc<dyn Transport>>;
}

pub struct TransportRegistry {
    endpoints: ProviderEndpoints,
    send: SendConfig,
    refresher: Arc<dyn TokenRefresher>,
    writer: Arc<dyn CredentialWriter>,
}

impl TransportRegistry {
    pub fn new(
        endpoints: ProviderEndpoints,
        send: SendConfig,
        google: &GoogleOAuthConfig,
        writer: Arc<dyn CredentialWriter>,
    ) -> Self {
        let refresher: Arc<dyn TokenRefresher> = Arc::new(HttpTokenRefresher::new(
            google.client_id.clone(),
            google.client_secret.clone(),
        ));
        Self::with_refresher(endpoints, send, refresher, writer)
    }

    /// Construct with an injected refresher (tests use a fake)
    pub fn with_refresher(
        endpoints: ProviderEndpoints,
        send: SendConfig,
        refresher: Arc<dyn TokenRefresher>,
        writer: Arc<dyn CredentialWriter>,
    ) -> Self {
        Self {
            endpoints,
            send,
            refresher,
            writer,
        }
    }
}

impl TransportResolver for TransportRegistry {
    fn resolve(
        &self,
        user_id: UserId,
        provider: &str,
        secrets: SecretBag,
    ) -> Result<Arc<dyn Transport>> {
        match provider {
            "boldtrail" => Ok(Arc::new(BoldTrailTransport::from_secrets(
                &secrets,
                &self.endpoints.boldtrail_base_url,
                self.send.request_timeout_secs,
            )?)),
            "followupboss" => Ok(Arc::new(FollowUpBossTransport::from_secrets(
                &secrets,
                &self.endpoints.followupboss_base_url,
                self.send.request_timeout_secs,
            )?)),
            "gmail" => {
                let token = OAuthToken::from_secret_bag(&secrets)?;
                let sink: Arc<dyn TokenSink> = Arc::new(RefreshedTokenSink {
                    writer: self.writer.clone(),
                    user_id,
                });
                Ok(Arc::new(GmailTransport::new(
                    token,
                    self.refresher.clone(),
                    sink,
                    &self.endpoints.gmail_base_url,
                    self.send.request_timeout_secs,
                    self.send.token_expiry_buffer_secs,
                )?))
            }
            other => Err(OutreachError::Validation(format!(
                "unsupported provider: {}",
                other
            ))),
        }
    }
}

/// Persists refreshed Gmail tokens back through the credential writer
struct RefreshedTokenSink {
    writer: Arc<dyn CredentialWriter>,
    user_id: UserId,
}

#[async_trait]
impl TokenSink for RefreshedTokenSink {
    async fn persist(&self, token: &OAuthToken) -> Result<()> {
        self.writer
            .save_secrets(self.user_id, "gmail", &token.to_secret_bag())
            .await
    }
}
