//! Credential service: connect, load and disconnect provider credentials
//!
//! Composes the vault with the credential store. Secrets only ever cross this
//! boundary encrypted with the provider id bound as associated data, so a
//! blob stored for one provider cannot be presented as another's.

use crate::error::{OutreachError, Result};
use crate::store::CredentialStore;
use crate::transport::registry::{CredentialWriter, TransportResolver};
use crate::vault::{CredentialVault, SecretBag};
use async_trait::async_trait;
use chrono::Utc;
use nurture_types::{ProviderCredential, UserId};
use serde_json::Value;
use std::sync::Arc;

/// Connection state surfaced to callers; never contains secrets
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub provider: String,
    pub email_address: Option<String>,
}

pub struct CredentialService {
    vault: CredentialVault,
    store: Arc<dyn CredentialStore>,
}

impl CredentialService {
    pub fn new(vault: CredentialVault, store: Arc<dyn CredentialStore>) -> Self {
        Self { vault, store }
    }

    /// Connect a provider for a user.
    ///
    /// The credential is validated with a live check before anything is
    /// stored. Validation fails closed: a secret bag that merely looks
    /// plausible is rejected when the provider does not accept it.
    pub async fn connect(
        &self,
        resolver: &dyn TransportResolver,
        user_id: UserId,
        provider: &str,
        secrets: SecretBag,
    ) -> Result<()> {
        let transport = resolver.resolve(user_id, provider, secrets.clone())?;

        if !transport.validate_connection().await? {
            return Err(OutreachError::Auth(format!(
                "{} rejected the credential during live validation",
                provider
            )));
        }

        self.save_secrets(user_id, provider, &secrets).await?;
        log::info!("connected provider {} for user {}", provider, user_id);
        Ok(())
    }

    /// Decrypt the stored secret bag for a user's provider connection
    pub async fn load_secrets(&self, user_id: UserId, provider: &str) -> Result<SecretBag> {
        let credential = self
            .store
            .load(user_id, provider)
            .await?
            .ok_or_else(|| OutreachError::Auth(format!("{} is not connected", provider)))?;

        self.vault
            .decrypt_for(provider, &credential.ciphertext, &credential.nonce)
    }

    /// Delete the stored credential on explicit disconnect
    pub async fn disconnect(&self, user_id: UserId, provider: &str) -> Result<()> {
        self.store.delete(user_id, provider).await?;
        log::info!("disconnected provider {} for user {}", provider, user_id);
        Ok(())
    }

    /// Whether the provider is connected, plus the account email when the
    /// stored bag carries one
    pub async fn connection_status(
        &self,
        user_id: UserId,
        provider: &str,
    ) -> Result<ConnectionStatus> {
        match self.store.load(user_id, provider).await? {
            Some(credential) => {
                let bag = self
                    .vault
                    .decrypt_for(provider, &credential.ciphertext, &credential.nonce)?;
                Ok(ConnectionStatus {
                    connected: true,
                    provider: provider.to_string(),
                    email_address: bag
                        .get("email_address")
                        .and_then(Value::as_str)
                        .map(|s| s.to_string()),
                })
            }
            None => Ok(ConnectionStatus {
                connected: false,
                provider: provider.to_string(),
                email_address: None,
            }),
        }
    }

    /// The user's connected CRM provider identifier, if any
    pub async fn active_crm_provider(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self
            .store
            .active_crm_connection(user_id)
            .await?
            .map(|c| c.provider))
    }
}

#[async_trait]
impl CredentialWriter for CredentialService {
    async fn save_secrets(
        &self,
        user_id: UserId,
        provider: &str,
        secrets: &SecretBag,
    ) -> Result<()> {
        let (ciphertext, nonce) = self.vault.encrypt_for(provider, secrets)?;

        let existing = self.store.load(user_id, provider).await?;

        self.store
            .save(ProviderCredential {
                user_id,
                provider: provider.to_string(),
                ciphertext,
                nonce,
                connected_at: existing
                    .as_ref()
                    .map(|e| e.connected_at)
                    .unwrap_or_else(Utc::now),
                last_used_at: existing.and_then(|e| e.last_used_at),
            })
            .await
    }
}
