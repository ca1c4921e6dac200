//! Credential service behavior: fail-closed connect, encrypted storage,
//! disconnect and status

mod common;

use common::*;
use nurture_core::error::OutreachError;
use nurture_core::store::CredentialStore;
use nurture_core::transport::registry::CredentialWriter;
use nurture_core::vault::SecretBag;
use serde_json::json;
use std::sync::Arc;

fn crm_secrets() -> SecretBag {
    let mut bag = SecretBag::new();
    bag.insert("api_key".to_string(), json!("crm-key-1"));
    bag
}

#[tokio::test]
async fn test_connect_stores_encrypted_credential() {
    let h = harness();
    let resolver = FixedResolver {
        transport: h.transport.clone(),
    };

    h.credentials
        .connect(&resolver, OWNER, "boldtrail", crm_secrets())
        .await
        .unwrap();

    // Stored at rest as ciphertext, not the raw key
    let stored = h.store.load(OWNER, "boldtrail").await.unwrap().unwrap();
    assert!(!stored.ciphertext.contains("crm-key-1"));
    assert!(!stored.nonce.is_empty());

    // And decrypts back to the original bag
    let loaded = h.credentials.load_secrets(OWNER, "boldtrail").await.unwrap();
    assert_eq!(loaded, crm_secrets());
}

#[tokio::test]
async fn test_connect_fails_closed_on_rejected_validation() {
    let transport = Arc::new(FakeTransport::rejecting_validation());
    let h = harness_with_transport(transport.clone());
    let resolver = FixedResolver { transport };

    // The secret bag is perfectly well formed, but the live check says no
    let err = h
        .credentials
        .connect(&resolver, OWNER, "boldtrail", crm_secrets())
        .await
        .unwrap_err();
    assert!(matches!(err, OutreachError::Auth(_)));

    // Nothing was stored
    assert!(h.store.load(OWNER, "boldtrail").await.unwrap().is_none());
}

#[tokio::test]
async fn test_disconnect_deletes_credential() {
    let h = harness();
    let resolver = FixedResolver {
        transport: h.transport.clone(),
    };

    h.credentials
        .connect(&resolver, OWNER, "boldtrail", crm_secrets())
        .await
        .unwrap();
    h.credentials.disconnect(OWNER, "boldtrail").await.unwrap();

    assert!(h.store.load(OWNER, "boldtrail").await.unwrap().is_none());
    let err = h
        .credentials
        .load_secrets(OWNER, "boldtrail")
        .await
        .unwrap_err();
    assert!(matches!(err, OutreachError::Auth(_)));
}

#[tokio::test]
async fn test_connection_status_reports_email() {
    let h = harness();

    let status = h
        .credentials
        .connection_status(OWNER, "gmail")
        .await
        .unwrap();
    assert!(!status.connected);
    assert_eq!(status.email_address, None);

    let mut bag = SecretBag::new();
    bag.insert("access_token".to_string(), json!("tok-1"));
    bag.insert("email_address".to_string(), json!("agent@example.com"));
    h.credentials
        .save_secrets(OWNER, "gmail", &bag)
        .await
        .unwrap();

    let status = h
        .credentials
        .connection_status(OWNER, "gmail")
        .await
        .unwrap();
    assert!(status.connected);
    assert_eq!(status.email_address.as_deref(), Some("agent@example.com"));
}

#[tokio::test]
async fn test_save_secrets_preserves_connected_at() {
    let h = harness();

    h.credentials
        .save_secrets(OWNER, "gmail", &crm_secrets())
        .await
        .unwrap();
    let first = h.store.load(OWNER, "gmail").await.unwrap().unwrap();

    // Re-save (as a token refresh would) and check the connect timestamp
    // survives while the ciphertext rotates with its fresh nonce
    h.credentials
        .save_secrets(OWNER, "gmail", &crm_secrets())
        .await
        .unwrap();
    let second = h.store.load(OWNER, "gmail").await.unwrap().unwrap();

    assert_eq!(second.connected_at, first.connected_at);
    assert_ne!(second.nonce, first.nonce);
}

#[tokio::test]
async fn test_active_crm_provider_ignores_gmail() {
    let h = harness();

    h.credentials
        .save_secrets(OWNER, "gmail", &crm_secrets())
        .await
        .unwrap();
    assert_eq!(h.credentials.active_crm_provider(OWNER).await.unwrap(), None);

    h.credentials
        .save_secrets(OWNER, "followupboss", &crm_secrets())
        .await
        .unwrap();
    assert_eq!(
        h.credentials.active_crm_provider(OWNER).await.unwrap(),
        Some("followupboss".to_string())
    );
}
