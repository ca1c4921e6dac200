//! Nurture Core Library
//!
//! Business logic for the drip-campaign outreach engine: credential vault,
//! provider transports, token lifecycle, template rendering, campaign
//! scheduling and the send orchestrator.

pub mod campaign;
pub mod config;
pub mod credentials;
pub mod error;
pub mod store;
pub mod template;
pub mod transport;
pub mod vault;

// Re-export main types for easy access
pub use config::OutreachConfig;
pub use error::{OutreachError, Result};

// Re-export engine components
pub use campaign::{next_action, NextAction, SendOrchestrator};
pub use credentials::{ConnectionStatus, CredentialService};
pub use store::{CampaignStore, CredentialStore, InMemoryStore, LeadReader};
pub use template::{render, LeadFields};
pub use transport::{
    BoldTrailTransport, FollowUpBossTransport, GmailTransport, HttpTokenRefresher, OAuthToken,
    TokenManager, TokenRefresher, TokenSink, Transport, TransportRegistry, TransportResolver,
    SUPPORTED_PROVIDERS,
};
pub use vault::{generate_key, CredentialVault, SecretBag};
