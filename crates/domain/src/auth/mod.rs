//! Authentication domain types

mod config;
mod credentials;

pub use config::{ApiKeyLocation, AuthenticationConfig, ClientAuthMethod, ProtocolType, SoapVersion};
pub use credentials::{
    AccessToken, AuthError, CredentialMaterial, Credentials, RefreshMetadata, is_expired,
};
