//! Identity-provider (Keycloak) admin API access.
//!
//! [`IdentityProvider`] is the seam the directory service talks to;
//! [`KeycloakClient`] implements it over the realm admin REST API using an
//! injected [`TokenProvider`] for the admin bearer token.

mod keycloak;
mod token;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::{IdpGroup, IdpUser};

pub use keycloak::{KeycloakClient, USER_PAGE_SIZE};
pub use token::{ClientCredentialsTokenProvider, TokenProvider};

#[derive(Debug, Error)]
pub enum IdpError {
    #[error("Identity provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected identity provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Admin token request failed: {0}")]
    Token(String),

    #[error("Invalid identity provider configuration: {0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),
}

/// Directory operations against the identity provider's admin API.
///
/// Every call is a single upstream request; failures are never retried.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// All realm users, up to [`USER_PAGE_SIZE`].
    async fn list_users(&self) -> Result<Vec<IdpUser>, IdpError>;

    /// Exact username match. The first result wins if several come back.
    async fn find_user_by_username(&self, username: &str) -> Result<IdpUser, IdpError>;

    /// `None` when the provider has no user with this id.
    async fn get_user(&self, user_id: &str) -> Result<Option<IdpUser>, IdpError>;

    /// Top-level groups with their `subGroups` inline.
    async fn list_groups(&self, brief: bool) -> Result<Vec<IdpGroup>, IdpError>;

    /// Groups the user is directly a member of.
    async fn list_user_groups(&self, user_id: &str) -> Result<Vec<IdpGroup>, IdpError>;

    async fn list_group_members(&self, group_id: &str) -> Result<Vec<IdpUser>, IdpError>;

    async fn list_subgroups(&self, group_id: &str) -> Result<Vec<IdpGroup>, IdpError>;

    /// Adds the membership and returns the upstream success status.
    async fn set_user_group(&self, user_id: &str, group_id: &str)
        -> Result<StatusCode, IdpError>;

    /// Removes the membership and returns the upstream success status.
    async fn remove_user_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<StatusCode, IdpError>;
}
