//! Keycloak realm admin API client.

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use service_core::observability::{TracedClientExt, TracedRequest};
use std::sync::Arc;

use super::{IdentityProvider, IdpError, TokenProvider};
use crate::config::KeycloakConfig;
use crate::models::{IdpGroup, IdpUser};

/// Upper bound on `list_users`; there is no further pagination.
pub const USER_PAGE_SIZE: u32 = 2000;

#[derive(Debug, Clone, Copy)]
enum Verb {
    Get,
    Put,
    Delete,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

/// Client for `{base_url}/auth/admin/realms/{realm}/...`.
#[derive(Clone)]
pub struct KeycloakClient {
    client: Client,
    admin_base: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl KeycloakClient {
    pub fn new(
        client: Client,
        config: &KeycloakConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, IdpError> {
        let admin_base = Url::parse(&config.admin_url())
            .map_err(|e| IdpError::Configuration(format!("KEYCLOAK_BASE_URL: {}", e)))?;
        if admin_base.cannot_be_a_base() {
            return Err(IdpError::Configuration(format!(
                "KEYCLOAK_BASE_URL is not a base URL: {}",
                config.base_url
            )));
        }

        Ok(Self {
            client,
            admin_base,
            tokens,
        })
    }

    /// Shared HTTP client honouring the configured connect/read timeout.
    pub fn http_client(config: &KeycloakConfig) -> Result<Client, IdpError> {
        Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(IdpError::Transport)
    }

    /// Admin URL for the given path segments; each segment is percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.admin_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute(
        &self,
        verb: Verb,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, IdpError> {
        let token = self.tokens.access_token().await?;

        let request: TracedRequest = match verb {
            Verb::Get => self.client.traced_get(url.as_str()),
            Verb::Put => self.client.traced_put(url.as_str()),
            Verb::Delete => self.client.traced_delete(url.as_str()),
        };

        let response = request
            .query(query)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(method = verb.as_str(), url = %url, error = %e, "Identity provider request failed");
                counter!("idp_requests_total", "method" => verb.as_str(), "status" => "error")
                    .increment(1);
                IdpError::Transport(e)
            })?;

        let status = response.status();
        counter!(
            "idp_requests_total",
            "method" => verb.as_str(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        if status.is_success() {
            tracing::debug!(method = verb.as_str(), url = %url, status = %status, "Identity provider call");
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(method = verb.as_str(), url = %url, status = %status, body = %body, "Identity provider returned an error");
        Err(IdpError::Upstream {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, IdpError> {
        let response = self.execute(Verb::Get, self.url(segments), query).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn list_users(&self) -> Result<Vec<IdpUser>, IdpError> {
        let max = USER_PAGE_SIZE.to_string();
        self.get_json(&["users"], &[("max", max.as_str())]).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<IdpUser, IdpError> {
        let users: Vec<IdpUser> = self
            .get_json(&["users"], &[("username", username), ("exact", "true")])
            .await?;

        users.into_iter().next().ok_or_else(|| {
            IdpError::NotFound(format!("User with username '{}' not found", username))
        })
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<IdpUser>, IdpError> {
        match self.get_json(&["users", user_id], &[]).await {
            Ok(user) => Ok(Some(user)),
            Err(IdpError::Upstream { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_groups(&self, brief: bool) -> Result<Vec<IdpGroup>, IdpError> {
        let brief = brief.to_string();
        self.get_json(&["groups"], &[("briefRepresentation", brief.as_str())])
            .await
    }

    async fn list_user_groups(&self, user_id: &str) -> Result<Vec<IdpGroup>, IdpError> {
        self.get_json(&["users", user_id, "groups"], &[]).await
    }

    async fn list_group_members(&self, group_id: &str) -> Result<Vec<IdpUser>, IdpError> {
        self.get_json(&["groups", group_id, "members"], &[]).await
    }

    async fn list_subgroups(&self, group_id: &str) -> Result<Vec<IdpGroup>, IdpError> {
        self.get_json(&["groups", group_id, "children"], &[]).await
    }

    async fn set_user_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<StatusCode, IdpError> {
        let url = self.url(&["users", user_id, "groups", group_id]);
        let response = self.execute(Verb::Put, url, &[]).await?;
        tracing::info!(user_id = %user_id, group_id = %group_id, "Group membership set");
        Ok(response.status())
    }

    async fn remove_user_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<StatusCode, IdpError> {
        let url = self.url(&["users", user_id, "groups", group_id]);
        let response = self.execute(Verb::Delete, url, &[]).await?;
        tracing::info!(user_id = %user_id, group_id = %group_id, "Group membership removed");
        Ok(response.status())
    }
}
