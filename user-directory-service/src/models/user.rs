//! User models - Keycloak users, directory responses and local records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashMap;
use utoipa::ToSchema;

use super::{deserialize_id, GroupSummary};

const MIDDLE_NAME_ATTRIBUTE: &str = "middle_name";
const CONTACT_NUMBER_ATTRIBUTE: &str = "contact_number";

/// A user as returned by the Keycloak admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpUser {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, Value>>,
}

impl IdpUser {
    /// First value of a user attribute.
    pub fn attribute(&self, name: &str) -> Option<String> {
        let raw = self.attributes.as_ref()?.get(name)?;
        let value = match raw {
            Value::Array(items) => items.first()?,
            other => other,
        };
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// User returned by directory queries, annotated with group memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DirectoryUser {
    pub id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub contact_number: Option<String>,
    pub groups: Vec<GroupSummary>,
}

impl DirectoryUser {
    pub fn with_groups(user: IdpUser, groups: Vec<GroupSummary>) -> Self {
        let middle_name = user.attribute(MIDDLE_NAME_ATTRIBUTE);
        let contact_number = user.attribute(CONTACT_NUMBER_ATTRIBUTE);
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            middle_name,
            last_name: user.last_name,
            email_address: user.email,
            contact_number,
            groups,
        }
    }
}

/// Locally stored user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LocalUser {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub contact_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a local user record before it has an id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewLocalUser {
    pub username: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub contact_number: Option<String>,
}

/// Partial update; `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalUserChanges {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub contact_number: Option<String>,
}

impl LocalUserChanges {
    /// Apply the changes in place, bumping `updated_at`.
    pub fn apply_to(self, user: &mut LocalUser) {
        if let Some(v) = self.username {
            user.username = v;
        }
        if let Some(v) = self.first_name {
            user.first_name = Some(v);
        }
        if let Some(v) = self.middle_name {
            user.middle_name = Some(v);
        }
        if let Some(v) = self.last_name {
            user.last_name = Some(v);
        }
        if let Some(v) = self.email_address {
            user.email_address = Some(v);
        }
        if let Some(v) = self.contact_number {
            user.contact_number = Some(v);
        }
        user.updated_at = Utc::now();
    }
}
