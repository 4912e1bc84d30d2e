//! Group model - Keycloak group representation and its flat API form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

use super::deserialize_id;

/// Attribute carrying the display/lookup ordering of a group.
pub const LEVEL_ATTRIBUTE: &str = "level";

/// A group as returned by the Keycloak admin API.
///
/// `subGroups` is only populated on the top-level `groups` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpGroup {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_groups: Option<Vec<IdpGroup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, Value>>,
}

impl IdpGroup {
    pub fn sub_groups(&self) -> &[IdpGroup] {
        self.sub_groups.as_deref().unwrap_or_default()
    }

    /// The `level` attribute as a non-negative integer.
    ///
    /// Keycloak stores attributes as string arrays (`{"level": ["2"]}`); a bare
    /// string or number is accepted as well. Anything missing, negative or
    /// non-numeric is level 0.
    pub fn level(&self) -> u32 {
        let Some(raw) = self
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(LEVEL_ATTRIBUTE))
        else {
            return 0;
        };

        let value = match raw {
            Value::Array(items) => items.first(),
            other => Some(other),
        };

        match value {
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
            _ => 0,
        }
    }
}

/// Flat group representation returned by the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    #[schema(example = "/app/admin")]
    pub path: String,
    pub level: u32,
}

impl From<&IdpGroup> for GroupSummary {
    fn from(group: &IdpGroup) -> Self {
        Self {
            id: group.id.clone(),
            name: group.name.clone(),
            path: group.path.clone(),
            level: group.level(),
        }
    }
}

impl From<IdpGroup> for GroupSummary {
    fn from(group: IdpGroup) -> Self {
        GroupSummary::from(&group)
    }
}
