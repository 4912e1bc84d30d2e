//! Domain models for user-directory-service.

pub mod group;
pub mod user;

pub use group::{GroupSummary, IdpGroup, LEVEL_ATTRIBUTE};
pub use user::{DirectoryUser, IdpUser, LocalUser, LocalUserChanges, NewLocalUser};

use serde::{Deserialize, Deserializer};

/// Keycloak ids are UUID strings; numeric ids are accepted and stringified.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
