//! Request/response bodies for the users and groups endpoints.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{LocalUserChanges, NewLocalUser};

/// Optional application scope (`?app_name=`).
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScopeQuery {
    /// Application namespace; only groups whose path contains it are returned.
    pub app_name: Option<String>,
}

impl ScopeQuery {
    /// The scope, with an empty value meaning "no scope".
    pub fn scope(&self) -> Option<&str> {
        self.app_name.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Username must not be empty"))]
    pub username: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email_address: Option<String>,
    #[validate(length(max = 32, message = "Contact number is too long"))]
    pub contact_number: Option<String>,
}

impl From<CreateUserRequest> for NewLocalUser {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            username: req.username,
            first_name: req.first_name,
            middle_name: req.middle_name,
            last_name: req.last_name,
            email_address: req.email_address,
            contact_number: req.contact_number,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Username must not be empty"))]
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email_address: Option<String>,
    #[validate(length(max = 32, message = "Contact number is too long"))]
    pub contact_number: Option<String>,
}

impl From<UpdateUserRequest> for LocalUserChanges {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            username: req.username,
            first_name: req.first_name,
            middle_name: req.middle_name,
            last_name: req.last_name,
            email_address: req.email_address,
            contact_number: req.contact_number,
        }
    }
}

/// Body of `PUT`/`DELETE /users/{id}/groups`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UserGroupRequest {
    #[schema(example = "app")]
    pub app_name: Option<String>,
    #[validate(length(min = 1, message = "group_name must not be empty"))]
    #[schema(example = "admin")]
    pub group_name: String,
}

impl UserGroupRequest {
    pub fn scope(&self) -> Option<&str> {
        self.app_name.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_means_unscoped() {
        let query = ScopeQuery {
            app_name: Some(String::new()),
        };
        assert_eq!(query.scope(), None);
        assert_eq!(ScopeQuery::default().scope(), None);
    }

    #[test]
    fn update_rejects_invalid_email() {
        let req = UpdateUserRequest {
            email_address: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn update_with_no_fields_is_valid() {
        assert!(UpdateUserRequest::default().validate().is_ok());
    }
}
