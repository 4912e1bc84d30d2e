#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::collections::HashMap;
use tower::ServiceExt;
use user_directory_service::config::DirectoryConfig;
use user_directory_service::{build_router, AppState};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "demo";
pub const ADMIN_PATH: &str = "/auth/admin/realms/demo";
pub const TOKEN_PATH: &str = "/auth/realms/demo/protocol/openid-connect/token";
pub const TEST_TOKEN: &str = "test-admin-token";

pub fn admin_path(suffix: &str) -> String {
    format!("{}{}", ADMIN_PATH, suffix)
}

/// Configuration pointing at `idp_uri` with the in-memory local store.
pub fn test_config(idp_uri: &str) -> DirectoryConfig {
    let vars: HashMap<&str, String> = [
        ("KEYCLOAK_BASE_URL", idp_uri.to_string()),
        ("KEYCLOAK_REALM_NAME", REALM.to_string()),
        ("KEYCLOAK_ADMIN_CLIENT", "directory-admin".to_string()),
        ("KEYCLOAK_ADMIN_SECRET", "test-secret".to_string()),
        ("KEYCLOAK_CONNECT_TIMEOUT_SECS", "5".to_string()),
        ("LOCAL_STORE", "memory".to_string()),
        ("ENABLE_SWAGGER", "false".to_string()),
        ("SERVICE_NAME", "user-directory-service-test".to_string()),
    ]
    .into_iter()
    .collect();

    DirectoryConfig::from_lookup(CoreConfig::default(), |key| vars.get(key).cloned())
        .expect("Failed to build test configuration")
}

/// Token endpoint answering every client-credentials request.
pub async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TEST_TOKEN,
            "expires_in": 300,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

pub struct TestApp {
    pub router: Router,
    pub idp: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let idp = MockServer::start().await;
        mount_token_endpoint(&idp).await;

        let state = AppState::from_config(test_config(&idp.uri()))
            .await
            .expect("Failed to build application state");

        Self {
            router: build_router(state),
            idp,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }
}

/// Realm with `/app/admin` (level 1) holding `/app/admin/viewer`, and an
/// unrelated `/other/staff` group.
pub fn group_tree() -> Value {
    json!([
        {
            "id": "g-admin",
            "name": "admin",
            "path": "/app/admin",
            "attributes": { "level": ["1"] },
            "subGroups": [
                { "id": "g-viewer", "name": "viewer", "path": "/app/admin/viewer" }
            ]
        },
        { "id": "g-staff", "name": "staff", "path": "/other/staff" }
    ])
}

pub fn user(id: &str, username: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "firstName": username,
        "lastName": "Tester",
        "email": format!("{}@example.com", username)
    })
}
