//! Application wiring and server lifecycle.

use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::get,
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use service_core::observability::extract_request_id;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{DirectoryConfig, LocalStoreKind};
use crate::db;
use crate::handlers;
use crate::services::{
    ClientCredentialsTokenProvider, DirectoryService, InMemoryUserRepository, KeycloakClient,
    PgUserRepository, UserRepository,
};
use crate::ApiDoc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: DirectoryConfig,
    pub directory: DirectoryService,
}

impl AppState {
    /// Wire the Keycloak client and the configured local store.
    pub async fn from_config(config: DirectoryConfig) -> Result<Self, AppError> {
        let http = KeycloakClient::http_client(&config.keycloak)
            .map_err(|e| AppError::ConfigError(e.into()))?;

        let tokens = Arc::new(ClientCredentialsTokenProvider::new(
            http.clone(),
            config.keycloak.token_url(),
            config.keycloak.admin_client_id.clone(),
            config.keycloak.admin_client_secret.clone(),
        ));
        let idp = KeycloakClient::new(http, &config.keycloak, tokens)
            .map_err(|e| AppError::ConfigError(e.into()))?;

        let users: Arc<dyn UserRepository> = match config.local_store.kind {
            LocalStoreKind::Memory => {
                tracing::warn!("Using in-memory local user store; records are not persisted");
                Arc::new(InMemoryUserRepository::new())
            }
            LocalStoreKind::Postgres => {
                let database = config.local_store.database.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is not configured"))
                })?;

                let pool = db::create_pool(database).await.map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    AppError::DatabaseError(e.into())
                })?;
                db::run_migrations(&pool).await.map_err(|e| {
                    tracing::error!("Failed to run migrations: {}", e);
                    AppError::DatabaseError(e.into())
                })?;

                Arc::new(PgUserRepository::new(pool))
            }
        };

        Ok(Self {
            config,
            directory: DirectoryService::new(Arc::new(idp), users),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.swagger.enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    app.route(
        "/users",
        get(handlers::users::list_users).post(handlers::users::create_user),
    )
    .route(
        "/users/:id",
        get(handlers::users::get_user)
            .patch(handlers::users::update_user)
            .delete(handlers::users::delete_user),
    )
    .route("/users/:id/record", get(handlers::users::get_user_record))
    .route(
        "/users/:id/groups",
        get(handlers::users::get_user_groups)
            .put(handlers::users::put_user_group)
            .delete(handlers::users::delete_user_group),
    )
    .route("/groups", get(handlers::groups::list_groups))
    .with_state(state)
    .layer(from_fn(metrics_middleware))
    .layer(
        TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id =
                extract_request_id(request.headers()).unwrap_or_else(|| "-".to_string());

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        }),
    )
    .layer(from_fn(request_id_middleware))
    .layer(cors)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: DirectoryConfig) -> Result<Self, AppError> {
        let address = config.common.address();
        let state = AppState::from_config(config).await?;
        let router = build_router(state);

        // port 0 binds a random port
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
