use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub keycloak: KeycloakConfig,
    pub local_store: LocalStoreConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakConfig {
    /// Server root, without the `/auth` prefix (e.g. `https://sso.example.com`).
    pub base_url: String,
    pub realm: String,
    pub admin_client_id: String,
    pub admin_client_secret: Secret<String>,
    /// Applied as both connect and read timeout on every upstream call.
    pub connect_timeout_secs: u64,
}

impl KeycloakConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn admin_url(&self) -> String {
        format!(
            "{}/auth/admin/realms/{}",
            self.base_url.trim_end_matches('/'),
            self.realm
        )
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/auth/realms/{}/protocol/openid-connect/token",
            self.base_url.trim_end_matches('/'),
            self.realm
        )
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LocalStoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalStoreConfig {
    pub kind: LocalStoreKind,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: bool,
}

impl DirectoryConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: Option<&str>| get_var(&lookup, key, default);

        let environment: Environment = get("ENVIRONMENT", Some("dev"))?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let local_store_kind: LocalStoreKind = get("LOCAL_STORE", Some("postgres"))?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database = match local_store_kind {
            LocalStoreKind::Postgres => Some(DatabaseConfig {
                url: Secret::new(get("DATABASE_URL", None)?),
                max_connections: parse_num(&get("DATABASE_MAX_CONNECTIONS", Some("10"))?, 10),
                min_connections: parse_num(&get("DATABASE_MIN_CONNECTIONS", Some("1"))?, 1),
            }),
            LocalStoreKind::Memory => None,
        };

        let connect_timeout_secs = get("KEYCLOAK_CONNECT_TIMEOUT_SECS", Some("60"))?
            .parse()
            .map_err(|e: std::num::ParseIntError| {
                AppError::ConfigError(anyhow::anyhow!(
                    "KEYCLOAK_CONNECT_TIMEOUT_SECS: {}",
                    e
                ))
            })?;

        let config = DirectoryConfig {
            common,
            environment,
            service_name: get("SERVICE_NAME", Some("user-directory-service"))?,
            service_version: get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get("LOG_LEVEL", Some("info"))?,
            keycloak: KeycloakConfig {
                base_url: get("KEYCLOAK_BASE_URL", None)?,
                realm: get("KEYCLOAK_REALM_NAME", None)?,
                admin_client_id: get("KEYCLOAK_ADMIN_CLIENT", None)?,
                admin_client_secret: Secret::new(get("KEYCLOAK_ADMIN_SECRET", None)?),
                connect_timeout_secs,
            },
            local_store: LocalStoreConfig {
                kind: local_store_kind,
                database,
            },
            security: SecurityConfig {
                allowed_origins: get("ALLOWED_ORIGINS", Some("http://localhost:3000"))?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get("ENABLE_SWAGGER", Some("true"))?
                    .parse()
                    .unwrap_or(true),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.keycloak.connect_timeout_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "KEYCLOAK_CONNECT_TIMEOUT_SECS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.local_store.kind == LocalStoreKind::Memory {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "LOCAL_STORE=memory is not allowed in production"
                )));
            }

            if self.swagger.enabled {
                tracing::warn!("Swagger UI is enabled in production");
            }
        }

        Ok(())
    }
}

fn get_var<F>(lookup: &F, key: &str, default: Option<&str>) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => default.map(str::to_string).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("{} is required but not set", key))
        }),
    }
}

fn parse_num(value: &str, fallback: u32) -> u32 {
    value.parse().unwrap_or(fallback)
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for LocalStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(LocalStoreKind::Postgres),
            "memory" => Ok(LocalStoreKind::Memory),
            _ => Err(format!("Invalid local store: {}", s)),
        }
    }
}
