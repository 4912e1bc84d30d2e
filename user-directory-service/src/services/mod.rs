pub mod directory;
pub mod error;
pub mod groups;
pub mod idp;
pub mod metrics;
pub mod repository;

pub use directory::DirectoryService;
pub use error::ServiceError;
pub use idp::{
    ClientCredentialsTokenProvider, IdentityProvider, IdpError, KeycloakClient, TokenProvider,
};
pub use metrics::{get_metrics, init_metrics};
pub use repository::{InMemoryUserRepository, PgUserRepository, UserRepository};
