pub mod groups;
pub mod health;
pub mod metrics;
pub mod users;

pub use health::{health_check, readiness_check};
