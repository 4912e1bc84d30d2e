pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use utoipa::OpenApi;

pub use startup::{build_router, AppState, Application};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::get_user,
        handlers::users::get_user_record,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::get_user_groups,
        handlers::users::put_user_group,
        handlers::users::delete_user_group,
        handlers::groups::list_groups,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::users::CreateUserRequest,
            dtos::users::UpdateUserRequest,
            dtos::users::UserGroupRequest,
            models::DirectoryUser,
            models::GroupSummary,
            models::LocalUser,
        )
    ),
    tags(
        (name = "Users", description = "Directory users and group membership"),
        (name = "Groups", description = "Application-scoped group listing"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;
