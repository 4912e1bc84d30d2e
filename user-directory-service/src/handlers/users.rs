use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::dtos::users::{CreateUserRequest, ScopeQuery, UpdateUserRequest, UserGroupRequest};
use crate::dtos::ErrorResponse;
use crate::models::{DirectoryUser, GroupSummary, LocalUser};
use crate::startup::AppState;
use crate::utils::{ApiPath, ValidatedJson};

/// List provider users with their group memberships
#[utoipa::path(
    get,
    path = "/users",
    params(ScopeQuery),
    responses(
        (status = 200, description = "Users with their groups", body = [DirectoryUser]),
        (status = 502, description = "Identity provider unreachable", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<DirectoryUser>>, AppError> {
    let users = state.directory.get_all_users(query.scope()).await?;
    tracing::info!(count = users.len(), app_name = ?query.scope(), "Listed users");
    Ok(Json(users))
}

/// Create a local user record
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Record created", body = LocalUser),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.directory.create_user(req.into()).await?;
    tracing::info!(user_id = user.id, username = %user.username, "Created local user");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Fetch a provider user with their groups
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(
        ("id" = String, Path, description = "Identity provider user id"),
        ScopeQuery
    ),
    responses(
        (status = 200, description = "User found", body = DirectoryUser),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<DirectoryUser>, AppError> {
    let user = state.directory.get_user_by_id(&id, query.scope()).await?;
    Ok(Json(user))
}

/// Fetch a local user record
#[utoipa::path(
    get,
    path = "/users/{id}/record",
    params(("id" = i64, Path, description = "Local record id")),
    responses(
        (status = 200, description = "Record found", body = LocalUser),
        (status = 404, description = "Record not found", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn get_user_record(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<LocalUser>, AppError> {
    state
        .directory
        .get_local_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("User with {} not found", id)))
}

/// Update fields of a local user record
#[utoipa::path(
    patch,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "Local record id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Record updated", body = LocalUser),
        (status = 404, description = "Record not found", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<LocalUser>, AppError> {
    let user = state
        .directory
        .update_user(id, req.into())
        .await?
        .ok_or_else(|| AppError::not_found(format!("User with {} not found", id)))?;

    tracing::info!(user_id = id, "Updated local user");
    Ok(Json(user))
}

/// Delete a local user record
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "Local record id")),
    responses(
        (status = 200, description = "Deleted record", body = LocalUser),
        (status = 404, description = "Record not found", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<LocalUser>, AppError> {
    state
        .directory
        .delete_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("User with {} not found", id)))
}

/// Direct group memberships of a provider user
#[utoipa::path(
    get,
    path = "/users/{id}/groups",
    params(("id" = String, Path, description = "Identity provider user id")),
    responses(
        (status = 200, description = "Groups of the user", body = [GroupSummary]),
        (status = 404, description = "User has no groups", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn get_user_groups(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<GroupSummary>>, AppError> {
    let groups = state.directory.get_groups_by_user_id(&id).await?;
    if groups.is_empty() {
        return Err(AppError::not_found(format!("Groups for user {} not found", id)));
    }

    Ok(Json(groups.into_iter().map(GroupSummary::from).collect()))
}

/// Add a user to a group
///
/// `{id}` is the username. The group is looked up by name at `/{app_name}/{group_name}`.
#[utoipa::path(
    put,
    path = "/users/{id}/groups",
    params(("id" = String, Path, description = "Username")),
    request_body = UserGroupRequest,
    responses(
        (status = 204, description = "Membership added"),
        (status = 500, description = "Group not found or update failed", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn put_user_group(
    State(state): State<AppState>,
    Path(username): Path<String>,
    ValidatedJson(req): ValidatedJson<UserGroupRequest>,
) -> Result<StatusCode, AppError> {
    state
        .directory
        .update_user_group(&username, &req.group_name, req.scope())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a user from a group
#[utoipa::path(
    delete,
    path = "/users/{id}/groups",
    params(("id" = String, Path, description = "Username")),
    request_body = UserGroupRequest,
    responses(
        (status = 204, description = "Membership removed"),
        (status = 500, description = "Group not found or update failed", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn delete_user_group(
    State(state): State<AppState>,
    Path(username): Path<String>,
    ValidatedJson(req): ValidatedJson<UserGroupRequest>,
) -> Result<StatusCode, AppError> {
    state
        .directory
        .remove_user_group(&username, &req.group_name, req.scope())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
