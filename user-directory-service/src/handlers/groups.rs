use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::users::ScopeQuery;
use crate::dtos::ErrorResponse;
use crate::models::GroupSummary;
use crate::startup::AppState;

/// Flattened group list ordered by level
#[utoipa::path(
    get,
    path = "/groups",
    params(ScopeQuery),
    responses(
        (status = 200, description = "Groups in scope", body = [GroupSummary]),
        (status = 502, description = "Identity provider unreachable", body = ErrorResponse)
    ),
    tag = "Groups"
)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<GroupSummary>>, AppError> {
    let groups = state.directory.get_groups(query.scope()).await?;
    Ok(Json(groups.into_iter().map(GroupSummary::from).collect()))
}
