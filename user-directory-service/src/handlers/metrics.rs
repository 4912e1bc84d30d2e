use axum::response::IntoResponse;

pub async fn metrics() -> impl IntoResponse {
    (
        [("content-type", "text/plain; charset=utf-8")],
        crate::services::get_metrics(),
    )
}
