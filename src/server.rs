use std::sync::Arc;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::booru::Booru;
use crate::cancel::CancelToken;
use crate::construct::{Post, PostId};
use crate::error::TagbooruError;

#[derive(Clone)]
pub struct AppState {
    booru: Arc<Booru>,
    page_length: u64,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub length: Option<u64>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub page: u64,
    pub length: u64,
    /// Set only when this page was full.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<u64>,
    pub posts: Vec<Post>,
}

#[derive(Deserialize)]
pub struct CountRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub query: String,
    pub count: u64,
}

#[derive(Deserialize)]
pub struct NewPostRequest {
    pub post: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct NewPostResponse {
    pub id: PostId,
}

#[derive(Deserialize)]
pub struct TagRequest {
    pub tag: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(TagbooruError);

impl From<TagbooruError> for ApiError {
    fn from(e: TagbooruError) -> Self {
        Self(e)
    }
}

pub fn status_for(error: &TagbooruError) -> StatusCode {
    match error {
        TagbooruError::Parse { .. }
        | TagbooruError::PatternCompile(_)
        | TagbooruError::PatternNoMatch(_) => StatusCode::BAD_REQUEST,
        TagbooruError::InvalidPostId(_)
        | TagbooruError::PostNotFound(_)
        | TagbooruError::BaselineNotFound(_) => StatusCode::NOT_FOUND,
        TagbooruError::DuplicatePost(_) | TagbooruError::DuplicateTag { .. } => StatusCode::CONFLICT,
        TagbooruError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let msg = self.0.to_string();
        warn!(%msg, code = %status.as_u16(), "request error");
        (status, Json(ErrorResponse { error: msg })).into_response()
    }
}

// The facade is synchronous, so every request runs on a blocking thread.
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Booru) -> crate::error::Result<T> + Send + 'static,
{
    let booru = Arc::clone(&state.booru);
    tokio::task::spawn_blocking(move || work(&booru))
        .await
        .map_err(|e| {
            warn!(error = %e, "Join error");
            ApiError(TagbooruError::Invariant(format!("join error: {e}")))
        })?
        .map_err(ApiError)
}

// Query work is cancelled as soon as axum drops the request future, which
// happens when the client disconnects.
async fn cancellable<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Booru, &CancelToken) -> crate::error::Result<T> + Send + 'static,
{
    let token = CancelToken::new();
    let _guard = token.drop_guard();
    let caller = token.clone();
    blocking(state, move |booru| work(booru, &caller)).await
}

async fn search(
    State(state): State<AppState>,
    Query(request): Query<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let SearchRequest { query, page, length } = request;
    let length = length.unwrap_or(state.page_length);
    let text = query.clone();
    let started = std::time::Instant::now();
    let posts = cancellable(&state, move |booru, token| {
        booru.query_with(token, &text, page, length)
    }).await?;
    let full = length > 0 && posts.len() as u64 == length;
    info!(
        ms = started.elapsed().as_secs_f64() * 1000.0,
        posts = posts.len(),
        "search complete"
    );
    Ok(Json(SearchResponse {
        query,
        page,
        length,
        next: full.then_some(page + 1),
        posts,
    }))
}

async fn count(
    State(state): State<AppState>,
    Query(request): Query<CountRequest>,
) -> Result<Json<CountResponse>, ApiError> {
    let text = request.query.clone();
    let count = cancellable(&state, move |booru, token| booru.count_with(token, &text)).await?;
    Ok(Json(CountResponse {
        query: request.query,
        count,
    }))
}

async fn generate_indexes(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    blocking(&state, |booru| booru.generate_indexes()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn new_post(
    State(state): State<AppState>,
    Json(request): Json<NewPostRequest>,
) -> Result<(StatusCode, Json<NewPostResponse>), ApiError> {
    let timestamp = request.timestamp.unwrap_or_else(Utc::now);
    let id = blocking(&state, move |booru| booru.new_post(&request.post, timestamp)).await?;
    Ok((StatusCode::CREATED, Json(NewPostResponse { id })))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
) -> Result<Json<Post>, ApiError> {
    let post = blocking(&state, move |booru| booru.post_by_id(id)).await?;
    Ok(Json(post))
}

async fn tag_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
    Json(request): Json<TagRequest>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |booru| booru.tag_post(id, &request.tag)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn untag_post(
    State(state): State<AppState>,
    Path((id, tag)): Path<(PostId, String)>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |booru| booru.untag_post(id, &tag)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(booru: Arc<Booru>, page_length: u64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);
    Router::new()
        .route("/v1/search", get(search))
        .route("/v1/count", get(count))
        .route("/v1/index", post(generate_indexes))
        .route("/v1/posts", post(new_post))
        .route("/v1/posts/:id", get(get_post))
        .route("/v1/posts/:id/tags", post(tag_post))
        .route("/v1/posts/:id/tags/:tag", delete(untag_post))
        .with_state(AppState { booru, page_length })
        .layer(cors)
}
