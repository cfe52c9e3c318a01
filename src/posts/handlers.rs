use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppJson, AppResult},
    posts::{
        dto::{MessageResponse, TextRequest},
        model::{Comment, Like, Post, PostError},
        services,
    },
    state::AppState,
};

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post).get(list_posts))
        .route("/posts/:id", get(get_post).delete(delete_post))
        .route("/posts/like/:id", put(like_post))
        .route("/posts/unlike/:id", put(unlike_post))
        .route("/posts/comment/:id", post(add_comment))
        .route("/posts/comment/:id/:comment_id", delete(delete_comment))
        .route("/posts/likecomment/:post_id/:comment_id", put(like_comment))
}

/// Ids that are not UUIDs cannot name anything, so they read as "not found".
fn parse_id(raw: &str, missing: PostError) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::from(missing))
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(payload): AppJson<TextRequest>,
) -> AppResult<Json<Post>> {
    Ok(Json(services::create_post(&state, user_id, payload.text).await?))
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(services::list_posts(&state).await?))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let id = parse_id(&id, PostError::PostNotFound)?;
    Ok(Json(services::get_post(&state, id).await?))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&id, PostError::PostNotFound)?;
    services::delete_post(&state, id, user_id).await?;
    Ok(Json(MessageResponse {
        msg: "post removed".into(),
    }))
}

#[instrument(skip(state))]
pub async fn like_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Like>>> {
    let id = parse_id(&id, PostError::PostNotFound)?;
    Ok(Json(services::toggle_like(&state, id, user_id).await?))
}

#[instrument(skip(state))]
pub async fn unlike_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Like>>> {
    let id = parse_id(&id, PostError::PostNotFound)?;
    Ok(Json(services::unlike(&state, id, user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn add_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    AppJson(payload): AppJson<TextRequest>,
) -> AppResult<Json<Vec<Comment>>> {
    let id = parse_id(&id, PostError::PostNotFound)?;
    Ok(Json(
        services::add_comment(&state, id, user_id, payload.text).await?,
    ))
}

#[instrument(skip(state))]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> AppResult<Json<Vec<Comment>>> {
    let id = parse_id(&id, PostError::CommentNotFound)?;
    let comment_id = parse_id(&comment_id, PostError::CommentNotFound)?;
    Ok(Json(
        services::delete_comment(&state, id, comment_id, user_id).await?,
    ))
}

#[instrument(skip(state))]
pub async fn like_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Json<Vec<Comment>>> {
    let post_id = parse_id(&post_id, PostError::CommentNotFound)?;
    let comment_id = parse_id(&comment_id, PostError::CommentNotFound)?;
    Ok(Json(
        services::toggle_comment_like(&state, post_id, comment_id, user_id).await?,
    ))
}
