use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, FieldError},
    posts::model::{AuthorSnapshot, Comment, Like, Post, PostError},
    state::AppState,
};

fn require_text(text: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::Validation(vec![FieldError::new("text", "Text is required")]));
    }
    Ok(())
}

/// Name and avatar as they are right now; copied onto the new post/comment.
async fn author_snapshot(state: &AppState, user_id: Uuid) -> AppResult<AuthorSnapshot> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(user_id = %user_id, "token for unknown user");
        AppError::Auth("User not found".into())
    })?;
    Ok(AuthorSnapshot::from(&user))
}

pub async fn create_post(state: &AppState, author_id: Uuid, text: String) -> AppResult<Post> {
    require_text(&text)?;
    let author = author_snapshot(state, author_id).await?;
    let post = state.posts.insert(Post::new(&author, text)).await?;
    info!(post_id = %post.id, user_id = %author_id, "post created");
    Ok(post)
}

pub async fn list_posts(state: &AppState) -> AppResult<Vec<Post>> {
    Ok(state.posts.list().await?)
}

pub async fn get_post(state: &AppState, id: Uuid) -> AppResult<Post> {
    state
        .posts
        .find(id)
        .await?
        .ok_or_else(|| PostError::PostNotFound.into())
}

pub async fn delete_post(state: &AppState, id: Uuid, requester: Uuid) -> AppResult<()> {
    state.posts.delete(id, requester).await.map_err(|e| {
        warn!(post_id = %id, user_id = %requester, error = %e, "delete post rejected");
        e
    })?;
    info!(post_id = %id, user_id = %requester, "post removed");
    Ok(())
}

pub async fn toggle_like(state: &AppState, post_id: Uuid, user: Uuid) -> AppResult<Vec<Like>> {
    Ok(state.posts.toggle_like(post_id, user).await?)
}

pub async fn unlike(state: &AppState, post_id: Uuid, user: Uuid) -> AppResult<Vec<Like>> {
    Ok(state.posts.unlike(post_id, user).await?)
}

pub async fn add_comment(
    state: &AppState,
    post_id: Uuid,
    author_id: Uuid,
    text: String,
) -> AppResult<Vec<Comment>> {
    require_text(&text)?;
    let author = author_snapshot(state, author_id).await?;
    let comments = state
        .posts
        .add_comment(post_id, Comment::new(&author, text))
        .await?;
    info!(post_id = %post_id, user_id = %author_id, "comment added");
    Ok(comments)
}

pub async fn delete_comment(
    state: &AppState,
    post_id: Uuid,
    comment_id: Uuid,
    requester: Uuid,
) -> AppResult<Vec<Comment>> {
    let comments = state
        .posts
        .delete_comment(post_id, comment_id, requester)
        .await
        .map_err(|e| {
            warn!(%post_id, %comment_id, user_id = %requester, error = %e, "delete comment rejected");
            e
        })?;
    info!(%post_id, %comment_id, "comment removed");
    Ok(comments)
}

pub async fn toggle_comment_like(
    state: &AppState,
    post_id: Uuid,
    comment_id: Uuid,
    user: Uuid,
) -> AppResult<Vec<Comment>> {
    Ok(state
        .posts
        .toggle_comment_like(post_id, comment_id, user)
        .await?)
}
