//! The post aggregate: a post owns its likes and its comments, and each
//! comment owns its own likes.
//!
//! Author name and avatar are copied onto posts and comments when they are
//! created and are not refreshed when the profile changes later, so reads
//! never need to join against users.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::repo_types::User, error::AppError};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post not found")]
    PostNotFound,

    #[error("comment does not exist")]
    CommentNotFound,

    #[error("user not authorized")]
    NotAuthorized,

    #[error("post has not yet been liked")]
    NotLiked,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<PostError> for AppError {
    fn from(e: PostError) -> Self {
        match e {
            PostError::PostNotFound | PostError::CommentNotFound => AppError::NotFound(e.to_string()),
            PostError::NotAuthorized => AppError::Authorization(e.to_string()),
            PostError::NotLiked => AppError::State(e.to_string()),
            PostError::Store(e) => AppError::Server(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub user: Uuid,
}

/// Author fields captured at creation time.
#[derive(Debug, Clone)]
pub struct AuthorSnapshot {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
}

impl From<&User> for AuthorSnapshot {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            avatar: u.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    pub avatar: String,
    pub text: String,
    pub comment_likes: Vec<Like>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

impl Comment {
    pub fn new(author: &AuthorSnapshot, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: author.id,
            name: author.name.clone(),
            avatar: author.avatar.clone(),
            text,
            comment_likes: Vec::new(),
            date: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    pub avatar: String,
    pub text: String,
    pub likes: Vec<Like>,
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

impl Post {
    pub fn new(author: &AuthorSnapshot, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: author.id,
            name: author.name.clone(),
            avatar: author.avatar.clone(),
            text,
            likes: Vec::new(),
            comments: Vec::new(),
            date: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` when the user now likes the post.
    pub fn toggle_like(&mut self, user: Uuid) -> bool {
        toggle(&mut self.likes, user)
    }

    pub fn unlike(&mut self, user: Uuid) -> Result<(), PostError> {
        let idx = position(&self.likes, user).ok_or(PostError::NotLiked)?;
        self.likes.remove(idx);
        Ok(())
    }

    /// Newest comment goes first.
    pub fn add_comment(&mut self, comment: Comment) -> &Comment {
        self.comments.insert(0, comment);
        &self.comments[0]
    }

    pub fn remove_comment(&mut self, comment_id: Uuid, requester: Uuid) -> Result<Comment, PostError> {
        let idx = self
            .comments
            .iter()
            .position(|c| c.id == comment_id)
            .ok_or(PostError::CommentNotFound)?;
        if self.comments[idx].user != requester {
            return Err(PostError::NotAuthorized);
        }
        Ok(self.comments.remove(idx))
    }

    /// Returns `true` when the user now likes the comment.
    pub fn toggle_comment_like(&mut self, comment_id: Uuid, user: Uuid) -> Result<bool, PostError> {
        let comment = self
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or(PostError::CommentNotFound)?;
        Ok(toggle(&mut comment.comment_likes, user))
    }
}

fn position(likes: &[Like], user: Uuid) -> Option<usize> {
    likes.iter().position(|l| l.user == user)
}

// remove if present, else prepend
fn toggle(likes: &mut Vec<Like>, user: Uuid) -> bool {
    match position(likes, user) {
        Some(idx) => {
            likes.remove(idx);
            false
        }
        None => {
            likes.insert(0, Like { user });
            true
        }
    }
}
