//! Process-local store used when no database is configured, and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserStore,
        repo_types::{NewUser, User},
    },
    posts::{
        model::{Comment, Like, Post, PostError},
        repo::PostStore,
    },
};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    // newest first
    posts: RwLock<Vec<Post>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against one post while holding the write lock.
    async fn with_post<T>(
        &self,
        id: Uuid,
        missing: PostError,
        f: impl FnOnce(&mut Post) -> Result<T, PostError> + Send,
    ) -> Result<T, PostError> {
        let mut posts = self.posts.write().await;
        let post = posts.iter_mut().find(|p| p.id == id).ok_or(missing)?;
        f(post)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Ok(None);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            avatar: new.avatar,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(Some(user))
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert(&self, post: Post) -> anyhow::Result<Post> {
        self.posts.write().await.insert(0, post.clone());
        Ok(post)
    }

    async fn list(&self) -> anyhow::Result<Vec<Post>> {
        let mut posts = self.posts.read().await.clone();
        posts.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(posts)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let posts = self.posts.read().await;
        Ok(posts.iter().find(|p| p.id == id).cloned())
    }

    async fn delete(&self, id: Uuid, requester: Uuid) -> Result<(), PostError> {
        let mut posts = self.posts.write().await;
        let idx = posts
            .iter()
            .position(|p| p.id == id)
            .ok_or(PostError::PostNotFound)?;
        if posts[idx].user != requester {
            return Err(PostError::NotAuthorized);
        }
        posts.remove(idx);
        Ok(())
    }

    async fn toggle_like(&self, post_id: Uuid, user: Uuid) -> Result<Vec<Like>, PostError> {
        self.with_post(post_id, PostError::PostNotFound, |post| {
            post.toggle_like(user);
            Ok(post.likes.clone())
        })
        .await
    }

    async fn unlike(&self, post_id: Uuid, user: Uuid) -> Result<Vec<Like>, PostError> {
        self.with_post(post_id, PostError::PostNotFound, |post| {
            post.unlike(user)?;
            Ok(post.likes.clone())
        })
        .await
    }

    async fn add_comment(&self, post_id: Uuid, comment: Comment) -> Result<Vec<Comment>, PostError> {
        self.with_post(post_id, PostError::PostNotFound, |post| {
            post.add_comment(comment);
            Ok(post.comments.clone())
        })
        .await
    }

    async fn delete_comment(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        requester: Uuid,
    ) -> Result<Vec<Comment>, PostError> {
        self.with_post(post_id, PostError::CommentNotFound, |post| {
            post.remove_comment(comment_id, requester)?;
            Ok(post.comments.clone())
        })
        .await
    }

    async fn toggle_comment_like(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        user: Uuid,
    ) -> Result<Vec<Comment>, PostError> {
        self.with_post(post_id, PostError::CommentNotFound, |post| {
            post.toggle_comment_like(comment_id, user)?;
            Ok(post.comments.clone())
        })
        .await
    }
}
