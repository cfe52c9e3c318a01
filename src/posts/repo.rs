use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::posts::{
    model::{Comment, Like, Post, PostError},
    repo_types::{CommentRow, LikeRow, PostRow},
};

/// Persistence for the post aggregate. Every mutating call is a single
/// atomic operation against the store.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, post: Post) -> anyhow::Result<Post>;
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<Post>>;
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    async fn delete(&self, id: Uuid, requester: Uuid) -> Result<(), PostError>;
    async fn toggle_like(&self, post_id: Uuid, user: Uuid) -> Result<Vec<Like>, PostError>;
    async fn unlike(&self, post_id: Uuid, user: Uuid) -> Result<Vec<Like>, PostError>;
    async fn add_comment(&self, post_id: Uuid, comment: Comment) -> Result<Vec<Comment>, PostError>;
    async fn delete_comment(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        requester: Uuid,
    ) -> Result<Vec<Comment>, PostError>;
    async fn toggle_comment_like(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        user: Uuid,
    ) -> Result<Vec<Comment>, PostError>;
}

#[derive(Clone)]
pub struct PgPostStore {
    db: PgPool,
}

impl PgPostStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert(&self, post: Post) -> anyhow::Result<Post> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (id, user_id, name, avatar, text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, name, avatar, text, created_at
            "#,
        )
        .bind(post.id)
        .bind(post.user)
        .bind(&post.name)
        .bind(&post.avatar)
        .bind(&post.text)
        .bind(post.date)
        .fetch_one(&self.db)
        .await
        .context("insert post")?;
        Ok(row.into_post(Vec::new(), Vec::new()))
    }

    async fn list(&self) -> anyhow::Result<Vec<Post>> {
        let mut tx = begin_snapshot(&self.db).await?;
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, name, avatar, text, created_at
            FROM posts
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .context("list posts")?;
        let posts = assemble(&mut tx, rows).await?;
        tx.commit().await.context("commit tx")?;
        Ok(posts)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let mut tx = begin_snapshot(&self.db).await?;
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, name, avatar, text, created_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("find post")?;
        let post = match row {
            Some(row) => assemble(&mut tx, vec![row]).await?.pop(),
            None => None,
        };
        tx.commit().await.context("commit tx")?;
        Ok(post)
    }

    async fn delete(&self, id: Uuid, requester: Uuid) -> Result<(), PostError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let author = lock_post(&mut tx, id).await?.ok_or(PostError::PostNotFound)?;
        if author != requester {
            return Err(PostError::NotAuthorized);
        }
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete post")?;
        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn toggle_like(&self, post_id: Uuid, user: Uuid) -> Result<Vec<Like>, PostError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        lock_post(&mut tx, post_id).await?.ok_or(PostError::PostNotFound)?;
        sqlx::query(
            r#"
            WITH removed AS (
                DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2
                RETURNING user_id
            )
            INSERT INTO post_likes (post_id, user_id)
            SELECT $1, $2 WHERE NOT EXISTS (SELECT 1 FROM removed)
            ON CONFLICT (post_id, user_id) DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(user)
        .execute(&mut *tx)
        .await
        .context("toggle post like")?;
        let likes = load_post_likes(&mut tx, post_id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(likes)
    }

    async fn unlike(&self, post_id: Uuid, user: Uuid) -> Result<Vec<Like>, PostError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        lock_post(&mut tx, post_id).await?.ok_or(PostError::PostNotFound)?;
        let res = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user)
            .execute(&mut *tx)
            .await
            .context("remove post like")?;
        if res.rows_affected() == 0 {
            return Err(PostError::NotLiked);
        }
        let likes = load_post_likes(&mut tx, post_id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(likes)
    }

    async fn add_comment(&self, post_id: Uuid, comment: Comment) -> Result<Vec<Comment>, PostError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        lock_post(&mut tx, post_id).await?.ok_or(PostError::PostNotFound)?;
        sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, user_id, name, avatar, text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(comment.id)
        .bind(post_id)
        .bind(comment.user)
        .bind(&comment.name)
        .bind(&comment.avatar)
        .bind(&comment.text)
        .bind(comment.date)
        .execute(&mut *tx)
        .await
        .context("insert comment")?;
        let comments = load_comments_of(&mut tx, post_id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(comments)
    }

    async fn delete_comment(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        requester: Uuid,
    ) -> Result<Vec<Comment>, PostError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        lock_post(&mut tx, post_id).await?.ok_or(PostError::CommentNotFound)?;
        let author = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM comments WHERE id = $1 AND post_id = $2",
        )
        .bind(comment_id)
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await
        .context("find comment")?
        .ok_or(PostError::CommentNotFound)?;
        if author != requester {
            return Err(PostError::NotAuthorized);
        }
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&mut *tx)
            .await
            .context("delete comment")?;
        let comments = load_comments_of(&mut tx, post_id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(comments)
    }

    async fn toggle_comment_like(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        user: Uuid,
    ) -> Result<Vec<Comment>, PostError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        lock_post(&mut tx, post_id).await?.ok_or(PostError::CommentNotFound)?;
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM comments WHERE id = $1 AND post_id = $2)",
        )
        .bind(comment_id)
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .context("find comment")?;
        if !exists {
            return Err(PostError::CommentNotFound);
        }
        sqlx::query(
            r#"
            WITH removed AS (
                DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2
                RETURNING user_id
            )
            INSERT INTO comment_likes (comment_id, user_id)
            SELECT $1, $2 WHERE NOT EXISTS (SELECT 1 FROM removed)
            ON CONFLICT (comment_id, user_id) DO NOTHING
            "#,
        )
        .bind(comment_id)
        .bind(user)
        .execute(&mut *tx)
        .await
        .context("toggle comment like")?;
        let comments = load_comments_of(&mut tx, post_id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(comments)
    }
}

/// Read-only transaction on a single snapshot: a post, its likes, its comments
/// and their likes are read as of the same instant.
async fn begin_snapshot(db: &PgPool) -> anyhow::Result<Transaction<'static, Postgres>> {
    let mut tx = db.begin().await.context("begin tx")?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await
        .context("set snapshot isolation")?;
    Ok(tx)
}

/// Row-locks the post for the rest of the transaction and returns its author.
async fn lock_post(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let author = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("lock post")?;
    Ok(author)
}

async fn load_post_likes(conn: &mut PgConnection, post_id: Uuid) -> anyhow::Result<Vec<Like>> {
    let users = sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM post_likes WHERE post_id = $1 ORDER BY seq DESC",
    )
    .bind(post_id)
    .fetch_all(&mut *conn)
    .await
    .context("load post likes")?;
    Ok(users.into_iter().map(|user| Like { user }).collect())
}

async fn load_comments_of(conn: &mut PgConnection, post_id: Uuid) -> anyhow::Result<Vec<Comment>> {
    let mut by_post = load_comments(conn, &[post_id]).await?;
    Ok(by_post.remove(&post_id).unwrap_or_default())
}

async fn load_comments(
    conn: &mut PgConnection,
    post_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<Comment>>> {
    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT id, post_id, user_id, name, avatar, text, created_at
        FROM comments
        WHERE post_id = ANY($1)
        ORDER BY seq DESC
        "#,
    )
    .bind(post_ids)
    .fetch_all(&mut *conn)
    .await
    .context("load comments")?;

    let likes = sqlx::query_as::<_, LikeRow>(
        r#"
        SELECT cl.comment_id AS parent_id, cl.user_id
        FROM comment_likes cl
        JOIN comments c ON c.id = cl.comment_id
        WHERE c.post_id = ANY($1)
        ORDER BY cl.seq DESC
        "#,
    )
    .bind(post_ids)
    .fetch_all(&mut *conn)
    .await
    .context("load comment likes")?;
    let mut likes = group_likes(likes);

    let mut out: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    for row in rows {
        let comment_likes = likes.remove(&row.id).unwrap_or_default();
        out.entry(row.post_id)
            .or_default()
            .push(row.into_comment(comment_likes));
    }
    Ok(out)
}

/// Attaches likes and comments to each post row, keeping row order.
async fn assemble(conn: &mut PgConnection, rows: Vec<PostRow>) -> anyhow::Result<Vec<Post>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let likes = sqlx::query_as::<_, LikeRow>(
        r#"
        SELECT post_id AS parent_id, user_id
        FROM post_likes
        WHERE post_id = ANY($1)
        ORDER BY seq DESC
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .context("load post likes")?;
    let mut likes = group_likes(likes);
    let mut comments = load_comments(conn, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let post_likes = likes.remove(&row.id).unwrap_or_default();
            let post_comments = comments.remove(&row.id).unwrap_or_default();
            row.into_post(post_likes, post_comments)
        })
        .collect())
}

fn group_likes(rows: Vec<LikeRow>) -> HashMap<Uuid, Vec<Like>> {
    let mut out: HashMap<Uuid, Vec<Like>> = HashMap::new();
    for row in rows {
        out.entry(row.parent_id)
            .or_default()
            .push(Like { user: row.user_id });
    }
    out
}
