use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::posts::model::{Comment, Like, Post};

#[derive(Debug, FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub avatar: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub avatar: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

/// A like on either a post or a comment; `parent_id` is whichever it hangs off.
#[derive(Debug, FromRow)]
pub struct LikeRow {
    pub parent_id: Uuid,
    pub user_id: Uuid,
}

impl PostRow {
    pub fn into_post(self, likes: Vec<Like>, comments: Vec<Comment>) -> Post {
        Post {
            id: self.id,
            user: self.user_id,
            name: self.name,
            avatar: self.avatar,
            text: self.text,
            likes,
            comments,
            date: self.created_at,
        }
    }
}

impl CommentRow {
    pub fn into_comment(self, comment_likes: Vec<Like>) -> Comment {
        Comment {
            id: self.id,
            user: self.user_id,
            name: self.name,
            avatar: self.avatar,
            text: self.text,
            comment_likes,
            date: self.created_at,
        }
    }
}
