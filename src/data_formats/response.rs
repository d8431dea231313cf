use serde::{Deserialize, Serialize};

use crate::comment_tree::CommentView;
use crate::models::{Article, Message, User};

#[derive(Deserialize, Serialize, Debug)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub token: String,
}

impl UserResponse {
    pub fn new(user: &User, token: String) -> Self {
        UserResponse {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            token,
        }
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ArticleResponse {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub author: Option<String>,
    pub published: String,
    pub content: String,
    pub comment_count: i64,
    pub is_visible: bool,
    pub is_forum: bool,
    pub is_removed: bool,
    pub is_deleted: bool,
}

impl ArticleResponse {
    /// `effectively_removed` is the per-viewer flag; the stored one never
    /// reaches the wire.
    pub fn new(article: &Article, effectively_removed: bool) -> Self {
        ArticleResponse {
            id: article.id,
            title: article.title.clone(),
            slug: article.slug.clone(),
            author: article.author.clone(),
            published: article.published.to_string(),
            content: if effectively_removed || article.is_deleted {
                String::new()
            } else {
                article.content.clone()
            },
            comment_count: article.comment_count,
            is_visible: article.is_visible,
            is_forum: article.is_forum,
            is_removed: effectively_removed,
            is_deleted: article.is_deleted,
        }
    }
}

/// An article plus its comment forest, already masked for the viewer.
#[derive(Deserialize, Serialize, Debug)]
pub struct ArticlePageResponse {
    #[serde(flatten)]
    pub article: ArticleResponse,
    pub comments: Vec<CommentView>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct MessageResponse {
    pub id: i64,
    pub from_user: String,
    pub to_user: String,
    pub published: String,
    pub content: String,
}

impl MessageResponse {
    pub fn new(message: &Message) -> Self {
        MessageResponse {
            id: message.id,
            from_user: message.from_user.clone(),
            to_user: message.to_user.clone(),
            published: message.published.to_string(),
            content: message.content.clone(),
        }
    }
}
