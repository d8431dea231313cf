use serde::{Deserialize, Serialize};

// ----------------- User Requests -----------------
#[derive(Deserialize, Serialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

// ----------------- Article / Thread Requests -----------------
#[derive(Deserialize, Serialize, Debug)]
pub struct ThreadNewRequest {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(default)]
pub struct ArticleEditRequest {
    pub article_slug: String,
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ArticleSlugRequest {
    pub article_slug: String,
}

/// `action` is `remove`/`unremove` for moderation, `forum`/`news` for
/// conversion.
#[derive(Deserialize, Serialize, Debug)]
pub struct ArticleActionRequest {
    pub article_slug: String,
    pub action: String,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(default)]
pub struct ArticleListParams {
    pub forum: Option<bool>,
}

// ----------------- Comment Requests -----------------
#[derive(Deserialize, Serialize, Debug)]
pub struct CommentNewRequest {
    pub article_slug: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CommentIdRequest {
    pub comment_id: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CommentEditRequest {
    pub comment_id: i64,
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CommentActionRequest {
    pub comment_id: i64,
    pub action: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CommentVoteRequest {
    pub comment: i64,
}

// ----------------- Message Requests -----------------
#[derive(Deserialize, Serialize, Debug)]
pub struct MessageSendRequest {
    pub to_username: String,
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct MessageIdRequest {
    pub message_id: i64,
}

// ----------------- Moderation Requests -----------------
#[derive(Deserialize, Serialize, Debug)]
pub struct ShadowbanRequest {
    pub username: String,
    pub action: String,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(default)]
pub struct PruneVotesRequest {
    pub days: Option<i64>,
}
