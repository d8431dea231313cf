use chrono::NaiveDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_staff: bool,
    pub is_active: bool,
}

/// Extra row associated with every [`User`]: profile text, moderation
/// extras and the coordinates the attendee map used to show.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserInfo {
    pub user_id: i64,
    pub info: String,
    pub karma: i64,
    pub is_shadow_banned: bool,
    pub need_ride: bool,
    pub formatted_address: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub notify_message: bool,
    pub notify_news: bool,
}

/// A news article, or a forum thread when `is_forum` is set.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub author_id: Option<i64>,
    /// Username joined from `users`; absent for anonymous or deleted
    /// authors.
    pub author: Option<String>,
    pub title: String,
    pub slug: String,
    pub published: NaiveDateTime,
    pub last_activity: NaiveDateTime,
    pub content: String,
    /// Count of non-deleted, non-removed comments, maintained
    /// incrementally and repairable in bulk.
    pub comment_count: i64,
    pub is_visible: bool,
    pub is_forum: bool,
    pub is_removed: bool,
    pub is_deleted: bool,
    pub ip: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub author_id: Option<i64>,
    pub author: Option<String>,
    pub published: NaiveDateTime,
    pub parent_id: Option<i64>,
    pub content: String,
    pub ups: i64,
    pub downs: i64,
    /// Always equals `ups - downs`.
    pub karma: i64,
    /// Set by a moderator; the author is never shown this flag.
    pub is_removed: bool,
    /// Set by the author; terminal, content is scrubbed.
    pub is_deleted: bool,
    pub ip: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub from_user: String,
    pub to_user: String,
    pub published: NaiveDateTime,
    pub content: String,
    pub is_read: bool,
    pub is_deleted: bool,
}

/// Blocklist entry checked against new posts; literal substring match
/// unless `is_regex` is set.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SpamText {
    pub id: i64,
    pub text: String,
    pub is_regex: bool,
}
