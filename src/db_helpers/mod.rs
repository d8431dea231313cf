use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::errors::ApiError;
use crate::models::{User, UserInfo};
use crate::visibility::Viewer;

mod article_helpers;
mod comment_helpers;
mod message_helpers;
mod user_helpers;
mod vote_helpers;

pub use article_helpers::*;
pub use comment_helpers::*;
pub use message_helpers::*;
pub use user_helpers::*;
pub use vote_helpers::*;

pub(crate) type Tx<'a> = Transaction<'a, Sqlite>;

/// Builds partial UPDATE statements for requests where every field is
/// optional, binding only what the caller supplied.
struct UpdateBuilder {
    assignments: Vec<&'static str>,
    params: Vec<String>,
}

impl UpdateBuilder {
    fn new() -> Self {
        UpdateBuilder {
            assignments: Vec::new(),
            params: Vec::new(),
        }
    }

    fn set(mut self, assignment: &'static str, param: Option<String>) -> Self {
        if let Some(value) = param {
            self.assignments.push(assignment);
            self.params.push(value);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Returns the SET clause and its bind params, in order.
    fn build(self) -> (String, Vec<String>) {
        (self.assignments.join(", "), self.params)
    }
}

// ----------------- Helper Functions -----------------

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, ApiError> {
    let result = sqlx::query_as::<Sqlite, User>(
        "SELECT id, created_at, username, email, password, is_staff, is_active
         FROM users WHERE id = $1 AND is_active = TRUE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(result)
}

pub async fn get_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, ApiError> {
    let result = sqlx::query_as::<Sqlite, User>(
        "SELECT id, created_at, username, email, password, is_staff, is_active
         FROM users WHERE username = $1 AND is_active = TRUE",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(result)
}

pub async fn get_user_info(pool: &SqlitePool, user_id: i64) -> Result<UserInfo, ApiError> {
    let result = sqlx::query_as::<Sqlite, UserInfo>(
        "SELECT user_id, info, karma, is_shadow_banned, need_ride, formatted_address,
                country, region, city, lat, lng, notify_message, notify_news
         FROM user_info WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    result.ok_or(ApiError::NotFound("user not found"))
}

/// Resolves the authenticated user or reports the not-logged-in error.
pub async fn require_user(pool: &SqlitePool, id: Option<i64>) -> Result<User, ApiError> {
    match id {
        Some(id) => get_user_by_id(pool, id)
            .await?
            .ok_or(ApiError::NotAuthenticated),
        None => Err(ApiError::NotAuthenticated),
    }
}

pub async fn require_staff(pool: &SqlitePool, id: Option<i64>) -> Result<User, ApiError> {
    let user = require_user(pool, id).await?;
    if !user.is_staff {
        return Err(ApiError::Forbidden("insufficient vespene gas"));
    }
    Ok(user)
}

/// Builds the per-request [`Viewer`] the visibility mask works with.
pub async fn viewer_for(
    pool: &SqlitePool,
    user_id: Option<i64>,
    ip: &str,
) -> Result<Viewer, ApiError> {
    let is_staff = match user_id {
        Some(id) => get_user_by_id(pool, id)
            .await?
            .map(|user| user.is_staff)
            .unwrap_or(false),
        None => false,
    };
    Ok(Viewer {
        user_id,
        is_staff,
        ip: ip.to_string(),
    })
}

pub(crate) async fn send_notification(
    tx: &mut Tx<'_>,
    user_id: i64,
    url: &str,
    message: &str,
) -> Result<(), ApiError> {
    sqlx::query("INSERT INTO notifications (user_id, url, message) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(url)
        .bind(message)
        .execute(tx)
        .await?;
    Ok(())
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}
