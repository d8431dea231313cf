use chrono::{Duration, Utc};
use sqlx::{Sqlite, SqlitePool};

use crate::config::Settings;
use crate::errors::ApiError;
use crate::models::{Message, User};

use super::send_notification;

const MESSAGE_QUERY: &str = "
    SELECT messages.id,
           messages.from_user_id,
           messages.to_user_id,
           senders.username AS from_user,
           recipients.username AS to_user,
           messages.published,
           messages.content,
           messages.is_read,
           messages.is_deleted
    FROM messages
        JOIN users AS senders ON senders.id = messages.from_user_id
        JOIN users AS recipients ON recipients.id = messages.to_user_id
";

pub async fn get_message(pool: &SqlitePool, id: i64) -> Result<Option<Message>, ApiError> {
    let result = sqlx::query_as::<Sqlite, Message>(&format!(
        "{MESSAGE_QUERY} WHERE messages.id = $1 AND messages.is_deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(result)
}

/// Sends a private message, with the short between-message cooldown and
/// the daily cap applied to the sender. Writes the recipient's
/// notification in the same transaction.
pub async fn send_message(
    pool: &SqlitePool,
    settings: &Settings,
    sender: &User,
    recipient: &User,
    content: &str,
) -> Result<Message, ApiError> {
    let now = Utc::now().naive_utc();
    if !settings.debug && !sender.is_staff {
        let last: Option<chrono::NaiveDateTime> = sqlx::query_scalar(
            "SELECT published FROM messages WHERE from_user_id = $1
             ORDER BY published DESC LIMIT 1",
        )
        .bind(sender.id)
        .fetch_optional(pool)
        .await?;
        if let Some(last) = last {
            if (now - last).num_seconds() < settings.limit_message_secs {
                return Err(ApiError::RateLimited("hey slow down a little!".to_string()));
            }
        }
        let today: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE from_user_id = $1 AND published > $2",
        )
        .bind(sender.id)
        .bind(now - Duration::days(1))
        .fetch_one(pool)
        .await?;
        if today >= settings.limit_messages_day {
            return Err(ApiError::RateLimited(
                "you have sent too many messages today".to_string(),
            ));
        }
    }

    let mut tx = pool.begin().await?;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO messages (from_user_id, to_user_id, published, content)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(sender.id)
    .bind(recipient.id)
    .bind(now)
    .bind(content)
    .fetch_one(&mut tx)
    .await?;
    let url = format!("/users/{}/", sender.username);
    let message = format!("{} sent you a message", sender.username);
    send_notification(&mut tx, recipient.id, &url, &message).await?;
    tx.commit().await?;

    get_message(pool, id)
        .await?
        .ok_or(ApiError::NotFound("message not found"))
}

/// Both ends of the conversation may delete; content is scrubbed.
pub async fn delete_message(
    pool: &SqlitePool,
    actor_id: i64,
    message_id: i64,
) -> Result<(), ApiError> {
    let message = get_message(pool, message_id)
        .await?
        .ok_or(ApiError::NotFound("message not found"))?;
    if actor_id != message.from_user_id && actor_id != message.to_user_id {
        return Err(ApiError::Forbidden(
            "you didn't send or receive that message",
        ));
    }
    sqlx::query("UPDATE messages SET is_deleted = TRUE, content = '' WHERE id = $1")
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}
