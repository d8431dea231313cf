use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};

use crate::config::Settings;
use crate::errors::ApiError;
use crate::models::{Article, Comment};

use super::{send_notification, Tx};

const COMMENT_QUERY: &str = "
    SELECT comments.id,
           comments.article_id,
           comments.author_id,
           users.username AS author,
           comments.published,
           comments.parent_id,
           comments.content,
           comments.ups,
           comments.downs,
           comments.karma,
           comments.is_removed,
           comments.is_deleted,
           comments.ip
    FROM comments
        LEFT JOIN users ON users.id = comments.author_id
";

pub async fn get_comment(pool: &SqlitePool, id: i64) -> Result<Option<Comment>, ApiError> {
    let result = sqlx::query_as::<Sqlite, Comment>(&format!(
        "{COMMENT_QUERY} WHERE comments.id = $1 AND comments.is_deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(result)
}

/// All comments of one article in rendering order: karma first, newest
/// first within equal karma. Deleted comments are included because their
/// replies still hang off them; their content was scrubbed at delete
/// time.
pub async fn comments_for_article(
    pool: &SqlitePool,
    article_id: i64,
) -> Result<Vec<Comment>, ApiError> {
    let result = sqlx::query_as::<Sqlite, Comment>(&format!(
        "{COMMENT_QUERY}
         WHERE comments.article_id = $1
         ORDER BY comments.karma DESC, comments.published DESC"
    ))
    .bind(article_id)
    .fetch_all(pool)
    .await?;
    Ok(result)
}

/// The viewer's own votes on an article's comments, as
/// (comment_id, vote) pairs, for the upvoted/downvoted annotations.
pub async fn votes_for_viewer(
    pool: &SqlitePool,
    article_id: i64,
    user_id: i64,
) -> Result<Vec<(i64, i64)>, ApiError> {
    let result = sqlx::query_as::<Sqlite, (i64, i64)>(
        "SELECT comment_votes.comment_id, comment_votes.vote
         FROM comment_votes
             JOIN comments ON comments.id = comment_votes.comment_id
         WHERE comments.article_id = $1 AND comment_votes.user_id = $2",
    )
    .bind(article_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(result)
}

/// Walks the parent chain to measure how deep a reply would sit.
async fn reply_depth(tx: &mut Tx<'_>, parent: &Comment, max_depth: i64) -> Result<i64, ApiError> {
    let mut depth = 2; // the parent plus the reply being posted
    let mut cursor = parent.parent_id;
    while let Some(id) = cursor {
        depth += 1;
        if depth > max_depth {
            break;
        }
        cursor = sqlx::query_scalar::<Sqlite, Option<i64>>(
            "SELECT parent_id FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .flatten();
    }
    Ok(depth)
}

/// Inserts a comment under one transaction together with its side
/// effects: the article's denormalized counter and activity bump, and a
/// reply notification. A comment the spam gate flagged is stored removed
/// and never counted.
pub async fn create_comment(
    pool: &SqlitePool,
    settings: &Settings,
    article: &Article,
    author_id: Option<i64>,
    author_name: Option<&str>,
    parent_id: Option<i64>,
    content: &str,
    flagged: bool,
    ip: &str,
) -> Result<Comment, ApiError> {
    let mut tx = pool.begin().await?;

    let parent = match parent_id {
        Some(parent_id) => {
            let parent = sqlx::query_as::<Sqlite, Comment>(&format!(
                "{COMMENT_QUERY}
                 WHERE comments.id = $1
                   AND comments.article_id = $2
                   AND comments.is_deleted = FALSE"
            ))
            .bind(parent_id)
            .bind(article.id)
            .fetch_optional(&mut tx)
            .await?;
            let parent = parent.ok_or(ApiError::NotFound("parent comment not found"))?;
            if reply_depth(&mut tx, &parent, settings.max_comment_depth).await?
                > settings.max_comment_depth
            {
                return Err(ApiError::invalid("comment nested too deep"));
            }
            Some(parent)
        }
        None => None,
    };

    let now = Utc::now().naive_utc();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO comments
            (article_id, author_id, published, parent_id, content, is_removed, ip)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id",
    )
    .bind(article.id)
    .bind(author_id)
    .bind(now)
    .bind(parent.as_ref().map(|p| p.id))
    .bind(content)
    .bind(flagged)
    .bind(ip)
    .fetch_one(&mut tx)
    .await?;

    if !flagged {
        sqlx::query(
            "UPDATE articles SET comment_count = comment_count + 1, last_activity = $1
             WHERE id = $2",
        )
        .bind(now)
        .bind(article.id)
        .execute(&mut tx)
        .await?;
    }

    if let Some(parent) = &parent {
        if let Some(parent_author) = parent.author_id {
            // Replying to yourself is not news.
            if Some(parent_author) != author_id {
                let url = format!("/article/{}/#comment-{}", article.slug, id);
                let who = author_name.unwrap_or("someone");
                let message = format!("{who} replied to your comment");
                send_notification(&mut tx, parent_author, &url, &message).await?;
            }
        }
    }

    tx.commit().await?;
    get_comment(pool, id)
        .await?
        .ok_or(ApiError::NotFound("comment not found"))
}

pub async fn edit_comment(
    pool: &SqlitePool,
    editor_id: i64,
    editor_is_staff: bool,
    comment_id: i64,
    content: &str,
) -> Result<Comment, ApiError> {
    let comment = get_comment(pool, comment_id)
        .await?
        .ok_or(ApiError::NotFound("comment not found"))?;
    if comment.author_id != Some(editor_id) && !editor_is_staff {
        return Err(ApiError::Forbidden("you didn't post that comment"));
    }
    sqlx::query("UPDATE comments SET content = $1 WHERE id = $2")
        .bind(content)
        .bind(comment_id)
        .execute(pool)
        .await?;
    get_comment(pool, comment_id)
        .await?
        .ok_or(ApiError::NotFound("comment not found"))
}

/// Moderator toggle of the removal flag, keeping the article's counter
/// in step. Requesting the state the comment is already in fails.
pub async fn remove_comment(pool: &SqlitePool, comment_id: i64, action: &str) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;
    let comment = sqlx::query_as::<Sqlite, Comment>(&format!(
        "{COMMENT_QUERY} WHERE comments.id = $1 AND comments.is_deleted = FALSE"
    ))
    .bind(comment_id)
    .fetch_optional(&mut tx)
    .await?
    .ok_or(ApiError::NotFound("comment not found"))?;

    let (removed, delta) = match action {
        "remove" if !comment.is_removed => (true, -1),
        "unremove" if comment.is_removed => (false, 1),
        _ => return Err(ApiError::invalid("invalid action")),
    };
    sqlx::query("UPDATE comments SET is_removed = $1 WHERE id = $2")
        .bind(removed)
        .bind(comment_id)
        .execute(&mut tx)
        .await?;
    sqlx::query("UPDATE articles SET comment_count = comment_count + $1 WHERE id = $2")
        .bind(delta)
        .bind(comment.article_id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Author- or staff-triggered delete: terminal, content scrubbed. The
/// counter moves only if the comment was being counted, and a retried
/// delete finds nothing, so it can never double-decrement.
pub async fn delete_comment(
    pool: &SqlitePool,
    actor_id: i64,
    actor_is_staff: bool,
    comment_id: i64,
) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;
    let comment = sqlx::query_as::<Sqlite, Comment>(&format!(
        "{COMMENT_QUERY} WHERE comments.id = $1 AND comments.is_deleted = FALSE"
    ))
    .bind(comment_id)
    .fetch_optional(&mut tx)
    .await?
    .ok_or(ApiError::NotFound("comment not found"))?;
    if comment.author_id != Some(actor_id) && !actor_is_staff {
        return Err(ApiError::Forbidden("you didn't post that comment"));
    }
    sqlx::query("UPDATE comments SET is_deleted = TRUE, content = '' WHERE id = $1")
        .bind(comment_id)
        .execute(&mut tx)
        .await?;
    if !comment.is_removed {
        sqlx::query("UPDATE articles SET comment_count = comment_count - 1 WHERE id = $1")
            .bind(comment.article_id)
            .execute(&mut tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}
