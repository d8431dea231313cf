use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};

use crate::data_formats::ArticleEditRequest;
use crate::errors::ApiError;
use crate::models::Article;
use crate::slugify;

use super::UpdateBuilder;

const ARTICLE_QUERY: &str = "
    SELECT articles.id,
           articles.author_id,
           users.username AS author,
           articles.title,
           articles.slug,
           articles.published,
           articles.last_activity,
           articles.content,
           articles.comment_count,
           articles.is_visible,
           articles.is_forum,
           articles.is_removed,
           articles.is_deleted,
           articles.ip
    FROM articles
        LEFT JOIN users ON users.id = articles.author_id
";

pub async fn get_article_by_slug(
    pool: &SqlitePool,
    slug: &str,
) -> Result<Option<Article>, ApiError> {
    let result = sqlx::query_as::<Sqlite, Article>(&format!(
        "{ARTICLE_QUERY} WHERE articles.slug = $1 AND articles.is_deleted = FALSE"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(result)
}

pub async fn get_article_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Article>, ApiError> {
    let result = sqlx::query_as::<Sqlite, Article>(&format!(
        "{ARTICLE_QUERY} WHERE articles.id = $1 AND articles.is_deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(result)
}

/// Front-page / forum listing: visible, unremoved posts, threads by
/// latest activity and news by publication date.
pub async fn list_articles(
    pool: &SqlitePool,
    forum: Option<bool>,
) -> Result<Vec<Article>, ApiError> {
    let order = if forum == Some(true) {
        "articles.last_activity DESC"
    } else {
        "articles.published DESC"
    };
    let result = sqlx::query_as::<Sqlite, Article>(&format!(
        "{ARTICLE_QUERY}
         WHERE articles.is_visible = TRUE
           AND articles.is_removed = FALSE
           AND articles.is_deleted = FALSE
           AND ($1 IS NULL OR articles.is_forum = $1)
         ORDER BY {order}
         LIMIT 25"
    ))
    .bind(forum)
    .fetch_all(pool)
    .await?;
    Ok(result)
}

/// Inserts an article or forum thread. `flagged` comes from the spam
/// gate; flagged posts are stored but start out removed.
pub async fn create_article(
    pool: &SqlitePool,
    author_id: Option<i64>,
    title: &str,
    content: &str,
    is_forum: bool,
    flagged: bool,
    ip: &str,
) -> Result<Article, ApiError> {
    let slug = slugify(title);
    let mut tx = pool.begin().await?;
    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM articles WHERE slug = $1")
        .bind(&slug)
        .fetch_optional(&mut tx)
        .await?;
    if taken.is_some() {
        return Err(ApiError::invalid(
            "a thread with this title has already been posted",
        ));
    }
    let now = Utc::now().naive_utc();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO articles
            (author_id, title, slug, published, last_activity, content,
             is_visible, is_forum, is_removed, ip)
         VALUES ($1, $2, $3, $4, $4, $5, TRUE, $6, $7, $8)
         RETURNING id",
    )
    .bind(author_id)
    .bind(title)
    .bind(&slug)
    .bind(now)
    .bind(content)
    .bind(is_forum)
    .bind(flagged)
    .bind(ip)
    .fetch_one(&mut tx)
    .await?;
    tx.commit().await?;
    let article = get_article_by_id(pool, id).await?;
    article.ok_or(ApiError::NotFound("article not found"))
}

/// Edits title and/or content; only the author or staff may edit, and a
/// title change does not re-slug a published article.
pub async fn edit_article(
    pool: &SqlitePool,
    editor_id: i64,
    editor_is_staff: bool,
    request: &ArticleEditRequest,
) -> Result<Article, ApiError> {
    let article = get_article_by_slug(pool, &request.article_slug)
        .await?
        .ok_or(ApiError::NotFound("article not found"))?;
    if article.author_id != Some(editor_id) && !editor_is_staff {
        return Err(ApiError::Forbidden("you didn't post that article"));
    }
    let builder = UpdateBuilder::new()
        .set("title = ?", request.title.clone())
        .set("content = ?", request.content.clone());
    if builder.is_empty() {
        return Ok(article);
    }
    let (assignments, params) = builder.build();
    let query = format!("UPDATE articles SET {assignments} WHERE id = ?");
    let mut query = sqlx::query(&query);
    for param in params {
        query = query.bind(param);
    }
    query.bind(article.id).execute(pool).await?;
    let article = get_article_by_id(pool, article.id).await?;
    article.ok_or(ApiError::NotFound("article not found"))
}

/// Author- or staff-triggered soft delete; terminal, content scrubbed.
pub async fn delete_article(
    pool: &SqlitePool,
    actor_id: i64,
    actor_is_staff: bool,
    slug: &str,
) -> Result<(), ApiError> {
    let article = get_article_by_slug(pool, slug)
        .await?
        .ok_or(ApiError::NotFound("article not found"))?;
    if article.author_id != Some(actor_id) && !actor_is_staff {
        return Err(ApiError::Forbidden("you didn't post that article"));
    }
    sqlx::query("UPDATE articles SET is_deleted = TRUE, content = '' WHERE id = $1")
        .bind(article.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Moderator toggle between visible and removed. Asking for the state
/// the article is already in is an error, mirroring the comment rule.
pub async fn remove_article(pool: &SqlitePool, slug: &str, action: &str) -> Result<(), ApiError> {
    let article = get_article_by_slug(pool, slug)
        .await?
        .ok_or(ApiError::NotFound("article not found"))?;
    let removed = match action {
        "remove" if !article.is_removed => true,
        "unremove" if article.is_removed => false,
        _ => return Err(ApiError::invalid("invalid action")),
    };
    sqlx::query("UPDATE articles SET is_removed = $1 WHERE id = $2")
        .bind(removed)
        .bind(article.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Admin-only flip between staff-authored news article and community
/// forum thread.
pub async fn convert_article(pool: &SqlitePool, slug: &str, action: &str) -> Result<(), ApiError> {
    let article = get_article_by_slug(pool, slug)
        .await?
        .ok_or(ApiError::NotFound("article not found"))?;
    let is_forum = match action {
        "forum" if !article.is_forum => true,
        "news" if article.is_forum => false,
        _ => return Err(ApiError::invalid("invalid action")),
    };
    sqlx::query("UPDATE articles SET is_forum = $1 WHERE id = $2")
        .bind(is_forum)
        .bind(article.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Most recent post time for the author cooldown check.
pub async fn last_post_time(
    pool: &SqlitePool,
    author_id: i64,
    forum_threads: bool,
) -> Result<Option<chrono::NaiveDateTime>, ApiError> {
    let query = if forum_threads {
        "SELECT published FROM articles WHERE author_id = $1
         ORDER BY published DESC LIMIT 1"
    } else {
        "SELECT published FROM comments WHERE author_id = $1
         ORDER BY published DESC LIMIT 1"
    };
    let result = sqlx::query_scalar(query)
        .bind(author_id)
        .fetch_optional(pool)
        .await?;
    Ok(result)
}
