use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::cache::TtlCache;
use crate::config::Settings;
use crate::errors::ApiError;
use crate::models::Comment;

use super::{get_comment, is_unique_violation, Tx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    fn sign(self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

/// Records one vote per (comment, user). Repeating the same direction is
/// a no-op; the opposite direction flips the existing row and moves one
/// unit between the counters. Everything happens in one transaction so a
/// failure can't leave `karma != ups - downs`.
///
/// Anonymous voters get the IP-keyed cache guard instead of a durable
/// row: counters move, but nothing is written to `comment_votes`.
pub async fn cast_vote(
    pool: &SqlitePool,
    settings: &Settings,
    cache: &TtlCache,
    comment_id: i64,
    voter_id: Option<i64>,
    ip: &str,
    direction: VoteDirection,
) -> Result<Comment, ApiError> {
    if get_comment(pool, comment_id).await?.is_none() {
        return Err(ApiError::NotFound("comment not found"));
    }

    match voter_id {
        Some(voter_id) => {
            check_vote_windows(pool, settings, voter_id).await?;
            let mut tx = pool.begin().await?;
            apply_user_vote(&mut tx, comment_id, voter_id, direction).await?;
            tx.commit().await?;
        }
        None => {
            let key = format!("vote:{comment_id}:{ip}");
            let previous = cache.get(&key);
            if previous.as_deref() == Some(direction.as_str()) {
                return get_comment(pool, comment_id)
                    .await?
                    .ok_or(ApiError::NotFound("comment not found"));
            }
            let mut tx = pool.begin().await?;
            match previous.as_deref() {
                // Flipping an anonymous vote undoes the old direction.
                Some("up") => adjust_counters(&mut tx, comment_id, -1, 0).await?,
                Some("down") => adjust_counters(&mut tx, comment_id, 0, -1).await?,
                _ => (),
            }
            match direction {
                VoteDirection::Up => adjust_counters(&mut tx, comment_id, 1, 0).await?,
                VoteDirection::Down => adjust_counters(&mut tx, comment_id, 0, 1).await?,
            }
            tx.commit().await?;
            cache.set(key, direction.as_str(), settings.anon_vote_ttl);
        }
    }

    get_comment(pool, comment_id)
        .await?
        .ok_or(ApiError::NotFound("comment not found"))
}

async fn apply_user_vote(
    tx: &mut Tx<'_>,
    comment_id: i64,
    voter_id: i64,
    direction: VoteDirection,
) -> Result<(), ApiError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT vote FROM comment_votes WHERE comment_id = $1 AND user_id = $2")
            .bind(comment_id)
            .bind(voter_id)
            .fetch_optional(&mut *tx)
            .await?;

    let sign = direction.sign();
    match existing {
        Some(vote) if vote == sign => Ok(()), // idempotent re-vote
        Some(_) => flip_vote(tx, comment_id, voter_id, direction).await,
        None => {
            let now = Utc::now().naive_utc();
            let inserted = sqlx::query(
                "INSERT INTO comment_votes (comment_id, user_id, time, vote)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(comment_id)
            .bind(voter_id)
            .bind(now)
            .bind(sign)
            .execute(&mut *tx)
            .await;
            match inserted {
                Ok(_) => {
                    match direction {
                        VoteDirection::Up => adjust_counters(tx, comment_id, 1, 0).await?,
                        VoteDirection::Down => adjust_counters(tx, comment_id, 0, 1).await?,
                    }
                    Ok(())
                }
                // A concurrent first vote won the unique constraint;
                // retry ours as the update path.
                Err(e) if is_unique_violation(&e) => {
                    flip_vote(tx, comment_id, voter_id, direction).await
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

async fn flip_vote(
    tx: &mut Tx<'_>,
    comment_id: i64,
    voter_id: i64,
    direction: VoteDirection,
) -> Result<(), ApiError> {
    let now = Utc::now().naive_utc();
    let changed = sqlx::query(
        "UPDATE comment_votes SET vote = $1, time = $2
         WHERE comment_id = $3 AND user_id = $4 AND vote != $1",
    )
    .bind(direction.sign())
    .bind(now)
    .bind(comment_id)
    .bind(voter_id)
    .execute(&mut *tx)
    .await?;
    if changed.rows_affected() == 0 {
        // The concurrent vote was already in our direction.
        return Ok(());
    }
    match direction {
        VoteDirection::Up => adjust_counters(tx, comment_id, 1, -1).await,
        VoteDirection::Down => adjust_counters(tx, comment_id, -1, 1).await,
    }
}

async fn adjust_counters(
    tx: &mut Tx<'_>,
    comment_id: i64,
    ups: i64,
    downs: i64,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE comments
         SET ups = ups + $1, downs = downs + $2, karma = (ups + $1) - (downs + $2)
         WHERE id = $3",
    )
    .bind(ups)
    .bind(downs)
    .bind(comment_id)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

/// Rolling-window counting check: too many recorded votes in the last
/// hour or day rejects the new one.
async fn check_vote_windows(
    pool: &SqlitePool,
    settings: &Settings,
    voter_id: i64,
) -> Result<(), ApiError> {
    let now = Utc::now().naive_utc();
    for (window, limit) in [
        (Duration::hours(1), settings.limit_votes_hour),
        (Duration::days(1), settings.limit_votes_day),
    ] {
        let cutoff = now - window;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comment_votes WHERE user_id = $1 AND time > $2",
        )
        .bind(voter_id)
        .bind(cutoff)
        .fetch_one(pool)
        .await?;
        if count >= limit {
            return Err(ApiError::RateLimited(
                "you have been voting too much".to_string(),
            ));
        }
    }
    Ok(())
}

/// Recounts one comment's vote rows from scratch. Must land on the same
/// numbers the incremental path maintains.
pub async fn recalculate_comment(pool: &SqlitePool, comment_id: i64) -> Result<Comment, ApiError> {
    let mut tx = pool.begin().await?;
    let ups: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM comment_votes WHERE comment_id = $1 AND vote = 1")
            .bind(comment_id)
            .fetch_one(&mut tx)
            .await?;
    let downs: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM comment_votes WHERE comment_id = $1 AND vote = -1",
    )
    .bind(comment_id)
    .fetch_one(&mut tx)
    .await?;
    sqlx::query("UPDATE comments SET ups = $1, downs = $2, karma = $3 WHERE id = $4")
        .bind(ups)
        .bind(downs)
        .bind(ups - downs)
        .bind(comment_id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    get_comment(pool, comment_id)
        .await?
        .ok_or(ApiError::NotFound("comment not found"))
}

/// Integrity repair across the whole database: every comment's counters
/// from its vote rows, every article's comment_count from its live
/// comments, and every user's karma from their comments.
pub async fn recalculate_all(pool: &SqlitePool) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE comments SET
            ups = (SELECT COUNT(*) FROM comment_votes
                   WHERE comment_votes.comment_id = comments.id AND vote = 1),
            downs = (SELECT COUNT(*) FROM comment_votes
                     WHERE comment_votes.comment_id = comments.id AND vote = -1)",
    )
    .execute(&mut tx)
    .await?;
    sqlx::query("UPDATE comments SET karma = ups - downs")
        .execute(&mut tx)
        .await?;
    sqlx::query(
        "UPDATE articles SET comment_count =
            (SELECT COUNT(*) FROM comments
             WHERE comments.article_id = articles.id
               AND comments.is_deleted = FALSE
               AND comments.is_removed = FALSE)",
    )
    .execute(&mut tx)
    .await?;
    sqlx::query(
        "UPDATE user_info SET karma =
            (SELECT COALESCE(SUM(comments.karma), 0) FROM comments
             WHERE comments.author_id = user_info.user_id)",
    )
    .execute(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Drops vote rows older than the cutoff. Karma already accumulated on
/// comments is deliberately untouched.
pub async fn prune_votes(pool: &SqlitePool, days_old: i64) -> Result<u64, ApiError> {
    let cutoff = Utc::now().naive_utc() - Duration::days(days_old);
    let result = sqlx::query("DELETE FROM comment_votes WHERE time <= $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
