use sqlx::{Sqlite, SqlitePool};

use crate::data_formats::SignupRequest;
use crate::errors::ApiError;
use crate::models::User;

use super::{get_user_by_username, is_unique_violation};

/// Creates the user plus its companion `user_info` row in one
/// transaction. The password must already be hashed.
pub async fn insert_user(pool: &SqlitePool, request: &SignupRequest) -> Result<User, ApiError> {
    let mut tx = pool.begin().await?;
    let user = sqlx::query_as::<Sqlite, User>(
        "INSERT INTO users (email, username, password)
         VALUES ($1, $2, $3)
         RETURNING id, created_at, username, email, password, is_staff, is_active",
    )
    .bind(&request.email)
    .bind(&request.username)
    .bind(&request.password)
    .fetch_one(&mut tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::invalid("username or email already taken")
        } else {
            e.into()
        }
    })?;
    sqlx::query("INSERT INTO user_info (user_id) VALUES ($1)")
        .bind(user.id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(user)
}

/// Flips the shadow-ban flag. Staff accounts cannot be targeted, and
/// repeating the current state is reported like any other bad toggle.
pub async fn set_shadow_ban(
    pool: &SqlitePool,
    username: &str,
    action: &str,
) -> Result<(), ApiError> {
    let banned = match action {
        "ban" => true,
        "unban" => false,
        _ => return Err(ApiError::invalid("invalid action")),
    };
    let target = get_user_by_username(pool, username)
        .await?
        .ok_or(ApiError::NotFound("user not found"))?;
    if target.is_staff {
        return Err(ApiError::Forbidden("cannot ban a privileged user"));
    }
    let mut tx = pool.begin().await?;
    let current: Option<bool> =
        sqlx::query_scalar("SELECT is_shadow_banned FROM user_info WHERE user_id = $1")
            .bind(target.id)
            .fetch_optional(&mut tx)
            .await?;
    if current == Some(banned) {
        return Err(ApiError::invalid("invalid action"));
    }
    sqlx::query("UPDATE user_info SET is_shadow_banned = $1 WHERE user_id = $2")
        .bind(banned)
        .bind(target.id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Promotes a user to staff. Used by ops tooling and the test suite;
/// there is deliberately no RPC endpoint for this.
pub async fn set_staff(pool: &SqlitePool, username: &str, is_staff: bool) -> Result<(), ApiError> {
    let result = sqlx::query("UPDATE users SET is_staff = $1 WHERE username = $2")
        .bind(is_staff)
        .bind(username)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("user not found"));
    }
    Ok(())
}
