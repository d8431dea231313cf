use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::Query,
    http::Uri,
    Extension, Form, Json,
};
use chrono::Utc;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool};

use crate::authentication::{
    get_jwt_token, hash_password_argon2, verify_password_argon2, ClientIp, MaybeUser,
};
use crate::comment_tree::{self, CommentView};
use crate::data_formats::*;
use crate::db_helpers as db;
use crate::errors::ApiError;
use crate::models::{Article, Comment, SpamText, User};
use crate::spam::{self, Label};
use crate::visibility::{effectively_removed, Viewer};
use crate::AppState;

type JsonResult = Result<Json<ApiResponse>, ApiError>;

// ----------------- Helper Handlers -----------------
pub async fn alive() -> &'static str {
    "alive"
}

pub async fn not_found(uri: Uri) -> Json<ApiResponse> {
    Json(ApiResponse::error(format!("no such endpoint: {uri}")))
}

// ----------------- User Handlers -----------------
pub async fn signup(
    Extension(state): Extension<Arc<AppState>>,
    Form(mut request): Form<SignupRequest>,
) -> JsonResult {
    if request.username.len() < 3 || request.username.len() > 30 {
        return Err(ApiError::invalid("bad username"));
    }
    if !request
        .username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::invalid("bad username"));
    }
    if request.password.len() < 6 {
        return Err(ApiError::invalid("password too short"));
    }
    request.password = hash_password_argon2(request.password)
        .await
        .map_err(ApiError::Internal)?;
    let user = db::insert_user(&state.pool, &request).await?;
    let token = get_jwt_token(user.id).map_err(ApiError::Internal)?;
    tracing::info!(username = %user.username, "new signup");
    Ok(Json(ApiResponse::one(UserResponse::new(&user, token))))
}

pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Form(request): Form<LoginRequest>,
) -> JsonResult {
    let user = db::get_user_by_username(&state.pool, &request.username)
        .await?
        .ok_or_else(|| ApiError::invalid("bad username or password"))?;
    let correct = verify_password_argon2(request.password, &user.password)
        .await
        .map_err(ApiError::Internal)?;
    if !correct {
        return Err(ApiError::invalid("bad username or password"));
    }
    let token = get_jwt_token(user.id).map_err(ApiError::Internal)?;
    Ok(Json(ApiResponse::one(UserResponse::new(&user, token))))
}

// ----------------- Posting Gate -----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostKind {
    Thread,
    Comment,
}

impl PostKind {
    fn cooldown_secs(self, state: &AppState) -> i64 {
        match self {
            PostKind::Thread => state.settings.limit_thread_secs,
            PostKind::Comment => state.settings.limit_comment_secs,
        }
    }

    fn cache_key(self, ip: &str) -> String {
        match self {
            PostKind::Thread => format!("post:thread:{ip}"),
            PostKind::Comment => format!("post:comment:{ip}"),
        }
    }
}

async fn load_blocklist(pool: &SqlitePool) -> Result<Vec<SpamText>, ApiError> {
    let rows = sqlx::query_as::<Sqlite, SpamText>("SELECT id, text, is_regex FROM spam_text")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// What the posting gate concluded about a candidate post.
struct PostGate {
    /// Store the post `is_removed`.
    flagged: bool,
    /// Per-IP cooldown marker to arm once the post actually lands. A
    /// request that fails later validation must not burn the cooldown.
    cooldown: Option<(String, std::time::Duration)>,
}

impl PostGate {
    fn arm_cooldown(&self, state: &AppState) {
        if let Some((key, ttl)) = &self.cooldown {
            state.cache.set(key.clone(), "1", *ttl);
        }
    }
}

/// Everything that runs before a new post is persisted: the author and
/// IP cooldowns (hard failures) followed by the removal checks (flags
/// only).
async fn gate_new_post(
    state: &AppState,
    author: &User,
    ip: &str,
    kind: PostKind,
    title: Option<&str>,
    content: &str,
) -> Result<PostGate, ApiError> {
    let mut cooldown = None;
    if !state.settings.debug && !author.is_staff {
        let limit = kind.cooldown_secs(state);
        let last = db::last_post_time(&state.pool, author.id, kind == PostKind::Thread).await?;
        if let Some(last) = last {
            let since = (Utc::now().naive_utc() - last).num_seconds();
            if since < limit {
                return Err(ApiError::RateLimited(format!(
                    "please wait {} seconds before making another post",
                    limit - since
                )));
            }
        }
        // Same cooldown keyed by address, so fresh accounts from one
        // machine don't dodge the author check.
        let key = kind.cache_key(ip);
        if state.cache.contains(&key) {
            return Err(ApiError::RateLimited(format!(
                "please wait up to {limit} seconds before making another post"
            )));
        }
        cooldown = Some((key, std::time::Duration::from_secs(limit.max(0) as u64)));
    }

    let info = db::get_user_info(&state.pool, author.id).await?;
    let blocklist = load_blocklist(&state.pool).await?;
    let reasons = spam::review_post(
        state.classifier.as_ref(),
        &blocklist,
        info.karma,
        info.is_shadow_banned,
        state.settings.worthless_karma_threshold,
        title,
        content,
    )
    .await;
    let flagged = !reasons.is_empty();
    if flagged {
        tracing::info!(author = %author.username, ?reasons, "new post flagged removed");
    }
    Ok(PostGate { flagged, cooldown })
}

/// Spawned after a flagged post is stored: grow the classifier's bad
/// corpus from what moderation (or the gate itself) caught.
fn train_classifier_on(state: &Arc<AppState>, label: Label, text: String) {
    let classifier = Arc::clone(&state.classifier);
    tokio::spawn(async move {
        if let Err(error) = classifier.train(label, &text).await {
            tracing::warn!(%error, "classifier training failed");
        }
    });
}

// ----------------- Article Handlers -----------------

async fn new_post(
    state: &Arc<AppState>,
    maybe_user: MaybeUser,
    ip: &str,
    title: String,
    content: String,
    is_forum: bool,
) -> JsonResult {
    let user = db::require_user(&state.pool, maybe_user.get_id()).await?;
    if !is_forum && !user.is_staff {
        return Err(ApiError::Forbidden("insufficient vespene gas"));
    }
    let title = title.trim().to_string();
    let content = content.trim().to_string();
    if title.len() < state.settings.min_title_len {
        return Err(ApiError::invalid("title too short"));
    }
    if title.len() > state.settings.max_title_len {
        return Err(ApiError::invalid("title too long"));
    }
    if content.len() < state.settings.min_content_len {
        return Err(ApiError::invalid("post too short"));
    }
    if content.len() > state.settings.max_content_len {
        return Err(ApiError::invalid("post too long"));
    }
    let gate = gate_new_post(state, &user, ip, PostKind::Thread, Some(&title), &content).await?;
    let article = db::create_article(
        &state.pool,
        Some(user.id),
        &title,
        &content,
        is_forum,
        gate.flagged,
        ip,
    )
    .await?;
    gate.arm_cooldown(state);
    if gate.flagged && !user.is_staff {
        train_classifier_on(state, Label::Bad, format!("{title}\n{content}"));
    }
    // The author sees their own post as live either way.
    Ok(Json(ApiResponse::one(ArticleResponse::new(&article, false))))
}

pub async fn thread_new(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    ClientIp(ip): ClientIp,
    Form(request): Form<ThreadNewRequest>,
) -> JsonResult {
    new_post(&state, maybe_user, &ip, request.title, request.content, true).await
}

pub async fn article_new(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    ClientIp(ip): ClientIp,
    Form(request): Form<ThreadNewRequest>,
) -> JsonResult {
    new_post(&state, maybe_user, &ip, request.title, request.content, false).await
}

pub async fn article_get(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    ClientIp(ip): ClientIp,
    Query(request): Query<ArticleSlugRequest>,
) -> JsonResult {
    let article = db::get_article_by_slug(&state.pool, &request.article_slug)
        .await?
        .ok_or(ApiError::NotFound("article not found"))?;
    let viewer = db::viewer_for(&state.pool, maybe_user.get_id(), &ip).await?;
    let masked = effectively_removed(article.is_removed, article.author_id, &article.ip, &viewer);
    let comments = comments_as_viewer(&state.pool, &article, &viewer).await?;
    let page = ArticlePageResponse {
        article: ArticleResponse::new(&article, masked),
        comments,
    };
    Ok(Json(ApiResponse::one(page)))
}

pub async fn article_list(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ArticleListParams>,
) -> JsonResult {
    let articles = db::list_articles(&state.pool, params.forum).await?;
    let results: Vec<Value> = articles
        .iter()
        .map(|article| {
            serde_json::to_value(ArticleResponse::new(article, false)).unwrap_or(Value::Null)
        })
        .collect();
    Ok(Json(ApiResponse::results(results)))
}

pub async fn article_edit(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<ArticleEditRequest>,
) -> JsonResult {
    let user = db::require_user(&state.pool, maybe_user.get_id()).await?;
    if let Some(title) = &request.title {
        if title.trim().len() < state.settings.min_title_len {
            return Err(ApiError::invalid("title too short"));
        }
        if title.trim().len() > state.settings.max_title_len {
            return Err(ApiError::invalid("title too long"));
        }
    }
    if let Some(content) = &request.content {
        if content.trim().len() < state.settings.min_content_len {
            return Err(ApiError::invalid("post too short"));
        }
        if content.trim().len() > state.settings.max_content_len {
            return Err(ApiError::invalid("post too long"));
        }
    }
    let article = db::edit_article(&state.pool, user.id, user.is_staff, &request).await?;
    Ok(Json(ApiResponse::one(ArticleResponse::new(&article, false))))
}

pub async fn article_delete(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<ArticleSlugRequest>,
) -> JsonResult {
    let user = db::require_user(&state.pool, maybe_user.get_id()).await?;
    db::delete_article(&state.pool, user.id, user.is_staff, &request.article_slug).await?;
    Ok(Json(ApiResponse::results(vec![])))
}

pub async fn article_remove(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<ArticleActionRequest>,
) -> JsonResult {
    db::require_staff(&state.pool, maybe_user.get_id()).await?;
    db::remove_article(&state.pool, &request.article_slug, &request.action).await?;
    tracing::info!(slug = %request.article_slug, action = %request.action, "article moderated");
    Ok(Json(ApiResponse::results(vec![])))
}

pub async fn article_convert(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<ArticleActionRequest>,
) -> JsonResult {
    db::require_staff(&state.pool, maybe_user.get_id()).await?;
    db::convert_article(&state.pool, &request.article_slug, &request.action).await?;
    Ok(Json(ApiResponse::results(vec![])))
}

// ----------------- Comment Handlers -----------------

/// One article's comments as a particular viewer gets to see them:
/// removal mask applied, masked content scrubbed, the viewer's own votes
/// annotated, and the flat rows assembled into the reply forest.
async fn comments_as_viewer(
    pool: &SqlitePool,
    article: &Article,
    viewer: &Viewer,
) -> Result<Vec<CommentView>, ApiError> {
    let comments = db::comments_for_article(pool, article.id).await?;
    let votes: HashMap<i64, i64> = match viewer.user_id {
        Some(user_id) => db::votes_for_viewer(pool, article.id, user_id)
            .await?
            .into_iter()
            .collect(),
        None => HashMap::new(),
    };
    let views = comments
        .iter()
        .map(|comment| comment_as_viewer(comment, viewer, &votes))
        .collect();
    Ok(comment_tree::assemble(views))
}

fn comment_as_viewer(
    comment: &Comment,
    viewer: &Viewer,
    votes: &HashMap<i64, i64>,
) -> CommentView {
    let mut view = CommentView::new(comment);
    view.is_removed = effectively_removed(
        comment.is_removed,
        comment.author_id,
        &comment.ip,
        viewer,
    );
    if view.is_removed {
        view.content = String::new();
    }
    match votes.get(&comment.id).copied() {
        Some(1) => view.upvoted = true,
        Some(-1) => view.downvoted = true,
        _ => (),
    }
    view
}

pub async fn comment_new(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    ClientIp(ip): ClientIp,
    Form(request): Form<CommentNewRequest>,
) -> JsonResult {
    let user = db::require_user(&state.pool, maybe_user.get_id()).await?;
    let content = request.content.trim().to_string();
    if content.len() < state.settings.min_comment_len {
        return Err(ApiError::invalid("comment too short"));
    }
    if content.len() > state.settings.max_comment_len {
        return Err(ApiError::invalid("comment too long"));
    }
    let article = db::get_article_by_slug(&state.pool, &request.article_slug)
        .await?
        .ok_or(ApiError::NotFound("article not found"))?;
    let gate = gate_new_post(&state, &user, &ip, PostKind::Comment, None, &content).await?;
    let comment = db::create_comment(
        &state.pool,
        &state.settings,
        &article,
        Some(user.id),
        Some(&user.username),
        request.parent_id,
        &content,
        gate.flagged,
        &ip,
    )
    .await?;
    gate.arm_cooldown(&state);
    if gate.flagged && !user.is_staff {
        train_classifier_on(&state, Label::Bad, content);
    }
    // The author is the viewer here, so a gate-flagged comment still
    // reads as live in the response.
    let mut view = CommentView::new(&comment);
    view.is_removed = false;
    Ok(Json(ApiResponse::one(view)))
}

pub async fn comment_get(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    ClientIp(ip): ClientIp,
    Query(request): Query<CommentIdRequest>,
) -> JsonResult {
    let comment = db::get_comment(&state.pool, request.comment_id)
        .await?
        .ok_or(ApiError::NotFound("comment not found"))?;
    let viewer = db::viewer_for(&state.pool, maybe_user.get_id(), &ip).await?;
    let votes = match viewer.user_id {
        Some(user_id) => db::votes_for_viewer(&state.pool, comment.article_id, user_id)
            .await?
            .into_iter()
            .collect(),
        None => HashMap::new(),
    };
    let view = comment_as_viewer(&comment, &viewer, &votes);
    Ok(Json(ApiResponse::one(view)))
}

pub async fn comment_edit(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<CommentEditRequest>,
) -> JsonResult {
    let user = db::require_user(&state.pool, maybe_user.get_id()).await?;
    let content = request.content.trim().to_string();
    if content.len() < state.settings.min_comment_len {
        return Err(ApiError::invalid("comment too short"));
    }
    if content.len() > state.settings.max_comment_len {
        return Err(ApiError::invalid("comment too long"));
    }
    let comment = db::edit_comment(
        &state.pool,
        user.id,
        user.is_staff,
        request.comment_id,
        &content,
    )
    .await?;
    Ok(Json(ApiResponse::one(CommentView::new(&comment))))
}

pub async fn comment_remove(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<CommentActionRequest>,
) -> JsonResult {
    db::require_staff(&state.pool, maybe_user.get_id()).await?;
    db::remove_comment(&state.pool, request.comment_id, &request.action).await?;
    tracing::info!(
        comment_id = request.comment_id,
        action = %request.action,
        "comment moderated"
    );
    if request.action == "remove" {
        if let Some(comment) = db::get_comment(&state.pool, request.comment_id).await? {
            let staff_author = match comment.author_id {
                Some(author_id) => db::get_user_by_id(&state.pool, author_id)
                    .await?
                    .map(|author| author.is_staff)
                    .unwrap_or(false),
                None => false,
            };
            // Staff removals are editorial, not spam.
            if !staff_author {
                train_classifier_on(&state, Label::Bad, comment.content);
            }
        }
    }
    Ok(Json(ApiResponse::results(vec![])))
}

pub async fn comment_delete(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<CommentIdRequest>,
) -> JsonResult {
    let user = db::require_user(&state.pool, maybe_user.get_id()).await?;
    db::delete_comment(&state.pool, user.id, user.is_staff, request.comment_id).await?;
    Ok(Json(ApiResponse::results(vec![])))
}

async fn comment_vote(
    state: &AppState,
    maybe_user: MaybeUser,
    ip: &str,
    comment_id: i64,
    direction: db::VoteDirection,
) -> JsonResult {
    let voter_id = maybe_user.get_id();
    let comment = db::cast_vote(
        &state.pool,
        &state.settings,
        &state.cache,
        comment_id,
        voter_id,
        ip,
        direction,
    )
    .await?;
    let viewer = db::viewer_for(&state.pool, voter_id, ip).await?;
    let votes = match voter_id {
        Some(user_id) => db::votes_for_viewer(&state.pool, comment.article_id, user_id)
            .await?
            .into_iter()
            .collect(),
        None => HashMap::new(),
    };
    Ok(Json(ApiResponse::one(comment_as_viewer(
        &comment, &viewer, &votes,
    ))))
}

pub async fn comment_upvote(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    ClientIp(ip): ClientIp,
    Form(request): Form<CommentVoteRequest>,
) -> JsonResult {
    comment_vote(&state, maybe_user, &ip, request.comment, db::VoteDirection::Up).await
}

pub async fn comment_downvote(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    ClientIp(ip): ClientIp,
    Form(request): Form<CommentVoteRequest>,
) -> JsonResult {
    comment_vote(
        &state,
        maybe_user,
        &ip,
        request.comment,
        db::VoteDirection::Down,
    )
    .await
}

// ----------------- Message Handlers -----------------

pub async fn message_send(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<MessageSendRequest>,
) -> JsonResult {
    let sender = db::require_user(&state.pool, maybe_user.get_id()).await?;
    let content = request.content.trim().to_string();
    if content.len() < 5 {
        return Err(ApiError::invalid("message too short"));
    }
    let recipient = db::get_user_by_username(&state.pool, &request.to_username)
        .await?
        .ok_or(ApiError::NotFound("user not found"))?;
    if recipient.id == sender.id {
        return Err(ApiError::invalid("you can't message yourself"));
    }
    let message = db::send_message(&state.pool, &state.settings, &sender, &recipient, &content)
        .await?;
    Ok(Json(ApiResponse::one(MessageResponse::new(&message))))
}

pub async fn message_delete(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<MessageIdRequest>,
) -> JsonResult {
    let user = db::require_user(&state.pool, maybe_user.get_id()).await?;
    db::delete_message(&state.pool, user.id, request.message_id).await?;
    Ok(Json(ApiResponse::results(vec![])))
}

// ----------------- Moderation Handlers -----------------

pub async fn shadowban(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<ShadowbanRequest>,
) -> JsonResult {
    db::require_staff(&state.pool, maybe_user.get_id()).await?;
    db::set_shadow_ban(&state.pool, &request.username, &request.action).await?;
    tracing::info!(target = %request.username, action = %request.action, "shadow ban toggled");
    Ok(Json(ApiResponse::results(vec![])))
}

/// Staff hook for the integrity-repair batch job.
pub async fn recalculate(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
) -> JsonResult {
    db::require_staff(&state.pool, maybe_user.get_id()).await?;
    db::recalculate_all(&state.pool).await?;
    Ok(Json(ApiResponse::results(vec![])))
}

/// Staff hook for the vote-pruning batch job.
pub async fn prune_votes_rpc(
    Extension(state): Extension<Arc<AppState>>,
    maybe_user: MaybeUser,
    Form(request): Form<PruneVotesRequest>,
) -> JsonResult {
    db::require_staff(&state.pool, maybe_user.get_id()).await?;
    let days = request.days.unwrap_or(state.settings.vote_prune_days);
    let pruned = db::prune_votes(&state.pool, days).await?;
    Ok(Json(ApiResponse::one(serde_json::json!({ "pruned": pruned }))))
}
