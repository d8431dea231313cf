use std::time::Duration;

/// Tunables for rate limiting, moderation and validation.
///
/// Everything here is read once at startup and passed around inside
/// [`crate::AppState`] so handlers never reach for ambient globals.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Seconds a non-staff user must wait between forum threads.
    pub limit_thread_secs: i64,
    /// Seconds a non-staff user must wait between comments.
    pub limit_comment_secs: i64,
    /// Seconds a user must wait between private messages.
    pub limit_message_secs: i64,
    /// Maximum private messages sent per day.
    pub limit_messages_day: i64,
    /// Maximum votes cast per hour.
    pub limit_votes_hour: i64,
    /// Maximum votes cast per day.
    pub limit_votes_day: i64,
    /// Maximum reply nesting enforced at posting time.
    pub max_comment_depth: i64,
    /// Authors at or below this karma get their posts run through the
    /// spam classifier.
    pub worthless_karma_threshold: i64,
    pub min_comment_len: usize,
    pub max_comment_len: usize,
    pub min_title_len: usize,
    pub max_title_len: usize,
    pub min_content_len: usize,
    pub max_content_len: usize,
    /// How long an anonymous voter's per-comment marker lives.
    pub anon_vote_ttl: Duration,
    /// Vote rows older than this many days are eligible for pruning.
    pub vote_prune_days: i64,
    /// Development switch that bypasses posting cooldowns.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            limit_thread_secs: 60 * 30,
            limit_comment_secs: 60 * 3,
            limit_message_secs: 30,
            limit_messages_day: 15,
            limit_votes_hour: 100,
            limit_votes_day: 500,
            max_comment_depth: 15,
            worthless_karma_threshold: -4,
            min_comment_len: 5,
            max_comment_len: 10_000,
            min_title_len: 4,
            max_title_len: 255,
            min_content_len: 5,
            max_content_len: 50_000,
            anon_vote_ttl: Duration::from_secs(60 * 60),
            vote_prune_days: 30,
            debug: false,
        }
    }
}

impl Settings {
    /// Reads overrides from the environment, falling back to the defaults
    /// above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = Settings::default();
        Settings {
            limit_thread_secs: env_i64("OWS_LIMIT_THREAD", d.limit_thread_secs),
            limit_comment_secs: env_i64("OWS_LIMIT_COMMENT", d.limit_comment_secs),
            limit_message_secs: env_i64("OWS_LIMIT_MESSAGE", d.limit_message_secs),
            limit_messages_day: env_i64("OWS_LIMIT_MSG_DAY", d.limit_messages_day),
            limit_votes_hour: env_i64("OWS_LIMIT_VOTES_HOUR", d.limit_votes_hour),
            limit_votes_day: env_i64("OWS_LIMIT_VOTES_DAY", d.limit_votes_day),
            max_comment_depth: env_i64("OWS_MAX_COMMENT_DEPTH", d.max_comment_depth),
            worthless_karma_threshold: env_i64(
                "OWS_WORTHLESS_KARMA_THRESHOLD",
                d.worthless_karma_threshold,
            ),
            anon_vote_ttl: Duration::from_secs(env_i64(
                "OWS_ANON_VOTE_TTL",
                d.anon_vote_ttl.as_secs() as i64,
            ) as u64),
            vote_prune_days: env_i64("OWS_VOTE_PRUNE_DAYS", d.vote_prune_days),
            debug: std::env::var("OWS_DEBUG").map(|v| v == "1").unwrap_or(false),
            ..d
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
