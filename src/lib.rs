mod authentication;
pub mod cache;
pub mod comment_tree;
pub mod config;
mod data_formats;
mod db_helpers;
mod errors;
mod handlers;
mod models;
pub mod spam;
pub mod visibility;

use anyhow::Context;
pub use anyhow::Result;
use axum::{routing::*, Extension, Router};
pub use data_formats::{ApiResponse, ApiStatus};
pub use db_helpers::{prune_votes, recalculate_all, recalculate_comment, set_staff};
use handlers::*;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{Sqlite, SqlitePoolOptions},
    SqlitePool,
};
use std::{
    net::{SocketAddr, TcpListener},
    sync::Arc,
};

use cache::TtlCache;
use config::Settings;
use spam::{BayesClassifier, SpamClassifier};

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub pool: SqlitePool,
    pub settings: Settings,
    pub cache: TtlCache,
    pub classifier: Arc<dyn SpamClassifier>,
}

impl AppState {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        AppState {
            pool,
            settings,
            cache: TtlCache::new(),
            classifier: Arc::new(BayesClassifier::new()),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn SpamClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

pub async fn run_app(app: Router, address: SocketAddr) -> Result<()> {
    axum::Server::bind(&address)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}

pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        tracing::info!(%db_url, "creating database");
        Sqlite::create_database(db_url)
            .await
            .context("Failed to create database")?;
    }
    let pool = SqlitePoolOptions::new().connect(db_url).await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    Ok(pool)
}

pub fn get_random_free_port() -> (u16, SocketAddr) {
    let listener = TcpListener::bind("localhost:0").unwrap();
    match listener.local_addr() {
        Ok(addr) => (addr.port(), addr),
        Err(_) => panic!("Could not get a free port"),
    }
}

pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/check_health", get(alive))
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/api/article_get", get(article_get))
        .route("/api/article_list", get(article_list))
        .route("/api/thread_new", post(thread_new))
        .route("/api/article_new", post(article_new))
        .route("/api/article_edit", post(article_edit))
        .route("/api/article_delete", post(article_delete))
        .route("/api/article_remove", post(article_remove))
        .route("/api/article_convert", post(article_convert))
        .route("/api/comment_new", post(comment_new))
        .route("/api/comment_get", get(comment_get))
        .route("/api/comment_edit", post(comment_edit))
        .route("/api/comment_remove", post(comment_remove))
        .route("/api/comment_delete", post(comment_delete))
        .route("/api/comment_upvote", post(comment_upvote))
        .route("/api/comment_downvote", post(comment_downvote))
        .route("/api/message_send", post(message_send))
        .route("/api/message_delete", post(message_delete))
        .route("/api/shadowban", post(shadowban))
        .route("/api/recalculate", post(recalculate))
        .route("/api/prune_votes", post(prune_votes_rpc))
        .fallback(not_found)
        .layer(Extension(state))
}

/// Turns a title into the url label stored on its article.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_was_dash = true; // suppress a leading dash
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
        if slug.len() >= 50 {
            break;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugs_are_lowercase_dashed_and_capped() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  spaces   everywhere  "), "spaces-everywhere");
        let long = "a".repeat(80);
        assert_eq!(slugify(&long).len(), 50);
        assert_eq!(slugify("!!!"), "");
    }
}
