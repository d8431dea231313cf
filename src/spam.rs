//! The spam gate: blocklist matching, a naive Bayesian classifier behind
//! a capability trait, and the cheap text heuristics.
//!
//! Nothing in here rejects a post. Matches only flag the new row
//! `is_removed` so the content is kept as evidence and the author is not
//! tipped off.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;

use crate::models::SpamText;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Good,
    Bad,
}

/// Capability interface over whatever classifier backend is deployed.
/// Callers treat classification failure as `Good`; an unreachable
/// backend must never block posting.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> anyhow::Result<Label>;
    async fn train(&self, label: Label, text: &str) -> anyhow::Result<()>;
}

/// In-memory naive Bayes over word counts, retrained from the rolling
/// corpus of moderated posts.
#[derive(Debug, Default)]
pub struct BayesClassifier {
    // word -> (count in good corpus, count in bad corpus)
    words: DashMap<String, (u64, u64)>,
    good_posts: AtomicU64,
    bad_posts: AtomicU64,
}

impl BayesClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn score(&self, text: &str) -> Label {
        let good_posts = self.good_posts.load(Ordering::Relaxed);
        let bad_posts = self.bad_posts.load(Ordering::Relaxed);
        if good_posts == 0 || bad_posts == 0 {
            // Not enough corpus to have an opinion either way.
            return Label::Good;
        }
        let vocab = self.words.len() as f64;
        let total = (good_posts + bad_posts) as f64;
        let (good_words, bad_words) = self.words.iter().fold((0u64, 0u64), |acc, entry| {
            (acc.0 + entry.value().0, acc.1 + entry.value().1)
        });
        let mut good_score = (good_posts as f64 / total).ln();
        let mut bad_score = (bad_posts as f64 / total).ln();
        for word in tokenize(text) {
            let (good, bad) = self
                .words
                .get(&word)
                .map(|entry| *entry.value())
                .unwrap_or((0, 0));
            // Laplace smoothing keeps unseen words from zeroing a class.
            good_score += ((good as f64 + 1.0) / (good_words as f64 + vocab)).ln();
            bad_score += ((bad as f64 + 1.0) / (bad_words as f64 + vocab)).ln();
        }
        if bad_score > good_score {
            Label::Bad
        } else {
            Label::Good
        }
    }
}

#[async_trait]
impl SpamClassifier for BayesClassifier {
    async fn classify(&self, text: &str) -> anyhow::Result<Label> {
        Ok(self.score(text))
    }

    async fn train(&self, label: Label, text: &str) -> anyhow::Result<()> {
        match label {
            Label::Good => self.good_posts.fetch_add(1, Ordering::Relaxed),
            Label::Bad => self.bad_posts.fetch_add(1, Ordering::Relaxed),
        };
        for word in tokenize(text) {
            let mut entry = self.words.entry(word).or_insert((0, 0));
            match label {
                Label::Good => entry.0 += 1,
                Label::Bad => entry.1 += 1,
            }
        }
        Ok(())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
}

/// Case-insensitive literal or regex match against the moderator-curated
/// blocklist. Rows with a broken regex are skipped rather than taking
/// the gate down with them.
pub fn matches_blocklist(text: &str, blocklist: &[SpamText]) -> bool {
    let lowered = text.to_lowercase();
    blocklist.iter().any(|entry| {
        if entry.is_regex {
            match Regex::new(&entry.text) {
                Ok(re) => re.is_match(text),
                Err(error) => {
                    tracing::warn!(pattern = %entry.text, %error, "bad spamtext regex");
                    false
                }
            }
        } else {
            !entry.text.is_empty() && lowered.contains(&entry.text.to_lowercase())
        }
    })
}

/// Shouting check: mostly-uppercase posts with enough letters to matter.
pub fn excessive_caps(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 20 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper * 10 > letters.len() * 6
}

/// "bump", "+1" and friends add nothing to a thread.
pub fn low_effort_reply(text: &str) -> bool {
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '!')
        .collect::<String>()
        .to_lowercase();
    matches!(normalized.as_str(), "bump" | "+1" | "this" | "first")
}

fn spam_title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(viagra|cialis|casino|payday loan|work from home|free money)\b")
            .expect("spam title pattern")
    })
}

pub fn spammy_title(title: &str) -> bool {
    spam_title_regex().is_match(title)
}

/// Runs every removal check against a candidate post and reports which
/// ones fired. An empty result means the post goes up untouched.
pub async fn review_post(
    classifier: &dyn SpamClassifier,
    blocklist: &[SpamText],
    author_karma: i64,
    shadow_banned: bool,
    karma_threshold: i64,
    title: Option<&str>,
    content: &str,
) -> Vec<&'static str> {
    let mut reasons = Vec::new();
    if shadow_banned {
        reasons.push("shadow banned");
    }
    let full_text = match title {
        Some(title) => format!("{title}\n{content}"),
        None => content.to_string(),
    };
    if matches_blocklist(&full_text, blocklist) {
        reasons.push("blocklist");
    }
    if excessive_caps(content) {
        reasons.push("excessive caps");
    }
    if title.is_none() && low_effort_reply(content) {
        reasons.push("low effort");
    }
    if let Some(title) = title {
        if spammy_title(title) {
            reasons.push("spammy title");
        }
    }
    if author_karma <= karma_threshold {
        // Fail open: an unreachable classifier never blocks a post.
        match classifier.classify(&full_text).await {
            Ok(Label::Bad) => reasons.push("classifier"),
            Ok(Label::Good) => (),
            Err(error) => {
                tracing::warn!(%error, "spam classifier unavailable, treating post as good")
            }
        }
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DownClassifier;

    #[async_trait]
    impl SpamClassifier for DownClassifier {
        async fn classify(&self, _text: &str) -> anyhow::Result<Label> {
            anyhow::bail!("backend unreachable")
        }
        async fn train(&self, _label: Label, _text: &str) -> anyhow::Result<()> {
            anyhow::bail!("backend unreachable")
        }
    }

    fn literal(text: &str) -> SpamText {
        SpamText {
            id: 0,
            text: text.to_string(),
            is_regex: false,
        }
    }

    fn pattern(text: &str) -> SpamText {
        SpamText {
            id: 0,
            text: text.to_string(),
            is_regex: true,
        }
    }

    #[test]
    fn blocklist_matches_literal_and_regex() {
        let rows = vec![literal("cheap pills"), pattern(r"(?i)crypto\s+giveaway")];
        assert!(matches_blocklist("Buy CHEAP PILLS now", &rows));
        assert!(matches_blocklist("huge Crypto   GIVEAWAY today", &rows));
        assert!(!matches_blocklist("an ordinary comment", &rows));
    }

    #[test]
    fn broken_regex_rows_are_skipped() {
        let rows = vec![pattern(r"((("), literal("pills")];
        assert!(matches_blocklist("pills here", &rows));
        assert!(!matches_blocklist("nothing to see", &rows));
    }

    #[test]
    fn caps_heuristic_needs_enough_letters() {
        assert!(excessive_caps("THIS ENTIRE COMMENT IS SHOUTED AT EVERYONE"));
        assert!(!excessive_caps("OK!"));
        assert!(!excessive_caps(
            "A normal sentence with an ACRONYM in the middle of it"
        ));
    }

    #[test]
    fn bump_replies_are_low_effort() {
        assert!(low_effort_reply("bump"));
        assert!(low_effort_reply(" +1 "));
        assert!(low_effort_reply("This."));
        assert!(!low_effort_reply("bump maps are a texturing technique"));
    }

    #[tokio::test]
    async fn bayes_learns_from_moderated_corpus() {
        let bayes = BayesClassifier::new();
        for _ in 0..5 {
            bayes
                .train(Label::Bad, "buy cheap watches replica watches")
                .await
                .unwrap();
            bayes
                .train(Label::Good, "the march starts at noon downtown")
                .await
                .unwrap();
        }
        assert_eq!(
            bayes.classify("cheap replica watches").await.unwrap(),
            Label::Bad
        );
        assert_eq!(
            bayes.classify("see you at the march downtown").await.unwrap(),
            Label::Good
        );
    }

    #[tokio::test]
    async fn untrained_bayes_says_good() {
        let bayes = BayesClassifier::new();
        assert_eq!(bayes.classify("anything at all").await.unwrap(), Label::Good);
    }

    #[tokio::test]
    async fn classifier_outage_fails_open() {
        let reasons = review_post(&DownClassifier, &[], -10, false, -4, None, "hello there friends").await;
        assert!(reasons.is_empty());
    }

    #[tokio::test]
    async fn shadow_ban_always_flags() {
        let reasons = review_post(
            &DownClassifier,
            &[],
            100,
            true,
            -4,
            Some("a perfectly fine title"),
            "a perfectly fine body",
        )
        .await;
        assert_eq!(reasons, vec!["shadow banned"]);
    }

    #[tokio::test]
    async fn classifier_consulted_only_below_threshold() {
        let bayes = BayesClassifier::new();
        for _ in 0..5 {
            bayes.train(Label::Bad, "spam spam spam spam").await.unwrap();
            bayes.train(Label::Good, "protest news update").await.unwrap();
        }
        let flagged = review_post(&bayes, &[], -5, false, -4, None, "spam spam spam").await;
        assert_eq!(flagged, vec!["classifier"]);
        let trusted = review_post(&bayes, &[], 50, false, -4, None, "spam spam spam").await;
        assert!(trusted.is_empty());
    }
}
