//! Per-viewer masking of moderator-removed content.
//!
//! The stored `is_removed` flag is never mutated here; each request
//! computes its own view so two viewers of the same rows can legitimately
//! see different things.

/// Who is looking. Anonymous viewers are identified only by originating
/// IP address.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: Option<i64>,
    pub is_staff: bool,
    pub ip: String,
}

impl Viewer {
    pub fn anonymous(ip: impl Into<String>) -> Self {
        Viewer {
            user_id: None,
            is_staff: false,
            ip: ip.into(),
        }
    }
}

/// Whether `viewer` should see this item as removed.
///
/// Authors never see the removal flag on their own posts, matched by
/// user id or, for anonymous authorship, by posting IP. The point is
/// that trolls should not learn their post was silently removed.
/// Moderators see everything.
pub fn effectively_removed(
    is_removed: bool,
    author_id: Option<i64>,
    author_ip: &str,
    viewer: &Viewer,
) -> bool {
    if !is_removed {
        return false;
    }
    if is_author(author_id, author_ip, viewer) {
        return false;
    }
    if viewer.is_staff {
        return false;
    }
    true
}

fn is_author(author_id: Option<i64>, author_ip: &str, viewer: &Viewer) -> bool {
    match (author_id, viewer.user_id) {
        (Some(author), Some(user)) => author == user,
        // An anonymous post belongs to whoever is still on its IP.
        (None, _) => !author_ip.is_empty() && author_ip == viewer.ip,
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_flag_passes_through_for_strangers() {
        let viewer = Viewer::anonymous("8.8.8.8");
        assert!(effectively_removed(true, Some(7), "1.2.3.4", &viewer));
        assert!(!effectively_removed(false, Some(7), "1.2.3.4", &viewer));
    }

    #[test]
    fn author_is_shielded_from_their_own_removal() {
        let author = Viewer {
            user_id: Some(7),
            is_staff: false,
            ip: "9.9.9.9".into(),
        };
        assert!(!effectively_removed(true, Some(7), "1.2.3.4", &author));
    }

    #[test]
    fn anonymous_author_is_matched_by_ip() {
        let same_ip = Viewer::anonymous("1.2.3.4");
        let other_ip = Viewer::anonymous("5.6.7.8");
        assert!(!effectively_removed(true, None, "1.2.3.4", &same_ip));
        assert!(effectively_removed(true, None, "1.2.3.4", &other_ip));
    }

    #[test]
    fn moderators_see_removed_content() {
        let moderator = Viewer {
            user_id: Some(1),
            is_staff: true,
            ip: "9.9.9.9".into(),
        };
        assert!(!effectively_removed(true, Some(7), "1.2.3.4", &moderator));
    }

    #[test]
    fn blank_recorded_ip_never_matches() {
        // Posts that predate IP logging must not leak to everyone whose
        // address is also unknown.
        let viewer = Viewer::anonymous("");
        assert!(effectively_removed(true, None, "", &viewer));
    }
}
