//! Rearranges the flat, pre-sorted comment rows of one article into the
//! reply forest the client renders.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::Comment;

/// One comment as presented to a particular viewer, plus its direct
/// replies. `is_removed` here is the per-viewer effective flag, not the
/// stored one, and the content of posts the viewer may not see has
/// already been scrubbed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: i64,
    pub article_id: i64,
    pub author: Option<String>,
    pub published: String,
    pub parent_id: Option<i64>,
    pub content: String,
    pub ups: i64,
    pub downs: i64,
    pub karma: i64,
    pub is_removed: bool,
    pub is_deleted: bool,
    pub upvoted: bool,
    pub downvoted: bool,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    pub fn new(comment: &Comment) -> Self {
        CommentView {
            id: comment.id,
            article_id: comment.article_id,
            author: comment.author.clone(),
            published: comment.published.to_string(),
            parent_id: comment.parent_id,
            content: comment.content.clone(),
            ups: comment.ups,
            downs: comment.downs,
            karma: comment.karma,
            is_removed: comment.is_removed,
            is_deleted: comment.is_deleted,
            upvoted: false,
            downvoted: false,
            replies: Vec::new(),
        }
    }
}

/// Builds the reply hierarchy from a flat list already ordered the way
/// siblings should appear (karma descending, then recency).
///
/// Two O(n) passes: the first indexes children under their parent id and
/// collects the root order, the second materialises each root's subtree.
/// A comment whose parent is not in the supplied set is promoted to a
/// root rather than dropped; this covers parents that were hard-deleted
/// out from under their replies.
pub fn assemble(comments: Vec<CommentView>) -> Vec<CommentView> {
    let ids: HashSet<i64> = comments.iter().map(|c| c.id).collect();
    let mut roots: Vec<i64> = Vec::new();
    let mut child_ids: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut nodes: HashMap<i64, CommentView> = HashMap::with_capacity(comments.len());

    for comment in comments {
        match comment.parent_id.filter(|parent| ids.contains(parent)) {
            Some(parent) => child_ids.entry(parent).or_default().push(comment.id),
            None => roots.push(comment.id),
        }
        nodes.insert(comment.id, comment);
    }

    roots
        .into_iter()
        .map(|id| take_subtree(id, &mut nodes, &child_ids))
        .collect()
}

fn take_subtree(
    id: i64,
    nodes: &mut HashMap<i64, CommentView>,
    child_ids: &HashMap<i64, Vec<i64>>,
) -> CommentView {
    // Depth is bounded by the posting-time nesting limit, so plain
    // recursion is safe here.
    let mut node = nodes.remove(&id).unwrap();
    if let Some(children) = child_ids.get(&id) {
        node.replies = children
            .iter()
            .map(|&child| take_subtree(child, nodes, child_ids))
            .collect();
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: i64, parent_id: Option<i64>, karma: i64) -> CommentView {
        CommentView {
            id,
            article_id: 1,
            author: Some(format!("user{id}")),
            published: String::new(),
            parent_id,
            content: format!("comment {id}"),
            ups: karma.max(0),
            downs: 0,
            karma,
            is_removed: false,
            is_deleted: false,
            upvoted: false,
            downvoted: false,
            replies: Vec::new(),
        }
    }

    #[test]
    fn orphans_are_promoted_to_root() {
        let forest = assemble(vec![
            comment(1, None, 0),
            comment(2, Some(1), 0),
            comment(3, Some(99), 0),
        ]);
        let root_ids: Vec<i64> = forest.iter().map(|c| c.id).collect();
        assert_eq!(root_ids, vec![1, 3]);
        assert_eq!(forest[0].replies.len(), 1);
        assert_eq!(forest[0].replies[0].id, 2);
        assert!(forest[1].replies.is_empty());
    }

    #[test]
    fn sibling_order_is_preserved() {
        // Input ordering is karma descending; replies must keep it.
        let forest = assemble(vec![
            comment(1, None, 10),
            comment(4, Some(1), 7),
            comment(3, Some(1), 5),
            comment(2, None, 1),
            comment(5, Some(1), -2),
        ]);
        assert_eq!(forest.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            forest[0].replies.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![4, 3, 5]
        );
    }

    #[test]
    fn deep_chains_nest_one_reply_per_level() {
        let forest = assemble((1..=15).map(|id| comment(id, (id > 1).then(|| id - 1), 0)).collect());
        assert_eq!(forest.len(), 1);
        let mut depth = 1;
        let mut cursor = &forest[0];
        while let Some(next) = cursor.replies.first() {
            depth += 1;
            cursor = next;
        }
        assert_eq!(depth, 15);
    }

    #[test]
    fn empty_input_yields_empty_forest() {
        assert!(assemble(Vec::new()).is_empty());
    }

    #[test]
    fn views_deserialize_with_nested_replies() {
        let mut root = comment(1, None, 3);
        root.replies.push(comment(2, Some(1), 0));
        let value = serde_json::to_value(&root).unwrap();
        let back: CommentView = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, 1);
        assert_eq!(back.replies.len(), 1);
        assert_eq!(back.replies[0].parent_id, Some(1));
    }
}
