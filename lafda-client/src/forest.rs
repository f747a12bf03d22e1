use std::collections::{hash_map, HashMap, HashSet};

use crate::{
    api::{Comment, CommentId, VoteType},
    vote::{self, VoteChange},
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,

    /// Direct replies, in creation order
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn leaf(comment: Comment) -> CommentNode {
        CommentNode {
            comment,
            replies: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including self
    pub fn len(&self) -> usize {
        1 + self.replies.iter().map(|r| r.len()).sum::<usize>()
    }
}

/// The threaded comments of a post
///
/// All the operations that modify the forest consume it and return the
/// modified version, so that a copy kept aside stays untouched and can be
/// restored if the server rejects the change.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Forest {
    roots: Vec<CommentNode>,
}

impl Forest {
    /// Threads a flat list of comments, as returned by the server in creation order
    ///
    /// Every comment ends up exactly once in the result. Comments whose parent is
    /// not in the list are promoted to the root level, and so is the first comment
    /// of any parent cycle. Duplicate ids are dropped, keeping the first one.
    pub fn build(comments: Vec<Comment>) -> Forest {
        let mut index = HashMap::with_capacity(comments.len());
        let mut slots = Vec::with_capacity(comments.len());
        for c in comments {
            match index.entry(c.id) {
                hash_map::Entry::Occupied(_) => {
                    tracing::warn!(id = ?c.id, "dropping duplicate comment")
                }
                hash_map::Entry::Vacant(e) => {
                    e.insert(slots.len());
                    slots.push(Some(c));
                }
            }
        }

        let parents = slots
            .iter()
            .flatten()
            .map(|c| c.parent_id.and_then(|p| index.get(&p).copied()))
            .collect::<Vec<_>>();
        let mut children = vec![Vec::new(); slots.len()];
        let mut roots = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[*p].push(i),
                None => roots.push(i),
            }
        }

        // Anything not reachable from a root hangs, maybe indirectly, from a
        // parent cycle. Only the first member of that cycle is promoted.
        let mut reachable = vec![false; slots.len()];
        for r in roots.iter() {
            mark_reachable(*r, &children, &mut reachable);
        }
        for i in 0..slots.len() {
            if reachable[i] {
                continue;
            }
            let first = cycle_above(i, &parents);
            tracing::warn!(
                id = ?slots[first].as_ref().map(|c| c.id),
                "comment is part of a parent cycle, promoting it to root"
            );
            if let Some(p) = parents[first] {
                children[p].retain(|c| *c != first);
            }
            roots.push(first);
            mark_reachable(first, &children, &mut reachable);
        }
        roots.sort_unstable();

        let roots = roots
            .into_iter()
            .filter_map(|r| assemble(r, &mut slots, &children))
            .collect();
        Forest { roots }
    }

    pub fn roots(&self) -> &[CommentNode] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<CommentNode> {
        self.roots
    }

    /// Total number of comments, replies included
    pub fn len(&self) -> usize {
        self.roots.iter().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, id: CommentId) -> Option<&CommentNode> {
        fn find_in(level: &[CommentNode], id: CommentId) -> Option<&CommentNode> {
            for n in level {
                if n.comment.id == id {
                    return Some(n);
                }
                if let Some(res) = find_in(&n.replies, id) {
                    return Some(res);
                }
            }
            None
        }
        find_in(&self.roots, id)
    }

    /// All the nodes with their depth, in display order
    pub fn depth_first(&self) -> Vec<(usize, &CommentNode)> {
        let mut res = Vec::with_capacity(self.len());
        let mut stack = self.roots.iter().rev().map(|n| (0, n)).collect::<Vec<_>>();
        while let Some((depth, n)) = stack.pop() {
            res.push((depth, n));
            stack.extend(n.replies.iter().rev().map(|r| (depth + 1, r)));
        }
        res
    }

    /// Adds a new comment, under its parent if it is in the forest and at the
    /// root level otherwise
    pub fn insert(self, comment: Comment) -> Forest {
        let parent = comment.parent_id;
        let mut pending = Some(CommentNode::leaf(comment));
        let mut roots = match parent {
            None => self.roots,
            Some(parent) => insert_under(self.roots, parent, &mut pending),
        };
        if let Some(node) = pending {
            if parent.is_some() {
                tracing::warn!(id = ?node.comment.id, ?parent, "parent not found, inserting at the root");
            }
            roots.push(node);
        }
        Forest { roots }
    }

    /// Removes a comment along with all its replies, returning the removed subtree
    pub fn remove(self, id: CommentId) -> (Forest, Option<CommentNode>) {
        let mut removed = None;
        let roots = remove_from(self.roots, id, &mut removed);
        (Forest { roots }, removed)
    }

    /// Swaps the comment `id` for `comment`, keeping its place and its replies
    ///
    /// This is how a placeholder gets replaced by the comment acknowledged by the
    /// server. If `id` is no longer there, `comment` is inserted instead.
    pub fn replace(self, id: CommentId, comment: Comment) -> Forest {
        let new_id = comment.id;
        let mut pending = Some(comment);
        let roots = map_node(self.roots, id, &mut |node: &mut CommentNode| {
            if let Some(c) = pending.take() {
                let reply_count = node.comment.reply_count;
                node.comment = c;
                node.comment.reply_count = reply_count;
                for r in node.replies.iter_mut() {
                    r.comment.parent_id = Some(new_id);
                }
            }
        });
        let forest = Forest { roots };
        match pending {
            None => forest,
            Some(c) => forest.insert(c),
        }
    }

    /// Toggles the viewer's vote on comment `id`
    ///
    /// Returns `None` as the change if the comment is not in the forest.
    pub fn vote(self, id: CommentId, requested: VoteType) -> (Forest, Option<VoteChange>) {
        let mut change = None;
        let roots = map_node(self.roots, id, &mut |node: &mut CommentNode| {
            change = Some(vote::toggle_vote(&mut node.comment, requested));
        });
        (Forest { roots }, change)
    }
}

/// Lowest index of the parent cycle that `from` is, or hangs from
fn cycle_above(from: usize, parents: &[Option<usize>]) -> usize {
    let mut seen = HashSet::new();
    let mut cur = from;
    while seen.insert(cur) {
        match parents[cur] {
            Some(p) => cur = p,
            None => return cur,
        }
    }
    let mut first = cur;
    let mut member = parents[cur].unwrap_or(cur);
    while member != cur {
        first = first.min(member);
        member = parents[member].unwrap_or(cur);
    }
    first
}

fn mark_reachable(from: usize, children: &[Vec<usize>], reachable: &mut [bool]) {
    let mut stack = vec![from];
    while let Some(n) = stack.pop() {
        reachable[n] = true;
        stack.extend(children[n].iter().copied());
    }
}

fn assemble(
    i: usize,
    slots: &mut [Option<Comment>],
    children: &[Vec<usize>],
) -> Option<CommentNode> {
    let mut comment = slots[i].take()?;
    let replies = children[i]
        .iter()
        .filter_map(|c| assemble(*c, slots, children))
        .collect::<Vec<_>>();
    comment.reply_count = replies.len() as u32;
    Some(CommentNode { comment, replies })
}

fn insert_under(
    level: Vec<CommentNode>,
    parent: CommentId,
    pending: &mut Option<CommentNode>,
) -> Vec<CommentNode> {
    level
        .into_iter()
        .map(|mut n| {
            if pending.is_none() {
                return n;
            }
            if n.comment.id == parent {
                if let Some(child) = pending.take() {
                    n.replies.push(child);
                    n.comment.reply_count += 1;
                }
            } else {
                n.replies = insert_under(std::mem::take(&mut n.replies), parent, pending);
            }
            n
        })
        .collect()
}

fn remove_from(
    level: Vec<CommentNode>,
    id: CommentId,
    removed: &mut Option<CommentNode>,
) -> Vec<CommentNode> {
    level
        .into_iter()
        .filter_map(|mut n| {
            let num_replies = n.replies.len();
            n.replies = remove_from(std::mem::take(&mut n.replies), id, removed);
            if n.replies.len() < num_replies {
                n.comment.reply_count = n.comment.reply_count.saturating_sub(1);
            }
            if n.comment.id == id {
                *removed = Some(n);
                return None;
            }
            Some(n)
        })
        .collect()
}

fn map_node<F>(level: Vec<CommentNode>, id: CommentId, f: &mut F) -> Vec<CommentNode>
where
    F: FnMut(&mut CommentNode),
{
    level
        .into_iter()
        .map(|mut n| {
            if n.comment.id == id {
                f(&mut n);
            } else {
                n.replies = map_node(std::mem::take(&mut n.replies), id, f);
            }
            n
        })
        .collect()
}
