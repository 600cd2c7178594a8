//! Nested-set encoding of rooted forests
//!
//! Used for both the concept (type) hierarchy and every subject's action tree.
//! One depth-first pass over all roots assigns each node an interval
//! `[left, right]` from a shared counter; containment of intervals then answers
//! ancestor/descendant questions in O(1).
//!
//! # Example
//!
//! ```rust
//! use ecchi_policy::hierarchy::{HierarchyNode, NestedSet};
//!
//! let set = NestedSet::encode(&[
//!     HierarchyNode::root("UserType".to_string()),
//!     HierarchyNode::child("User2Type".to_string(), "UserType".to_string()),
//! ]).unwrap();
//!
//! assert_eq!(set.is_sub_of("User2Type", "UserType"), Some(true));
//! assert_eq!(set.is_sub_of("UserType", "User2Type"), Some(false));
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Hierarchy-related errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HierarchyError {
    /// The parent graph contains a cycle
    #[error("Circular hierarchy detected: {0}")]
    CircularHierarchy(String),

    /// The same node id was declared twice
    #[error("Duplicate hierarchy node: {0}")]
    DuplicateNode(String),

    /// A node names a parent that was never declared
    #[error("Node '{node}' extends unknown parent '{parent}'")]
    UnknownParent { node: String, parent: String },
}

/// Nested-set interval `[left, right]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub left: u32,
    pub right: u32,
}

impl Interval {
    pub fn new(left: u32, right: u32) -> Self {
        Self { left, right }
    }

    /// `true` if `self` lies inside `sup` (reflexive)
    pub fn is_sub_of(&self, sup: &Interval) -> bool {
        self.left >= sup.left && self.right <= sup.right
    }
}

/// Input node for [`NestedSet::encode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode<K> {
    pub id: K,
    pub parent: Option<K>,
}

impl<K> HierarchyNode<K> {
    pub fn root(id: K) -> Self {
        Self { id, parent: None }
    }

    pub fn child(id: K, parent: K) -> Self {
        Self {
            id,
            parent: Some(parent),
        }
    }

    pub fn new(id: K, parent: Option<K>) -> Self {
        Self { id, parent }
    }
}

/// Immutable nested-set encoding of a forest
#[derive(Debug, Clone, Serialize)]
pub struct NestedSet<K: Eq + Hash> {
    /// Node ids in declaration order
    order: Vec<K>,
    /// Assigned intervals, parallel to `order`
    intervals: Vec<Interval>,
    #[serde(skip)]
    index: HashMap<K, usize>,
}

impl<K> NestedSet<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Encode a forest given as `(id, parent?)` pairs
    ///
    /// Children are visited in declaration order; all roots share one counter.
    ///
    /// # Errors
    ///
    /// - [`HierarchyError::DuplicateNode`] if an id is declared twice
    /// - [`HierarchyError::UnknownParent`] if a parent id is not declared
    /// - [`HierarchyError::CircularHierarchy`] if the parent graph has a cycle
    pub fn encode(nodes: &[HierarchyNode<K>]) -> Result<Self, HierarchyError> {
        let mut index: HashMap<K, usize> = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(HierarchyError::DuplicateNode(node.id.to_string()));
            }
        }

        let mut parents: Vec<Option<usize>> = Vec::with_capacity(nodes.len());
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();
        for (position, node) in nodes.iter().enumerate() {
            match &node.parent {
                Some(parent) => {
                    let parent_position =
                        *index
                            .get(parent)
                            .ok_or_else(|| HierarchyError::UnknownParent {
                                node: node.id.to_string(),
                                parent: parent.to_string(),
                            })?;
                    children[parent_position].push(position);
                    parents.push(Some(parent_position));
                }
                None => {
                    roots.push(position);
                    parents.push(None);
                }
            }
        }

        let mut intervals = vec![Interval::new(0, 0); nodes.len()];
        let mut visited = vec![false; nodes.len()];
        let mut counter: u32 = 0;

        // Iterative DFS: (node, next child cursor)
        let mut stack: Vec<(usize, usize)> = Vec::new();
        for &root in &roots {
            visited[root] = true;
            intervals[root].left = counter;
            counter += 1;
            stack.push((root, 0));

            while let Some((node, cursor)) = stack.pop() {
                if let Some(&child) = children[node].get(cursor) {
                    stack.push((node, cursor + 1));
                    if visited[child] {
                        return Err(HierarchyError::CircularHierarchy(
                            Self::cycle_path(nodes, &parents, child),
                        ));
                    }
                    visited[child] = true;
                    intervals[child].left = counter;
                    counter += 1;
                    stack.push((child, 0));
                } else {
                    intervals[node].right = counter;
                    counter += 1;
                }
            }
        }

        // Nodes on a cycle are unreachable from any root
        if let Some(unreached) = visited.iter().position(|seen| !seen) {
            return Err(HierarchyError::CircularHierarchy(Self::cycle_path(
                nodes, &parents, unreached,
            )));
        }

        Ok(Self {
            order: nodes.iter().map(|node| node.id.clone()).collect(),
            intervals,
            index,
        })
    }

    /// Follow parent links from `start` until a node repeats
    fn cycle_path(nodes: &[HierarchyNode<K>], parents: &[Option<usize>], start: usize) -> String {
        let mut path = Vec::new();
        let mut seen = vec![false; nodes.len()];
        let mut current = Some(start);
        while let Some(node) = current {
            if seen[node] {
                // Trim the lead-in so the path starts at the repeated node
                let cycle_start = path.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[cycle_start..]
                    .iter()
                    .map(|&n: &usize| nodes[n].id.to_string())
                    .collect();
                cycle.push(nodes[node].id.to_string());
                return cycle.join(" -> ");
            }
            seen[node] = true;
            path.push(node);
            current = parents[node];
        }
        path.iter()
            .map(|&n| nodes[n].id.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl<K: Eq + Hash> NestedSet<K> {
    /// Interval assigned to `id`
    pub fn interval<Q>(&self, id: &Q) -> Option<Interval>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(id).map(|&position| self.intervals[position])
    }

    /// Declaration position of `id`
    pub fn position<Q>(&self, id: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(id).copied()
    }

    /// `Some(true)` if `sub` is `sup` or nested beneath it; `None` if either is unknown
    pub fn is_sub_of<Q>(&self, sub: &Q, sup: &Q) -> Option<bool>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Some(self.interval(sub)?.is_sub_of(&self.interval(sup)?))
    }

    /// Positional variant of [`is_sub_of`](Self::is_sub_of); `None` if either
    /// position is out of range
    pub fn is_sub_of_position(&self, sub: usize, sup: usize) -> Option<bool> {
        Some(self.intervals.get(sub)?.is_sub_of(self.intervals.get(sup)?))
    }

    /// Node ids with their intervals, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&K, Interval)> + '_ {
        self.order.iter().zip(self.intervals.iter().copied())
    }

    pub fn ids(&self) -> &[K] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
