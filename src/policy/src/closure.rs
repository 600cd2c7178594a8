//! Per-subject action trees and their permission closures
//!
//! Every action gets a bit index equal to its declaration position. Two
//! parallel masks are precomputed per action:
//!
//! - allow closure: the action and every action nested beneath it
//! - forbid closure: the action and every action it is nested beneath

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bitmask::{BitCoord, Bitmask};
use crate::error::{PolicyError, Result};
use crate::hierarchy::{HierarchyNode, NestedSet};
use crate::model::{AccessMode, SubjectDecl};

/// Closure masks for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionClosure {
    pub allow: Bitmask,
    pub forbid: Bitmask,
}

impl PermissionClosure {
    pub fn for_mode(&self, mode: AccessMode) -> &Bitmask {
        match mode {
            AccessMode::Allow => &self.allow,
            AccessMode::Forbid => &self.forbid,
        }
    }
}

/// Encoded action tree of one subject
#[derive(Debug, Clone)]
pub struct SubjectActions {
    actions: NestedSet<String>,
    closures: Vec<PermissionClosure>,
}

impl SubjectActions {
    /// Encode the actions of `subject` and precompute both closures for each
    ///
    /// # Errors
    ///
    /// Returns a configuration error on duplicate action names (which would
    /// assign two bits to one action), unknown `extends` targets, or cycles.
    pub fn build(subject: &SubjectDecl) -> Result<Self> {
        let nodes: Vec<HierarchyNode<String>> = subject
            .actions
            .iter()
            .map(|action| HierarchyNode::new(action.name.clone(), action.extends.clone()))
            .collect();
        let actions = NestedSet::encode(&nodes).map_err(|err| {
            PolicyError::Configuration(format!("Subject '{}': {}", subject.name, err))
        })?;

        let count = actions.len();
        let closures = (0..count)
            .map(|x| PermissionClosure {
                allow: Bitmask::from_indices(
                    count,
                    (0..count).filter(|&y| actions.is_sub_of_position(y, x) == Some(true)),
                ),
                forbid: Bitmask::from_indices(
                    count,
                    (0..count).filter(|&y| actions.is_sub_of_position(x, y) == Some(true)),
                ),
            })
            .collect();

        debug!("Subject '{}': {} actions encoded", subject.name, count);
        Ok(Self { actions, closures })
    }

    /// Bit index of `action`
    pub fn bit(&self, action: &str) -> Option<usize> {
        self.actions.position(action)
    }

    /// Byte/bit coordinate of `action` in this subject's masks
    pub fn coord(&self, action: &str) -> Option<BitCoord> {
        self.bit(action).map(BitCoord::of)
    }

    pub fn closure(&self, bit: usize) -> Option<&PermissionClosure> {
        self.closures.get(bit)
    }

    /// OR of the `mode` closures of `bits`
    pub fn merged_closure(&self, bits: &[usize], mode: AccessMode) -> Bitmask {
        Bitmask::or(
            bits.iter()
                .filter_map(|&bit| self.closures.get(bit))
                .map(|closure| closure.for_mode(mode)),
        )
    }

    /// `Some(true)` if `sub` is `sup` or extends it, directly or transitively
    pub fn is_sub_action_of(&self, sub: &str, sup: &str) -> Option<bool> {
        self.actions.is_sub_of(sub, sup)
    }

    /// Action names in bit order
    pub fn names(&self) -> &[String] {
        self.actions.ids()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
