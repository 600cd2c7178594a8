//! Compiled policy: the immutable unit handed to the evaluator

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::closure::SubjectActions;
use crate::concepts::Concepts;
use crate::eval::Module;
use crate::expr::OpcodeElement;
use crate::rules::AccessRule;

/// Caller-owned identifier of the policy source being compiled
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Subject with its action tree and subject-dependent expression table
#[derive(Debug, Clone)]
pub struct CompiledSubject {
    pub name: String,
    pub concept: String,
    pub actions: SubjectActions,
    pub expressions: Vec<OpcodeElement>,
    pub(crate) module: Module,
}

/// Role with its rules grouped by subject
#[derive(Debug, Clone, Default)]
pub struct Role {
    pub name: String,
    rules: HashMap<String, Vec<AccessRule>>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: HashMap::new(),
        }
    }

    pub(crate) fn extend_rules(&mut self, subject: &str, rules: Vec<AccessRule>) {
        self.rules.entry(subject.to_string()).or_default().extend(rules);
    }

    /// Rules declared for `subject`, in declaration order
    pub fn rules_for(&self, subject: &str) -> &[AccessRule] {
        self.rules.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Subjects this role declares rules for
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

/// Output of [`compile`](crate::compile::compile)
///
/// Immutable once built; share it behind an `Arc` for concurrent evaluation.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub(crate) source_id: SourceId,
    pub(crate) schema_version: String,
    pub(crate) user: String,
    pub(crate) environment: Option<String>,
    pub(crate) concepts: Arc<Concepts>,
    pub(crate) common: Vec<OpcodeElement>,
    pub(crate) common_module: Module,
    pub(crate) subjects: Vec<CompiledSubject>,
    pub(crate) subject_index: HashMap<String, usize>,
    pub(crate) roles: HashMap<String, Role>,
}

impl CompiledPolicy {
    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    /// BLAKE3 digest of the source id and model, part of every cache key
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Concept of the acting user
    pub fn user_concept(&self) -> &str {
        &self.user
    }

    pub fn environment_concept(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn concepts(&self) -> &Concepts {
        &self.concepts
    }

    pub fn subject(&self, name: &str) -> Option<&CompiledSubject> {
        self.subject_index.get(name).and_then(|&id| self.subjects.get(id))
    }

    /// Subjects in declaration order
    pub fn subjects(&self) -> &[CompiledSubject] {
        &self.subjects
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Common expression table
    pub fn common_expressions(&self) -> &[OpcodeElement] {
        &self.common
    }

    pub(crate) fn common_module(&self) -> &Module {
        &self.common_module
    }

    /// `Some(true)` if concept `sub` is `sup` or inherits from it;
    /// `None` if either concept is unknown
    pub fn is_sub_type_of(&self, sub: &str, sup: &str) -> Option<bool> {
        self.concepts.is_sub_type_of(sub, sup)
    }

    /// `Some(true)` if action `sub` of `subject` is `sup` or extends it;
    /// `None` if the subject or either action is unknown
    pub fn is_sub_action_of(&self, subject: &str, sub: &str, sup: &str) -> Option<bool> {
        self.subject(subject)?.actions.is_sub_action_of(sub, sup)
    }
}
