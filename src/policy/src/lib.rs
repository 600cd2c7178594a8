//! # Ecchi Policy Compiler
//!
//! Compiles resolved authorization policies (concept hierarchies, subjects
//! with hierarchical actions, role-scoped allow/forbid rules with conditions)
//! into an immutable [`CompiledPolicy`] and answers
//! `can(user, roles, subject, instance, action)` against it.
//!
//! ## Features
//!
//! - **Nested-set hierarchies** for O(1) subtype and sub-action tests
//! - **Permission closures**: allow propagates to nested actions, forbid to
//!   the actions above
//! - **Hash-consed condition IR** split into user/environment-only and
//!   subject-dependent tables
//! - **Lazy, LRU-cached evaluation** of condition vectors
//! - **Forbid wins** over allow across all active roles
//!
//! ## Example
//!
//! ```rust
//! use ecchi_policy::{
//!     compile, AccessEvaluator, AccessRequest, ConceptDecl, EvaluatorConfig, Expression, Model,
//!     RoleDecl, SourceId, Statement, SubjectDecl, TypeRef,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), ecchi_policy::PolicyError> {
//! let model = Model::new("UserType")
//!     .with_concept(ConceptDecl::new("UserType").member("id", TypeRef::Number))
//!     .with_concept(ConceptDecl::new("ArticleType").member("author", TypeRef::concept("UserType")))
//!     .with_subject(
//!         SubjectDecl::new("Article", "ArticleType")
//!             .action("read")
//!             .action_extends("edit", "read"),
//!     )
//!     .with_role(RoleDecl::new("Writer").block(
//!         "Article",
//!         vec![Statement::when(
//!             Expression::user().get("id").equals(Expression::subject().get("author").get("id")),
//!             vec![Statement::allow(["edit"])],
//!         )],
//!     ));
//!
//! let policy = compile(&model, SourceId::new("blog.policy"))?;
//! let evaluator = AccessEvaluator::new(Arc::new(policy), EvaluatorConfig::default())?;
//!
//! let request = AccessRequest::new(json!({ "id": 1 }), "Article", json!({ "author": { "id": 1 } }))
//!     .with_roles(["Writer"]);
//! assert!(evaluator.can(&request, "edit")?);
//! assert!(!evaluator.can(&request, "read")?);
//! # Ok(())
//! # }
//! ```

pub mod bitmask;
pub mod closure;
pub mod compile;
pub mod concepts;
pub mod config;
pub mod error;
pub mod eval;
pub mod expr;
pub mod hierarchy;
pub mod model;
pub mod policy;
pub mod rules;

// Re-export commonly used types
pub use bitmask::{BitCoord, Bitmask};
pub use closure::{PermissionClosure, SubjectActions};
pub use compile::compile;
pub use concepts::Concepts;
pub use config::{CacheConfig, EvaluatorConfig};
pub use error::{PolicyError, Result};
pub use eval::{
    AccessDecision, AccessEvaluator, AccessRequest, CacheStats, EvaluationCache, MatchedRule,
    Resolution,
};
pub use expr::{ExprIndex, ExpressionBuilder, Opcode, OpcodeElement};
pub use hierarchy::{HierarchyError, HierarchyNode, Interval, NestedSet};
pub use model::{
    AccessMode, ActionSelection, Alternative, BinaryOp, BuiltIn, ConceptDecl, Expression,
    ExpressionKind, MemberDecl, Model, RoleBlock, RoleDecl, Statement, SubjectDecl, TypeRef,
    UnaryOp, WhenStatement,
};
pub use policy::{CompiledPolicy, CompiledSubject, Role, SourceId};
pub use rules::{AccessRule, RuleRenderer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
