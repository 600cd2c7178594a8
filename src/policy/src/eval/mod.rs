//! Request-time evaluation
//!
//! ```text
//! AccessRequest ──► common vector (user, environment) ──► subject vector (instance)
//!                         │ cached                              │ cached
//!                         └──────────────► rule conditions ◄────┘
//!                                               │
//!                            allow/forbid masks merged ──► decision
//! ```

pub mod cache;
pub mod evaluator;
pub mod value;
pub mod vector;

pub use cache::{CacheEntry, CacheStats, EvaluationCache};
pub use evaluator::{AccessDecision, AccessEvaluator, AccessRequest, MatchedRule, Resolution};
pub use vector::{LazyVector, Module, SlotFn};
