//! Hash-consed condition IR
//!
//! Conditions are lowered into two append-only opcode tables: a common table
//! shared by every subject and a per-subject table for anything that reads
//! `subject`. Structurally equal subexpressions share one index.

pub mod builder;
pub mod opcode;

pub use builder::{ExpressionBuilder, ExpressionScope, ExpressionTable, ExpressionTables};
pub use opcode::{ExprIndex, Opcode, OpcodeElement, Slot};
