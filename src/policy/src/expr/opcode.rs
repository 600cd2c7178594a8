//! Opcode graph nodes

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::model::{BinaryOp, BuiltIn, TypeRef, UnaryOp};

/// Signed index into one of the two expression tables
///
/// Non-negative values address the common table directly. Negative values
/// address the subject-dependent table: `-1` is slot 0, `-2` is slot 1, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprIndex(i32);

/// Table position an [`ExprIndex`] resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Common(usize),
    Subject(usize),
}

impl ExprIndex {
    /// Pre-seeded `null` literal
    pub const NULL: ExprIndex = ExprIndex(0);
    /// Pre-seeded `true` literal
    pub const TRUE: ExprIndex = ExprIndex(1);
    /// Pre-seeded `false` literal
    pub const FALSE: ExprIndex = ExprIndex(2);

    pub fn common(position: usize) -> Self {
        ExprIndex(position as i32)
    }

    pub fn subject(position: usize) -> Self {
        ExprIndex(-(position as i32) - 1)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }

    pub fn is_common(&self) -> bool {
        self.0 >= 0
    }

    pub fn is_subject_dependent(&self) -> bool {
        self.0 < 0
    }

    pub fn slot(&self) -> Slot {
        if self.0 >= 0 {
            Slot::Common(self.0 as usize)
        } else {
            Slot::Subject((-(self.0 + 1)) as usize)
        }
    }
}

impl fmt::Display for ExprIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One node of the condition graph
///
/// Operands are referenced by index only, so two opcodes are structurally
/// equal exactly when their tags and defining fields are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Opcode {
    Null,
    Boolean {
        value: bool,
    },
    Number {
        value: f64,
    },
    String {
        value: String,
    },
    BuiltIn {
        object: BuiltIn,
    },
    GetProperty {
        receiver: ExprIndex,
        property: String,
    },
    ArrayGet {
        receiver: ExprIndex,
        index: ExprIndex,
    },
    Binary {
        operator: BinaryOp,
        left: ExprIndex,
        right: ExprIndex,
    },
    Unary {
        operator: UnaryOp,
        operand: ExprIndex,
    },
    Is {
        concept: String,
        operand: ExprIndex,
    },
}

impl Opcode {
    /// Operand indices in evaluation order
    pub fn operands(&self) -> Vec<ExprIndex> {
        match self {
            Opcode::Null
            | Opcode::Boolean { .. }
            | Opcode::Number { .. }
            | Opcode::String { .. }
            | Opcode::BuiltIn { .. } => Vec::new(),
            Opcode::GetProperty { receiver, .. } => vec![*receiver],
            Opcode::ArrayGet { receiver, index } => vec![*receiver, *index],
            Opcode::Binary { left, right, .. } => vec![*left, *right],
            Opcode::Unary { operand, .. } => vec![*operand],
            Opcode::Is { operand, .. } => vec![*operand],
        }
    }

    /// Subject dependence is a property of the node itself or any operand
    pub fn is_subject_dependent(&self) -> bool {
        matches!(
            self,
            Opcode::BuiltIn {
                object: BuiltIn::Subject
            }
        ) || self.operands().iter().any(ExprIndex::is_subject_dependent)
    }

    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Render with operands expanded by `operand`
    pub fn render(&self, operand: &dyn Fn(ExprIndex) -> String) -> String {
        match self {
            Opcode::Null => "null".to_string(),
            Opcode::Boolean { value } => value.to_string(),
            Opcode::Number { value } => value.to_string(),
            Opcode::String { value } => format!("{:?}", value),
            Opcode::BuiltIn { object } => object.to_string(),
            Opcode::GetProperty { receiver, property } => {
                format!("{}.{}", operand(*receiver), property)
            }
            Opcode::ArrayGet { receiver, index } => {
                format!("{}[{}]", operand(*receiver), operand(*index))
            }
            Opcode::Binary {
                operator,
                left,
                right,
            } => format!(
                "({} {} {})",
                operand(*left),
                operator.symbol(),
                operand(*right)
            ),
            Opcode::Unary { operator, operand: inner } => {
                format!("{}{}", operator.symbol(), operand(*inner))
            }
            Opcode::Is { concept, operand: inner } => {
                format!("({} is {})", operand(*inner), concept)
            }
        }
    }
}

impl PartialEq for Opcode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Opcode::Null, Opcode::Null) => true,
            (Opcode::Boolean { value: a }, Opcode::Boolean { value: b }) => a == b,
            // Bitwise so equality agrees with the hash
            (Opcode::Number { value: a }, Opcode::Number { value: b }) => a.to_bits() == b.to_bits(),
            (Opcode::String { value: a }, Opcode::String { value: b }) => a == b,
            (Opcode::BuiltIn { object: a }, Opcode::BuiltIn { object: b }) => a == b,
            (
                Opcode::GetProperty { receiver: ra, property: pa },
                Opcode::GetProperty { receiver: rb, property: pb },
            ) => ra == rb && pa == pb,
            (
                Opcode::ArrayGet { receiver: ra, index: ia },
                Opcode::ArrayGet { receiver: rb, index: ib },
            ) => ra == rb && ia == ib,
            (
                Opcode::Binary { operator: oa, left: la, right: ra },
                Opcode::Binary { operator: ob, left: lb, right: rb },
            ) => oa == ob && la == lb && ra == rb,
            (
                Opcode::Unary { operator: oa, operand: a },
                Opcode::Unary { operator: ob, operand: b },
            ) => oa == ob && a == b,
            (
                Opcode::Is { concept: ca, operand: a },
                Opcode::Is { concept: cb, operand: b },
            ) => ca == cb && a == b,
            _ => false,
        }
    }
}

impl Eq for Opcode {}

impl Hash for Opcode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Opcode::Null => {}
            Opcode::Boolean { value } => value.hash(state),
            Opcode::Number { value } => value.to_bits().hash(state),
            Opcode::String { value } => value.hash(state),
            Opcode::BuiltIn { object } => object.hash(state),
            Opcode::GetProperty { receiver, property } => {
                receiver.hash(state);
                property.hash(state);
            }
            Opcode::ArrayGet { receiver, index } => {
                receiver.hash(state);
                index.hash(state);
            }
            Opcode::Binary {
                operator,
                left,
                right,
            } => {
                operator.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Opcode::Unary { operator, operand } => {
                operator.hash(state);
                operand.hash(state);
            }
            Opcode::Is { concept, operand } => {
                concept.hash(state);
                operand.hash(state);
            }
        }
    }
}

/// Opcode stored in a table, with its index and result type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpcodeElement {
    pub index: ExprIndex,
    pub opcode: Opcode,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}
