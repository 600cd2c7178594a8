//! Lazily evaluated expression vectors
//!
//! A [`Module`] holds one closure per opcode of a table. A [`LazyVector`]
//! pairs a module with concrete inputs and fills each slot on first read.
//! Opcodes only reference earlier slots, so filling a slot never re-enters
//! itself.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::value::{self, NULL};
use crate::concepts::Concepts;
use crate::expr::{ExprIndex, Opcode, OpcodeElement, Slot};
use crate::model::{BinaryOp, BuiltIn};

/// Computes one slot, reading operands through the vector
pub type SlotFn = Arc<dyn Fn(&LazyVector) -> Value + Send + Sync>;

/// Compiled closures for one opcode table
#[derive(Clone)]
pub struct Module {
    slots: Arc<[SlotFn]>,
}

impl Module {
    pub fn new(slots: Vec<SlotFn>) -> Self {
        Self {
            slots: slots.into(),
        }
    }

    /// One closure per element of `table`, in table order
    pub fn compile(table: &[OpcodeElement], concepts: &Arc<Concepts>) -> Self {
        Self::new(
            table
                .iter()
                .map(|element| slot_fn(&element.opcode, concepts))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("slots", &self.slots.len()).finish()
    }
}

fn slot_fn(opcode: &Opcode, concepts: &Arc<Concepts>) -> SlotFn {
    match opcode.clone() {
        Opcode::Null => Arc::new(|_: &LazyVector| Value::Null),
        Opcode::Boolean { value } => Arc::new(move |_: &LazyVector| Value::Bool(value)),
        Opcode::Number { value } => {
            let value = value::number(value);
            Arc::new(move |_: &LazyVector| value.clone())
        }
        Opcode::String { value } => {
            let value = Value::String(value);
            Arc::new(move |_: &LazyVector| value.clone())
        }
        Opcode::BuiltIn { object } => Arc::new(move |v: &LazyVector| v.root(object).clone()),
        Opcode::GetProperty { receiver, property } => {
            Arc::new(move |v: &LazyVector| value::get_property(v.get(receiver), &property))
        }
        Opcode::ArrayGet { receiver, index } => {
            Arc::new(move |v: &LazyVector| value::array_get(v.get(receiver), v.get(index)))
        }
        Opcode::Binary {
            operator: BinaryOp::And,
            left,
            right,
        } => Arc::new(move |v: &LazyVector| {
            let left = v.get(left);
            if value::truthy(left) {
                v.get(right).clone()
            } else {
                left.clone()
            }
        }),
        Opcode::Binary {
            operator: BinaryOp::Or,
            left,
            right,
        } => Arc::new(move |v: &LazyVector| {
            let left = v.get(left);
            if value::truthy(left) {
                left.clone()
            } else {
                v.get(right).clone()
            }
        }),
        Opcode::Binary {
            operator,
            left,
            right,
        } => Arc::new(move |v: &LazyVector| value::binary(operator, v.get(left), v.get(right))),
        Opcode::Unary { operator, operand } => {
            Arc::new(move |v: &LazyVector| value::unary(operator, v.get(operand)))
        }
        Opcode::Is { concept, operand } => {
            let concepts = Arc::clone(concepts);
            Arc::new(move |v: &LazyVector| {
                let matches = value::type_tag(v.get(operand))
                    .and_then(|tag| concepts.is_sub_type_of(tag, &concept))
                    .unwrap_or(false);
                Value::Bool(matches)
            })
        }
    }
}

enum Inputs {
    Common {
        user: Value,
        environment: Value,
    },
    Subject {
        common: Arc<LazyVector>,
        subject: Value,
    },
}

/// Write-once slot vector over one opcode table
pub struct LazyVector {
    module: Module,
    slots: Vec<OnceLock<Value>>,
    inputs: Inputs,
}

impl LazyVector {
    /// Vector over the common table for one `(user, environment)` pair
    pub fn common(module: Module, user: Value, environment: Value) -> Self {
        Self::with_inputs(module, Inputs::Common { user, environment })
    }

    /// Vector over a subject table; common indices are read from `common`
    pub fn subject(module: Module, common: Arc<LazyVector>, subject: Value) -> Self {
        Self::with_inputs(module, Inputs::Subject { common, subject })
    }

    fn with_inputs(module: Module, inputs: Inputs) -> Self {
        let slots = (0..module.len()).map(|_| OnceLock::new()).collect();
        Self {
            module,
            slots,
            inputs,
        }
    }

    /// Value of expression `index`, computing it on first read
    ///
    /// Subject indices read from a common vector, and indices beyond the
    /// table, read as `null`.
    pub fn get(&self, index: ExprIndex) -> &Value {
        match (index.slot(), &self.inputs) {
            (Slot::Common(position), Inputs::Subject { common, .. }) => common.slot(position),
            (Slot::Common(position), Inputs::Common { .. }) => self.slot(position),
            (Slot::Subject(position), Inputs::Subject { .. }) => self.slot(position),
            (Slot::Subject(_), Inputs::Common { .. }) => &NULL,
        }
    }

    fn slot(&self, position: usize) -> &Value {
        match (self.slots.get(position), self.module.slots.get(position)) {
            (Some(cell), Some(compute)) => cell.get_or_init(|| compute(self)),
            _ => &NULL,
        }
    }

    fn root(&self, object: BuiltIn) -> &Value {
        match (&self.inputs, object) {
            (Inputs::Common { user, .. }, BuiltIn::User) => user,
            (Inputs::Common { environment, .. }, BuiltIn::Environment) => environment,
            (Inputs::Common { .. }, BuiltIn::Subject) => &NULL,
            (Inputs::Subject { subject, .. }, BuiltIn::Subject) => subject,
            (Inputs::Subject { common, .. }, _) => common.root(object),
        }
    }

    /// Number of slots filled so far
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for LazyVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyVector")
            .field("len", &self.len())
            .field("filled", &self.filled())
            .finish()
    }
}
