//! Hash-consing builder for condition expressions
//!
//! All roles of a policy share one builder. The common table (expressions that
//! only depend on the user and the environment) is shared across subjects;
//! every subject gets its own subject-dependent table because the `subject`
//! root has a different type per subject.

use std::collections::HashMap;

use super::opcode::{ExprIndex, Opcode, OpcodeElement, Slot};
use crate::concepts::Concepts;
use crate::error::{PolicyError, Result};
use crate::model::{BinaryOp, BuiltIn, Expression, ExpressionKind, TypeRef, UnaryOp};

/// Append-only opcode table with hash buckets for deduplication
#[derive(Debug, Clone, Default)]
pub struct ExpressionTable {
    elements: Vec<OpcodeElement>,
    by_hash: HashMap<u64, Vec<usize>>,
}

impl ExpressionTable {
    fn find(&self, hash: u64, opcode: &Opcode) -> Option<ExprIndex> {
        self.by_hash
            .get(&hash)?
            .iter()
            .map(|&position| &self.elements[position])
            .find(|element| element.opcode == *opcode)
            .map(|element| element.index)
    }

    fn push(&mut self, hash: u64, element: OpcodeElement, position: usize) {
        self.by_hash.entry(hash).or_default().push(position);
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[OpcodeElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn into_elements(self) -> Vec<OpcodeElement> {
        self.elements
    }
}

#[derive(Debug, Clone)]
struct SubjectTable {
    concept: String,
    table: ExpressionTable,
}

/// Finished tables handed to the compiled policy
#[derive(Debug, Clone, Default)]
pub struct ExpressionTables {
    pub common: Vec<OpcodeElement>,
    /// One table per registered subject, in registration order
    pub subjects: Vec<Vec<OpcodeElement>>,
}

/// Shared expression builder for one policy
pub struct ExpressionBuilder<'c> {
    concepts: &'c Concepts,
    user: String,
    environment: Option<String>,
    common: ExpressionTable,
    subjects: Vec<SubjectTable>,
}

impl<'c> ExpressionBuilder<'c> {
    /// Create a builder with `null`, `true` and `false` pre-seeded at common
    /// indices 0, 1 and 2
    pub fn new(concepts: &'c Concepts, user: impl Into<String>, environment: Option<String>) -> Self {
        let mut builder = Self {
            concepts,
            user: user.into(),
            environment,
            common: ExpressionTable::default(),
            subjects: Vec::new(),
        };
        builder.insert_common(Opcode::Null, TypeRef::Null);
        builder.insert_common(Opcode::Boolean { value: true }, TypeRef::Boolean);
        builder.insert_common(Opcode::Boolean { value: false }, TypeRef::Boolean);
        builder
    }

    fn insert_common(&mut self, opcode: Opcode, ty: TypeRef) {
        let hash = opcode.structural_hash();
        if self.common.find(hash, &opcode).is_none() {
            let position = self.common.len();
            let element = OpcodeElement {
                index: ExprIndex::common(position),
                opcode,
                ty,
            };
            self.common.push(hash, element, position);
        }
    }

    /// Register a subject whose instances have type `concept`; returns its id
    pub fn add_subject(&mut self, concept: impl Into<String>) -> usize {
        self.subjects.push(SubjectTable {
            concept: concept.into(),
            table: ExpressionTable::default(),
        });
        self.subjects.len() - 1
    }

    /// Builder view for expressions written inside a block for `subject`
    pub fn scope(&mut self, subject: usize) -> ExpressionScope<'_, 'c> {
        ExpressionScope {
            builder: self,
            subject,
        }
    }

    pub fn common(&self) -> &ExpressionTable {
        &self.common
    }

    pub fn subject_table(&self, subject: usize) -> Option<&ExpressionTable> {
        self.subjects.get(subject).map(|s| &s.table)
    }

    pub fn finish(self) -> ExpressionTables {
        ExpressionTables {
            common: self.common.into_elements(),
            subjects: self
                .subjects
                .into_iter()
                .map(|s| s.table.into_elements())
                .collect(),
        }
    }
}

/// Expression builder bound to one subject
pub struct ExpressionScope<'b, 'c> {
    builder: &'b mut ExpressionBuilder<'c>,
    subject: usize,
}

impl ExpressionScope<'_, '_> {
    pub fn null(&self) -> ExprIndex {
        ExprIndex::NULL
    }

    pub fn boolean(&self, value: bool) -> ExprIndex {
        if value {
            ExprIndex::TRUE
        } else {
            ExprIndex::FALSE
        }
    }

    pub fn number(&mut self, value: f64) -> ExprIndex {
        self.find_or_insert(Opcode::Number { value }, TypeRef::Number)
    }

    pub fn string(&mut self, value: impl Into<String>) -> ExprIndex {
        self.find_or_insert(
            Opcode::String {
                value: value.into(),
            },
            TypeRef::String,
        )
    }

    pub fn built_in(&mut self, object: BuiltIn) -> Result<ExprIndex> {
        let concept = match object {
            BuiltIn::User => self.builder.user.clone(),
            BuiltIn::Environment => self.builder.environment.clone().ok_or_else(|| {
                PolicyError::type_inference(
                    "environment",
                    "environment",
                    "no environment concept is declared",
                )
            })?,
            BuiltIn::Subject => self.subject_concept()?.to_string(),
        };
        Ok(self.find_or_insert(Opcode::BuiltIn { object }, TypeRef::Concept { name: concept }))
    }

    /// `receiver.property`
    pub fn property(&mut self, receiver: ExprIndex, property: &str) -> Result<ExprIndex> {
        let opcode = Opcode::GetProperty {
            receiver,
            property: property.to_string(),
        };
        let member_type = match self.type_of(receiver)? {
            TypeRef::Concept { name } => self.builder.concepts.member(&name, property).cloned().ok_or_else(|| {
                self.error(
                    &opcode,
                    "property",
                    format!("property '{}' not found in concept '{}'", property, name),
                )
            })?,
            TypeRef::Object { members } => members
                .iter()
                .find(|member| member.name == property)
                .map(|member| member.ty.clone())
                .ok_or_else(|| {
                    self.error(
                        &opcode,
                        "property",
                        format!("property '{}' not found in object type", property),
                    )
                })?,
            other => {
                return Err(self.error(
                    &opcode,
                    "receiver",
                    format!("receiver of type '{}' is not an object", other.describe()),
                ))
            }
        };
        Ok(self.find_or_insert(opcode, member_type))
    }

    /// `receiver[index]`
    pub fn array_index(&mut self, receiver: ExprIndex, index: ExprIndex) -> Result<ExprIndex> {
        let opcode = Opcode::ArrayGet { receiver, index };
        let element = match self.type_of(receiver)? {
            TypeRef::Array { element } => *element,
            other => {
                return Err(self.error(
                    &opcode,
                    "receiver",
                    format!("receiver of type '{}' is not an array", other.describe()),
                ))
            }
        };
        let index_type = self.type_of(index)?;
        if index_type != TypeRef::Number {
            return Err(self.error(
                &opcode,
                "index",
                format!("array index must be a number, found '{}'", index_type.describe()),
            ));
        }
        Ok(self.find_or_insert(opcode, element))
    }

    pub fn binary(&mut self, operator: BinaryOp, left: ExprIndex, right: ExprIndex) -> Result<ExprIndex> {
        let opcode = Opcode::Binary {
            operator,
            left,
            right,
        };
        let lhs = self.type_of(left)?;
        let rhs = self.type_of(right)?;
        let ty = binary_type(operator, &lhs, &rhs).map_err(|message| self.error(&opcode, "operator", message))?;
        Ok(self.find_or_insert(opcode, ty))
    }

    /// `left && right`, collapsing a literal `true` on either side
    pub fn and(&mut self, left: ExprIndex, right: ExprIndex) -> Result<ExprIndex> {
        if left == ExprIndex::TRUE {
            return Ok(right);
        }
        if right == ExprIndex::TRUE {
            return Ok(left);
        }
        self.binary(BinaryOp::And, left, right)
    }

    pub fn unary(&mut self, operator: UnaryOp, operand: ExprIndex) -> Result<ExprIndex> {
        let opcode = Opcode::Unary { operator, operand };
        let operand_type = self.type_of(operand)?;
        let ty = match operator {
            UnaryOp::Not => TypeRef::Boolean,
            UnaryOp::Neg | UnaryOp::Plus => {
                if operand_type != TypeRef::Number {
                    return Err(self.error(
                        &opcode,
                        "operand",
                        format!(
                            "operator '{}' requires a number, found '{}'",
                            operator.symbol(),
                            operand_type.describe()
                        ),
                    ));
                }
                TypeRef::Number
            }
        };
        Ok(self.find_or_insert(opcode, ty))
    }

    /// `operand is concept`
    pub fn type_test(&mut self, operand: ExprIndex, concept: &str) -> Result<ExprIndex> {
        let opcode = Opcode::Is {
            concept: concept.to_string(),
            operand,
        };
        if !self.builder.concepts.contains(concept) {
            return Err(self.error(&opcode, "type", format!("unknown concept '{}'", concept)));
        }
        match self.type_of(operand)? {
            TypeRef::Concept { .. } | TypeRef::Object { .. } => {}
            other => {
                return Err(self.error(
                    &opcode,
                    "operand",
                    format!("type test on non-object type '{}'", other.describe()),
                ))
            }
        }
        Ok(self.find_or_insert(opcode, TypeRef::Boolean))
    }

    /// Lower a resolved expression tree, checking any type annotation it
    /// carries against the type derived here
    pub fn lower(&mut self, expression: &Expression) -> Result<ExprIndex> {
        let index = match &expression.kind {
            ExpressionKind::Null => self.null(),
            ExpressionKind::Boolean { value } => self.boolean(*value),
            ExpressionKind::Number { value } => self.number(*value),
            ExpressionKind::String { value } => self.string(value.clone()),
            ExpressionKind::Root { root } => self.built_in(*root)?,
            ExpressionKind::Property { receiver, member } => {
                let receiver = self.lower(receiver)?;
                self.property(receiver, member)?
            }
            ExpressionKind::ArrayIndex { receiver, index } => {
                let receiver = self.lower(receiver)?;
                let index = self.lower(index)?;
                self.array_index(receiver, index)?
            }
            ExpressionKind::Binary { op, left, right } => {
                let left = self.lower(left)?;
                let right = self.lower(right)?;
                self.binary(*op, left, right)?
            }
            ExpressionKind::Unary { op, operand } => {
                let operand = self.lower(operand)?;
                self.unary(*op, operand)?
            }
            ExpressionKind::Is { operand, concept } => {
                let operand = self.lower(operand)?;
                self.type_test(operand, concept)?
            }
        };

        if let Some(annotated) = &expression.inferred {
            let derived = self.type_of(index)?;
            if *annotated != derived {
                return Err(PolicyError::type_inference(
                    self.render(index),
                    "type",
                    format!(
                        "annotated type '{}' does not match derived type '{}'",
                        annotated.describe(),
                        derived.describe()
                    ),
                ));
            }
        }
        Ok(index)
    }

    /// Stored element for `index`
    pub fn element(&self, index: ExprIndex) -> Option<&OpcodeElement> {
        match index.slot() {
            Slot::Common(position) => self.builder.common.elements.get(position),
            Slot::Subject(position) => self
                .builder
                .subjects
                .get(self.subject)?
                .table
                .elements
                .get(position),
        }
    }

    /// Human-readable rendering of the expression rooted at `index`
    pub fn render(&self, index: ExprIndex) -> String {
        match self.element(index) {
            Some(element) => element.opcode.render(&|operand| self.render(operand)),
            None => index.to_string(),
        }
    }

    fn type_of(&self, index: ExprIndex) -> Result<TypeRef> {
        self.element(index)
            .map(|element| element.ty.clone())
            .ok_or_else(|| PolicyError::type_inference(index.to_string(), "operand", "dangling operand index"))
    }

    fn subject_concept(&self) -> Result<&str> {
        self.builder
            .subjects
            .get(self.subject)
            .map(|s| s.concept.as_str())
            .ok_or_else(|| PolicyError::Configuration(format!("unregistered subject id {}", self.subject)))
    }

    fn error(&self, opcode: &Opcode, field: &str, message: impl Into<String>) -> PolicyError {
        PolicyError::type_inference(opcode.render(&|operand| self.render(operand)), field, message)
    }

    fn find_or_insert(&mut self, opcode: Opcode, ty: TypeRef) -> ExprIndex {
        let hash = opcode.structural_hash();
        let subject_dependent = opcode.is_subject_dependent();
        let table = if subject_dependent {
            // Unregistered subject ids fall back to the common table
            match self.builder.subjects.get_mut(self.subject) {
                Some(subject) => &mut subject.table,
                None => &mut self.builder.common,
            }
        } else {
            &mut self.builder.common
        };

        if let Some(existing) = table.find(hash, &opcode) {
            return existing;
        }

        let position = table.len();
        let index = if subject_dependent {
            ExprIndex::subject(position)
        } else {
            ExprIndex::common(position)
        };
        table.push(hash, OpcodeElement { index, opcode, ty }, position);
        index
    }
}

fn is_primitive(ty: &TypeRef) -> bool {
    matches!(ty, TypeRef::Boolean | TypeRef::Number | TypeRef::String)
}

/// Result type of `lhs <op> rhs`, or why the operands are incompatible
fn binary_type(operator: BinaryOp, lhs: &TypeRef, rhs: &TypeRef) -> std::result::Result<TypeRef, String> {
    let incompatible = || {
        format!(
            "operator '{}' cannot combine '{}' and '{}'",
            operator.symbol(),
            lhs.describe(),
            rhs.describe()
        )
    };
    match operator {
        BinaryOp::And | BinaryOp::Or => Ok(TypeRef::Boolean),
        BinaryOp::Eq | BinaryOp::Ne => {
            if is_primitive(lhs) && is_primitive(rhs) && lhs != rhs {
                Err(incompatible())
            } else {
                Ok(TypeRef::Boolean)
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (lhs, rhs) {
            (TypeRef::Number, TypeRef::Number) | (TypeRef::String, TypeRef::String) => Ok(TypeRef::Boolean),
            _ => Err(incompatible()),
        },
        BinaryOp::Add => match (lhs, rhs) {
            (TypeRef::Number, TypeRef::Number) => Ok(TypeRef::Number),
            (TypeRef::String, TypeRef::String | TypeRef::Number)
            | (TypeRef::Number, TypeRef::String) => Ok(TypeRef::String),
            _ => Err(incompatible()),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (lhs, rhs) {
            (TypeRef::Number, TypeRef::Number) => Ok(TypeRef::Number),
            _ => Err(incompatible()),
        },
        BinaryOp::In => match rhs {
            TypeRef::Array { .. } => Ok(TypeRef::Boolean),
            _ => Err(incompatible()),
        },
    }
}
