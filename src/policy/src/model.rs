//! Resolved, typed policy model
//!
//! This is the input handed over by the DSL front end after parsing, scope
//! resolution and type checking. Every reference is a plain name that the
//! front end has already resolved; [`compile`](crate::compile::compile)
//! re-validates them and reports dangling names as configuration errors.
//!
//! The model is `serde`-deserializable so a front end in any language can
//! hand it over as JSON.

use serde::{Deserialize, Serialize};

/// Whole-policy declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Concept describing the acting user
    pub user: String,

    /// Concept describing the request environment, if declared
    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub concepts: Vec<ConceptDecl>,

    #[serde(default)]
    pub subjects: Vec<SubjectDecl>,

    #[serde(default)]
    pub roles: Vec<RoleDecl>,
}

impl Model {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_concept(mut self, concept: ConceptDecl) -> Self {
        self.concepts.push(concept);
        self
    }

    pub fn with_subject(mut self, subject: SubjectDecl) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_role(mut self, role: RoleDecl) -> Self {
        self.roles.push(role);
        self
    }
}

/// Data type declaration with single inheritance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptDecl {
    pub name: String,

    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub members: Vec<MemberDecl>,
}

impl ConceptDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            members: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn member(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.members.push(MemberDecl {
            name: name.into(),
            ty,
        });
        self
    }
}

/// Named, typed member of a concept or inline object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDecl {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: TypeRef,
}

/// Type of a member or expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeRef {
    Boolean,
    Number,
    String,
    Null,
    Array { element: Box<TypeRef> },
    Concept { name: String },
    Object { members: Vec<MemberDecl> },
}

impl TypeRef {
    pub fn array(element: TypeRef) -> Self {
        TypeRef::Array {
            element: Box::new(element),
        }
    }

    pub fn concept(name: impl Into<String>) -> Self {
        TypeRef::Concept { name: name.into() }
    }

    /// Short name used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            TypeRef::Boolean => "boolean".to_string(),
            TypeRef::Number => "number".to_string(),
            TypeRef::String => "string".to_string(),
            TypeRef::Null => "null".to_string(),
            TypeRef::Array { element } => format!("{}[]", element.describe()),
            TypeRef::Concept { name } => name.clone(),
            TypeRef::Object { members } => format!(
                "{{{}}}",
                members
                    .iter()
                    .map(|m| format!("{}: {}", m.name, m.ty.describe()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Authorizable resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDecl {
    pub name: String,

    /// Concept describing the resource's data
    pub concept: String,

    /// Actions in declaration order; the order fixes bit indices
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
}

impl SubjectDecl {
    pub fn new(name: impl Into<String>, concept: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            concept: concept.into(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.push(ActionDecl {
            name: name.into(),
            extends: None,
        });
        self
    }

    pub fn action_extends(mut self, name: impl Into<String>, parent: impl Into<String>) -> Self {
        self.actions.push(ActionDecl {
            name: name.into(),
            extends: Some(parent.into()),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecl {
    pub name: String,

    #[serde(default)]
    pub extends: Option<String>,
}

/// Role with per-subject statement blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDecl {
    pub name: String,

    #[serde(default)]
    pub blocks: Vec<RoleBlock>,
}

impl RoleDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
        }
    }

    /// Add a `for <subject> { ... }` block
    pub fn block(mut self, subject: impl Into<String>, statements: Vec<Statement>) -> Self {
        self.blocks.push(RoleBlock {
            subject: subject.into(),
            statements,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBlock {
    pub subject: String,

    #[serde(default)]
    pub statements: Vec<Statement>,
}

/// `allow` or `forbid`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Allow,
    Forbid,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::Allow => write!(f, "allow"),
            AccessMode::Forbid => write!(f, "forbid"),
        }
    }
}

/// Actions targeted by a permission statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionSelection {
    Everything,
    Actions(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Statement {
    Permission {
        mode: AccessMode,
        actions: ActionSelection,
    },
    When(WhenStatement),
}

impl Statement {
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Statement::Permission {
            mode: AccessMode::Allow,
            actions: ActionSelection::Actions(actions.into_iter().map(Into::into).collect()),
        }
    }

    pub fn forbid<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Statement::Permission {
            mode: AccessMode::Forbid,
            actions: ActionSelection::Actions(actions.into_iter().map(Into::into).collect()),
        }
    }

    pub fn allow_everything() -> Self {
        Statement::Permission {
            mode: AccessMode::Allow,
            actions: ActionSelection::Everything,
        }
    }

    pub fn forbid_everything() -> Self {
        Statement::Permission {
            mode: AccessMode::Forbid,
            actions: ActionSelection::Everything,
        }
    }

    pub fn when(condition: Expression, then: Vec<Statement>) -> Self {
        Statement::When(WhenStatement {
            condition,
            then,
            alternative: None,
        })
    }

    pub fn when_else(condition: Expression, then: Vec<Statement>, otherwise: Vec<Statement>) -> Self {
        Statement::When(WhenStatement {
            condition,
            then,
            alternative: Some(Alternative::Else(otherwise)),
        })
    }
}

/// `when <condition> { ... } [else ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenStatement {
    pub condition: Expression,

    #[serde(default)]
    pub then: Vec<Statement>,

    #[serde(default)]
    pub alternative: Option<Alternative>,
}

impl WhenStatement {
    /// Chain an `else when` branch
    pub fn else_when(mut self, next: WhenStatement) -> Self {
        self.alternative = Some(Alternative::When(Box::new(next)));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Alternative {
    When(Box<WhenStatement>),
    Else(Vec<Statement>),
}

/// Built-in expression roots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltIn {
    User,
    Environment,
    Subject,
}

impl std::fmt::Display for BuiltIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuiltIn::User => write!(f, "user"),
            BuiltIn::Environment => write!(f, "environment"),
            BuiltIn::Subject => write!(f, "subject"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
    #[serde(rename = "in")]
    In,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "+")]
    Plus,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
        }
    }
}

/// Condition expression with its pre-inferred type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(flatten)]
    pub kind: ExpressionKind,

    /// Type inferred by the front end, cross-checked during compilation
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub inferred: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExpressionKind {
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
    Root {
        root: BuiltIn,
    },
    Property {
        receiver: Box<Expression>,
        member: String,
    },
    ArrayIndex {
        receiver: Box<Expression>,
        index: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Is {
        operand: Box<Expression>,
        concept: String,
    },
}

impl From<ExpressionKind> for Expression {
    fn from(kind: ExpressionKind) -> Self {
        Self {
            kind,
            inferred: None,
        }
    }
}

impl Expression {
    pub fn null() -> Self {
        ExpressionKind::Null.into()
    }

    pub fn boolean(value: bool) -> Self {
        ExpressionKind::Boolean { value }.into()
    }

    pub fn number(value: f64) -> Self {
        ExpressionKind::Number { value }.into()
    }

    pub fn string(value: impl Into<String>) -> Self {
        ExpressionKind::String {
            value: value.into(),
        }
        .into()
    }

    pub fn user() -> Self {
        ExpressionKind::Root {
            root: BuiltIn::User,
        }
        .into()
    }

    pub fn environment() -> Self {
        ExpressionKind::Root {
            root: BuiltIn::Environment,
        }
        .into()
    }

    pub fn subject() -> Self {
        ExpressionKind::Root {
            root: BuiltIn::Subject,
        }
        .into()
    }

    /// `self.member`
    pub fn get(self, member: impl Into<String>) -> Self {
        ExpressionKind::Property {
            receiver: Box::new(self),
            member: member.into(),
        }
        .into()
    }

    /// `self[index]`
    pub fn at(self, index: Expression) -> Self {
        ExpressionKind::ArrayIndex {
            receiver: Box::new(self),
            index: Box::new(index),
        }
        .into()
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        ExpressionKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
        .into()
    }

    pub fn equals(self, other: Expression) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    pub fn and(self, other: Expression) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expression) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        ExpressionKind::Unary {
            op,
            operand: Box::new(operand),
        }
        .into()
    }

    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    /// `self is Concept`
    pub fn is(self, concept: impl Into<String>) -> Self {
        ExpressionKind::Is {
            operand: Box::new(self),
            concept: concept.into(),
        }
        .into()
    }

    /// Attach the front end's inferred type
    pub fn typed(mut self, ty: TypeRef) -> Self {
        self.inferred = Some(ty);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_from_json() {
        let model: Model = serde_json::from_value(json!({
            "user": "UserType",
            "concepts": [
                { "name": "UserType", "members": [{ "name": "id", "type": { "kind": "number" } }] },
                { "name": "ArticleType", "members": [
                    { "name": "author", "type": { "kind": "concept", "name": "UserType" } }
                ]}
            ],
            "subjects": [
                { "name": "Article", "concept": "ArticleType", "actions": [
                    { "name": "read" },
                    { "name": "edit", "extends": "read" }
                ]}
            ],
            "roles": [
                { "name": "Admin", "blocks": [
                    { "subject": "Article", "statements": [
                        { "kind": "permission", "mode": "allow", "actions": "everything" },
                        { "kind": "when",
                          "condition": {
                              "kind": "binary", "op": "==",
                              "left": { "kind": "property", "member": "id",
                                        "receiver": { "kind": "root", "root": "user" } },
                              "right": { "kind": "number", "value": 1.0 },
                              "type": { "kind": "boolean" }
                          },
                          "then": [
                              { "kind": "permission", "mode": "forbid", "actions": { "actions": ["edit"] } }
                          ]
                        }
                    ]}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(model.user, "UserType");
        assert_eq!(model.subjects[0].actions[1].extends.as_deref(), Some("read"));

        let statements = &model.roles[0].blocks[0].statements;
        assert_eq!(statements[0], Statement::allow_everything());
        match &statements[1] {
            Statement::When(when) => {
                assert_eq!(when.condition.inferred, Some(TypeRef::Boolean));
                assert_eq!(when.then[0], Statement::forbid(["edit"]));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_builder_helpers() {
        let expr = Expression::user().get("id").equals(Expression::subject().get("author").get("id"));
        match expr.kind {
            ExpressionKind::Binary { op, .. } => assert_eq!(op, BinaryOp::Eq),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_type_description() {
        assert_eq!(TypeRef::array(TypeRef::Number).describe(), "number[]");
        assert_eq!(TypeRef::concept("UserType").describe(), "UserType");
    }
}
