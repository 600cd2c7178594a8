//! Shared blog policy fixture

#![allow(dead_code)]

use ecchi_policy::{
    compile, AccessEvaluator, AccessRequest, CompiledPolicy, ConceptDecl, EvaluatorConfig,
    Expression, Model, RoleDecl, SourceId, Statement, SubjectDecl, TypeRef,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// `user.id == subject.author.id`
pub fn is_author() -> Expression {
    Expression::user()
        .get("id")
        .equals(Expression::subject().get("author").get("id"))
}

/// Blog model: `Article` with `read`, `edit extends read`, `create`
pub fn blog_model() -> Model {
    Model::new("UserType")
        .with_environment("EnvType")
        .with_concept(
            ConceptDecl::new("UserType")
                .member("id", TypeRef::Number)
                .member("name", TypeRef::String)
                .member("groups", TypeRef::array(TypeRef::String)),
        )
        .with_concept(
            ConceptDecl::new("User2Type")
                .extends("UserType")
                .member("email", TypeRef::String),
        )
        .with_concept(
            ConceptDecl::new("ArticleType")
                .member("author", TypeRef::concept("UserType"))
                .member("published", TypeRef::Boolean),
        )
        .with_concept(ConceptDecl::new("EnvType").member("maintenance", TypeRef::Boolean))
        .with_subject(
            SubjectDecl::new("Article", "ArticleType")
                .action("read")
                .action_extends("edit", "read")
                .action("create"),
        )
        .with_role(RoleDecl::new("NormalUser").block(
            "Article",
            vec![Statement::when_else(
                is_author(),
                vec![Statement::allow(["edit"])],
                vec![Statement::allow(["read", "create"])],
            )],
        ))
        .with_role(RoleDecl::new("Admin").block(
            "Article",
            vec![Statement::allow(["read", "edit", "create"])],
        ))
        .with_role(RoleDecl::new("EditLocked").block("Article", vec![Statement::forbid(["edit"])]))
        .with_role(RoleDecl::new("Maintenance").block(
            "Article",
            vec![Statement::when(
                Expression::environment().get("maintenance"),
                vec![Statement::forbid_everything()],
            )],
        ))
}

pub fn blog_policy() -> Arc<CompiledPolicy> {
    Arc::new(compile(&blog_model(), SourceId::new("blog.ecchi")).expect("blog policy compiles"))
}

/// Install a test log subscriber once; filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn evaluator() -> AccessEvaluator {
    init_tracing();
    AccessEvaluator::new(blog_policy(), EvaluatorConfig::default()).expect("evaluator")
}

pub fn user(id: u64) -> Value {
    json!({ "$type": "UserType", "id": id, "name": format!("user{}", id), "groups": [] })
}

pub fn article(author: u64) -> Value {
    json!({ "$type": "ArticleType", "author": user(author), "published": true })
}

pub fn request(user_id: u64, author: u64, roles: &[&str]) -> AccessRequest {
    AccessRequest::new(user(user_id), "Article", article(author))
        .with_roles(roles.iter().copied())
}
