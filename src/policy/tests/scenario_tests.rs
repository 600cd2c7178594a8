//! End-to-end access decisions over the blog policy

mod common;

use common::{article, evaluator, request, user};
use ecchi_policy::{
    compile, AccessEvaluator, AccessMode, AccessRequest, ConceptDecl, EvaluatorConfig,
    Expression, Model, PolicyError, Resolution, RoleDecl, SourceId, Statement, SubjectDecl,
    TypeRef,
};
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// ROLE SCENARIOS
// ============================================================================

#[test]
fn test_author_can_edit_but_not_read() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let author = request(1, 1, &["NormalUser"]);

    assert!(evaluator.can(&author, "edit")?, "Author should be able to edit");
    assert!(
        !evaluator.can(&author, "read")?,
        "Allowing edit must not grant the coarser read action"
    );
    assert!(!evaluator.can(&author, "create")?);
    Ok(())
}

#[test]
fn test_non_author_takes_else_branch() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let reader = request(2, 1, &["NormalUser"]);

    let decision = evaluator.decide(&reader, "read")?;
    assert!(decision.allowed);
    assert_eq!(decision.matched.len(), 1);
    assert_eq!(decision.matched[0].rule_index, 1, "Only the else-branch rule should match");
    assert!(evaluator.can(&reader, "create")?);
    Ok(())
}

#[test]
fn test_allowing_read_grants_nested_edit() -> anyhow::Result<()> {
    let evaluator = evaluator();

    // Author branch: allow edit covers edit only
    let author = request(1, 1, &["NormalUser"]);
    assert!(evaluator.can(&author, "edit")?);
    assert!(!evaluator.can(&author, "read")?);

    // Else branch: allow read also covers edit, which extends read
    let reader = request(2, 1, &["NormalUser"]);
    let decision = evaluator.decide(&reader, "edit")?;
    assert!(decision.allowed, "Allowing read must grant the nested edit action");
    assert_eq!(decision.resolution, Resolution::Allowed);
    assert_eq!(decision.matched.len(), 1);
    assert_eq!(decision.matched[0].rule_index, 1);
    assert_eq!(evaluator.allowed_actions(&reader)?, vec!["read", "edit", "create"]);
    Ok(())
}

#[test]
fn test_admin_unconditional() -> anyhow::Result<()> {
    let evaluator = evaluator();
    for (user_id, author) in [(1, 1), (2, 1), (3, 9)] {
        let admin = request(user_id, author, &["Admin"]);
        assert!(evaluator.can(&admin, "read")?, "Admin reads regardless of authorship");
        assert!(evaluator.can(&admin, "edit")?);
        assert!(evaluator.can(&admin, "create")?);
    }
    Ok(())
}

#[test]
fn test_forbid_wins_across_roles() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let author = request(1, 1, &["NormalUser", "EditLocked"]);

    let decision = evaluator.decide(&author, "edit")?;
    assert!(!decision.allowed, "Forbid from another role must win");
    assert_eq!(decision.resolution, Resolution::Forbidden);
    assert!(decision
        .matched
        .iter()
        .any(|m| m.role == "EditLocked" && m.mode == AccessMode::Forbid));
    Ok(())
}

#[test]
fn test_forbid_propagates_to_coarser_actions() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let admin = request(1, 1, &["Admin", "EditLocked"]);

    assert!(!evaluator.can(&admin, "edit")?);
    assert!(!evaluator.can(&admin, "read")?, "Forbidding edit also forbids read");
    assert!(evaluator.can(&admin, "create")?);
    assert_eq!(evaluator.forbidden_actions(&admin)?, vec!["read", "edit"]);
    assert_eq!(evaluator.allowed_actions(&admin)?, vec!["create"]);
    Ok(())
}

#[test]
fn test_role_order_does_not_matter() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let a = request(1, 1, &["EditLocked", "NormalUser"]);
    let b = request(1, 1, &["NormalUser", "EditLocked"]);
    assert_eq!(evaluator.can(&a, "edit")?, evaluator.can(&b, "edit")?);
    Ok(())
}

#[test]
fn test_no_active_roles_denies() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let decision = evaluator.decide(&request(1, 1, &[]), "read")?;
    assert!(!decision.allowed);
    assert_eq!(decision.resolution, Resolution::NoMatchingRule);
    assert!(decision.matched.is_empty());
    Ok(())
}

#[test]
fn test_environment_condition() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let normal = request(1, 1, &["Admin", "Maintenance"]);
    assert!(evaluator.can(&normal, "read")?);

    let maintenance = request(1, 1, &["Admin", "Maintenance"])
        .with_environment(json!({ "maintenance": true }));
    assert!(!evaluator.can(&maintenance, "read")?);
    assert!(!evaluator.can(&maintenance, "create")?);
    Ok(())
}

// ============================================================================
// TYPE HIERARCHY
// ============================================================================

#[test]
fn test_concept_subtyping() {
    let policy = common::blog_policy();
    assert_eq!(policy.is_sub_type_of("User2Type", "UserType"), Some(true));
    assert_eq!(policy.is_sub_type_of("UserType", "User2Type"), Some(false));
    assert_eq!(policy.is_sub_type_of("UserType", "UserType"), Some(true));
    assert_eq!(policy.is_sub_type_of("ArticleType", "UserType"), Some(false));
    assert_eq!(policy.is_sub_type_of("Missing", "UserType"), None);
}

#[test]
fn test_action_subsumption() {
    let policy = common::blog_policy();
    assert_eq!(policy.is_sub_action_of("Article", "edit", "read"), Some(true));
    assert_eq!(policy.is_sub_action_of("Article", "read", "edit"), Some(false));
    assert_eq!(policy.is_sub_action_of("Article", "create", "read"), Some(false));
}

#[test]
fn test_type_test_uses_runtime_tag() -> anyhow::Result<()> {
    let model = Model::new("UserType")
        .with_concept(ConceptDecl::new("UserType").member("id", TypeRef::Number))
        .with_concept(ConceptDecl::new("User2Type").extends("UserType"))
        .with_concept(ConceptDecl::new("DocType"))
        .with_subject(SubjectDecl::new("Doc", "DocType").action("read"))
        .with_role(RoleDecl::new("Staff").block(
            "Doc",
            vec![Statement::when(
                Expression::user().is("User2Type"),
                vec![Statement::allow(["read"])],
            )],
        ));
    let policy = Arc::new(compile(&model, SourceId::new("staff"))?);
    let evaluator = AccessEvaluator::new(policy, EvaluatorConfig::default())?;

    let staff = AccessRequest::new(json!({ "$type": "User2Type", "id": 1 }), "Doc", json!({}))
        .with_roles(["Staff"]);
    let guest = AccessRequest::new(json!({ "$type": "UserType", "id": 2 }), "Doc", json!({}))
        .with_roles(["Staff"]);
    let untagged = AccessRequest::new(json!({ "id": 3 }), "Doc", json!({})).with_roles(["Staff"]);

    assert!(evaluator.can(&staff, "read")?);
    assert!(!evaluator.can(&guest, "read")?);
    assert!(!evaluator.can(&untagged, "read")?);
    Ok(())
}

// ============================================================================
// MISSING DATA
// ============================================================================

#[test]
fn test_missing_subject_data_reads_as_null() -> anyhow::Result<()> {
    let evaluator = evaluator();
    let orphan = AccessRequest::new(user(1), "Article", json!({ "published": true }))
        .with_roles(["NormalUser"]);

    // `null == 1` is false, so the else branch applies
    let decision = evaluator.decide(&orphan, "read")?;
    assert!(decision.allowed);
    assert_eq!(decision.matched[0].rule_index, 1);
    assert!(evaluator.can(&orphan, "create")?);
    Ok(())
}

#[test]
fn test_membership_condition() -> anyhow::Result<()> {
    let model = common::blog_model().with_role(RoleDecl::new("Editors").block(
        "Article",
        vec![Statement::when(
            Expression::binary(
                ecchi_policy::BinaryOp::In,
                Expression::string("editors"),
                Expression::user().get("groups"),
            ),
            vec![Statement::allow(["edit"])],
        )],
    ));
    let policy = Arc::new(compile(&model, SourceId::new("editors"))?);
    let evaluator = AccessEvaluator::new(policy, EvaluatorConfig::default())?;

    let editor = AccessRequest::new(
        json!({ "id": 5, "name": "e", "groups": ["editors"] }),
        "Article",
        article(1),
    )
    .with_roles(["Editors"]);
    assert!(evaluator.can(&editor, "edit")?);
    assert!(!evaluator.can(&request(5, 1, &["Editors"]), "edit")?);
    Ok(())
}

// ============================================================================
// USAGE ERRORS
// ============================================================================

#[test]
fn test_unknown_identifiers_are_usage_errors() {
    let evaluator = evaluator();

    let err = evaluator.can(&request(1, 1, &["NormalUser"]), "publish").unwrap_err();
    assert!(matches!(err, PolicyError::Usage(ref msg) if msg.contains("publish")));

    let err = evaluator.can(&request(1, 1, &["Moderator"]), "read").unwrap_err();
    assert!(matches!(err, PolicyError::Usage(ref msg) if msg.contains("Moderator")));

    let comment = AccessRequest::new(user(1), "Comment", json!({})).with_roles(["Admin"]);
    assert!(matches!(
        evaluator.can(&comment, "read"),
        Err(PolicyError::Usage(_))
    ));
}

// ============================================================================
// COMPILATION ERRORS
// ============================================================================

#[test]
fn test_cyclic_concepts_fail() {
    let model = Model::new("A")
        .with_concept(ConceptDecl::new("A").extends("B"))
        .with_concept(ConceptDecl::new("B").extends("A"));
    let err = compile(&model, SourceId::new("cycle")).unwrap_err();
    assert!(matches!(err, PolicyError::Configuration(ref msg) if msg.contains("->")));
}

#[test]
fn test_cyclic_actions_fail() {
    let model = common::blog_model().with_subject(
        SubjectDecl::new("Comment", "ArticleType")
            .action_extends("a", "b")
            .action_extends("b", "a"),
    );
    assert!(matches!(
        compile(&model, SourceId::new("cycle")),
        Err(PolicyError::Configuration(_))
    ));
}

#[test]
fn test_bad_property_fails() {
    let model = common::blog_model().with_role(RoleDecl::new("Broken").block(
        "Article",
        vec![Statement::when(
            Expression::subject().get("author").get("salary"),
            vec![Statement::allow(["read"])],
        )],
    ));
    match compile(&model, SourceId::new("broken")) {
        Err(PolicyError::TypeInference {
            expression, field, ..
        }) => {
            assert_eq!(expression, "subject.author.salary");
            assert_eq!(field, "property");
        }
        other => panic!("expected type inference error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_indexing_non_array_fails() {
    let model = common::blog_model().with_role(RoleDecl::new("Broken").block(
        "Article",
        vec![Statement::when(
            Expression::user().get("name").at(Expression::number(0.0)),
            vec![Statement::allow(["read"])],
        )],
    ));
    assert!(matches!(
        compile(&model, SourceId::new("broken")),
        Err(PolicyError::TypeInference { ref field, .. }) if field == "receiver"
    ));
}

#[test]
fn test_environment_without_declaration_fails() {
    let mut model = common::blog_model();
    model.environment = None;
    assert!(matches!(
        compile(&model, SourceId::new("no-env")),
        Err(PolicyError::TypeInference { .. })
    ));
}

// ============================================================================
// MODEL INPUT
// ============================================================================

#[test]
fn test_compile_from_json() -> anyhow::Result<()> {
    let model: Model = serde_json::from_value(json!({
        "user": "UserType",
        "concepts": [
            { "name": "UserType", "members": [{ "name": "id", "type": { "kind": "number" } }] },
            { "name": "NoteType", "members": [
                { "name": "owner", "type": { "kind": "number" } }
            ]}
        ],
        "subjects": [
            { "name": "Note", "concept": "NoteType", "actions": [
                { "name": "view" },
                { "name": "change", "extends": "view" }
            ]}
        ],
        "roles": [
            { "name": "Owner", "blocks": [
                { "subject": "Note", "statements": [
                    { "kind": "when",
                      "condition": {
                          "kind": "binary", "op": "==",
                          "left": { "kind": "property", "member": "id",
                                    "receiver": { "kind": "root", "root": "user" } },
                          "right": { "kind": "property", "member": "owner",
                                     "receiver": { "kind": "root", "root": "subject" } },
                          "type": { "kind": "boolean" }
                      },
                      "then": [
                          { "kind": "permission", "mode": "allow", "actions": "everything" }
                      ]
                    }
                ]}
            ]}
        ]
    }))?;

    let policy = Arc::new(compile(&model, SourceId::new("notes.json"))?);
    let evaluator = AccessEvaluator::new(policy, EvaluatorConfig::default())?;
    let owner = AccessRequest::new(json!({ "id": 4 }), "Note", json!({ "owner": 4 }))
        .with_roles(["Owner"]);
    assert!(evaluator.can(&owner, "view")?);
    assert!(evaluator.can(&owner, "change")?);

    let stranger = AccessRequest::new(json!({ "id": 5 }), "Note", json!({ "owner": 4 }))
        .with_roles(["Owner"]);
    assert!(!evaluator.can(&stranger, "view")?);
    Ok(())
}
