//! Rule rendering: statement trees to flat [`AccessRule`] lists
//!
//! Every permission statement becomes one rule whose condition is the
//! conjunction of all enclosing `when` conditions, negated on `else`
//! branches. Statements outside any `when` get the pre-seeded `true`.

use serde::{Deserialize, Serialize};

use crate::bitmask::Bitmask;
use crate::closure::SubjectActions;
use crate::error::{PolicyError, Result};
use crate::expr::{ExprIndex, ExpressionScope};
use crate::model::{AccessMode, ActionSelection, Alternative, Statement, UnaryOp, WhenStatement};

/// One compiled `(actions, condition, mode)` triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Bit indices of the targeted actions
    pub actions: Vec<usize>,
    pub condition: ExprIndex,
    pub mode: AccessMode,
    /// OR of the targeted actions' closures for `mode`
    pub mask: Bitmask,
}

/// Renders the statement blocks of one `(role, subject)` pair
pub struct RuleRenderer<'s, 'b, 'c> {
    scope: ExpressionScope<'b, 'c>,
    actions: &'s SubjectActions,
    role: &'s str,
    subject: &'s str,
    rules: Vec<AccessRule>,
}

impl<'s, 'b, 'c> RuleRenderer<'s, 'b, 'c> {
    pub fn new(
        scope: ExpressionScope<'b, 'c>,
        actions: &'s SubjectActions,
        role: &'s str,
        subject: &'s str,
    ) -> Self {
        Self {
            scope,
            actions,
            role,
            subject,
            rules: Vec::new(),
        }
    }

    /// Render `statements` at top level
    pub fn render(&mut self, statements: &[Statement]) -> Result<()> {
        self.render_block(statements, ExprIndex::TRUE)
    }

    pub fn finish(self) -> Vec<AccessRule> {
        self.rules
    }

    fn render_block(&mut self, statements: &[Statement], condition: ExprIndex) -> Result<()> {
        for statement in statements {
            match statement {
                Statement::Permission { mode, actions } => {
                    let bits = self.resolve_actions(actions)?;
                    let mask = self.actions.merged_closure(&bits, *mode);
                    self.rules.push(AccessRule {
                        actions: bits,
                        condition,
                        mode: *mode,
                        mask,
                    });
                }
                Statement::When(when) => self.render_when(when, condition)?,
            }
        }
        Ok(())
    }

    fn render_when(&mut self, when: &WhenStatement, enclosing: ExprIndex) -> Result<()> {
        let condition = self.scope.lower(&when.condition)?;
        let then = self.scope.and(enclosing, condition)?;
        self.render_block(&when.then, then)?;

        if let Some(alternative) = &when.alternative {
            let negated = self.scope.unary(UnaryOp::Not, condition)?;
            let otherwise = self.scope.and(enclosing, negated)?;
            match alternative {
                Alternative::Else(statements) => self.render_block(statements, otherwise)?,
                Alternative::When(next) => self.render_when(next, otherwise)?,
            }
        }
        Ok(())
    }

    fn resolve_actions(&self, selection: &ActionSelection) -> Result<Vec<usize>> {
        match selection {
            ActionSelection::Everything => Ok((0..self.actions.len()).collect()),
            ActionSelection::Actions(names) => names
                .iter()
                .map(|name| {
                    self.actions.bit(name).ok_or_else(|| {
                        PolicyError::Configuration(format!(
                            "Role '{}' references unknown action '{}' on subject '{}'",
                            self.role, name, self.subject
                        ))
                    })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::Concepts;
    use crate::expr::ExpressionBuilder;
    use crate::model::{ConceptDecl, Expression, SubjectDecl, TypeRef};

    fn fixtures() -> (Concepts, SubjectActions) {
        let concepts = Concepts::build(&[
            ConceptDecl::new("UserType").member("id", TypeRef::Number),
            ConceptDecl::new("ArticleType").member("author", TypeRef::concept("UserType")),
        ])
        .unwrap();
        let actions = SubjectActions::build(
            &SubjectDecl::new("Article", "ArticleType")
                .action("read")
                .action_extends("edit", "read")
                .action("create"),
        )
        .unwrap();
        (concepts, actions)
    }

    fn is_author() -> Expression {
        Expression::user()
            .get("id")
            .equals(Expression::subject().get("author").get("id"))
    }

    #[test]
    fn test_unconditional_rule_uses_true() {
        let (concepts, actions) = fixtures();
        let mut builder = ExpressionBuilder::new(&concepts, "UserType", None);
        let subject = builder.add_subject("ArticleType");
        let mut renderer = RuleRenderer::new(builder.scope(subject), &actions, "Admin", "Article");
        renderer
            .render(&[Statement::allow(["read", "edit", "create"])])
            .unwrap();
        let rules = renderer.finish();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition, ExprIndex::TRUE);
        assert_eq!(rules[0].actions, vec![0, 1, 2]);
        assert_eq!(rules[0].mask.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_when_else_negates_condition() {
        let (concepts, actions) = fixtures();
        let mut builder = ExpressionBuilder::new(&concepts, "UserType", None);
        let subject = builder.add_subject("ArticleType");
        let mut renderer = RuleRenderer::new(builder.scope(subject), &actions, "NormalUser", "Article");
        renderer
            .render(&[Statement::when_else(
                is_author(),
                vec![Statement::allow(["edit"])],
                vec![Statement::allow(["read", "create"])],
            )])
            .unwrap();
        let rules = renderer.finish();

        assert_eq!(rules.len(), 2);
        assert!(rules[0].condition.is_subject_dependent());
        assert!(rules[1].condition.is_subject_dependent());
        assert_ne!(rules[0].condition, rules[1].condition);

        let scope = builder.scope(subject);
        assert_eq!(scope.render(rules[0].condition), "(user.id == subject.author.id)");
        assert_eq!(scope.render(rules[1].condition), "!(user.id == subject.author.id)");
    }

    #[test]
    fn test_nested_conditions_are_conjoined() {
        let (concepts, actions) = fixtures();
        let mut builder = ExpressionBuilder::new(&concepts, "UserType", None);
        let subject = builder.add_subject("ArticleType");
        let admin = Expression::user().get("id").equals(Expression::number(1.0));
        let mut renderer = RuleRenderer::new(builder.scope(subject), &actions, "R", "Article");
        renderer
            .render(&[Statement::when(
                admin,
                vec![Statement::when(is_author(), vec![Statement::forbid(["edit"])])],
            )])
            .unwrap();
        let rules = renderer.finish();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].mode, AccessMode::Forbid);
        assert_eq!(rules[0].mask.indices().collect::<Vec<_>>(), vec![0, 1]);
        let scope = builder.scope(subject);
        assert_eq!(
            scope.render(rules[0].condition),
            "((user.id == 1) && (user.id == subject.author.id))"
        );
    }

    #[test]
    fn test_else_when_chain() {
        let (concepts, actions) = fixtures();
        let mut builder = ExpressionBuilder::new(&concepts, "UserType", None);
        let subject = builder.add_subject("ArticleType");
        let first = Expression::user().get("id").equals(Expression::number(1.0));
        let chain = WhenStatement {
            condition: first,
            then: vec![Statement::allow(["create"])],
            alternative: None,
        }
        .else_when(WhenStatement {
            condition: is_author(),
            then: vec![Statement::allow(["edit"])],
            alternative: Some(Alternative::Else(vec![Statement::allow(["read"])])),
        });
        let mut renderer = RuleRenderer::new(builder.scope(subject), &actions, "R", "Article");
        renderer.render(&[Statement::When(chain)]).unwrap();
        let rules = renderer.finish();

        assert_eq!(rules.len(), 3);
        let scope = builder.scope(subject);
        assert_eq!(scope.render(rules[0].condition), "(user.id == 1)");
        assert_eq!(
            scope.render(rules[1].condition),
            "(!(user.id == 1) && (user.id == subject.author.id))"
        );
        assert_eq!(
            scope.render(rules[2].condition),
            "(!(user.id == 1) && !(user.id == subject.author.id))"
        );
    }

    #[test]
    fn test_everything_selects_all_actions() {
        let (concepts, actions) = fixtures();
        let mut builder = ExpressionBuilder::new(&concepts, "UserType", None);
        let subject = builder.add_subject("ArticleType");
        let mut renderer = RuleRenderer::new(builder.scope(subject), &actions, "R", "Article");
        renderer.render(&[Statement::forbid_everything()]).unwrap();
        assert_eq!(renderer.finish()[0].actions, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_action_is_configuration_error() {
        let (concepts, actions) = fixtures();
        let mut builder = ExpressionBuilder::new(&concepts, "UserType", None);
        let subject = builder.add_subject("ArticleType");
        let mut renderer = RuleRenderer::new(builder.scope(subject), &actions, "R", "Article");
        let result = renderer.render(&[Statement::allow(["publish"])]);
        assert!(matches!(result, Err(PolicyError::Configuration(msg)) if msg.contains("publish")));
    }
}
