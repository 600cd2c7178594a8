//! Model to [`CompiledPolicy`] compilation
//!
//! Concept hierarchy first, then each subject's action tree and closures,
//! then all roles rendered through one shared expression builder.

use blake3::Hasher;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::closure::SubjectActions;
use crate::concepts::Concepts;
use crate::error::{PolicyError, Result};
use crate::eval::Module;
use crate::expr::{ExprIndex, ExpressionBuilder, ExpressionTables, OpcodeElement, Slot};
use crate::model::Model;
use crate::policy::{CompiledPolicy, CompiledSubject, Role, SourceId};
use crate::rules::RuleRenderer;

/// Compile a resolved model
///
/// # Errors
///
/// - [`PolicyError::Configuration`] for hierarchy cycles, duplicate names and
///   dangling concept/subject/action references
/// - [`PolicyError::TypeInference`] for conditions that do not type-check
pub fn compile(model: &Model, source_id: SourceId) -> Result<CompiledPolicy> {
    debug!("Compiling policy {}", source_id);

    let concepts = Concepts::build(&model.concepts)?;
    require_concept(&concepts, &model.user, "user")?;
    if let Some(environment) = &model.environment {
        require_concept(&concepts, environment, "environment")?;
    }

    let mut subject_index = HashMap::new();
    let mut subject_actions = Vec::with_capacity(model.subjects.len());
    for (id, subject) in model.subjects.iter().enumerate() {
        if subject_index.insert(subject.name.clone(), id).is_some() {
            return Err(PolicyError::Configuration(format!(
                "Duplicate subject '{}'",
                subject.name
            )));
        }
        require_concept(&concepts, &subject.concept, &subject.name)?;
        subject_actions.push(SubjectActions::build(subject)?);
    }

    let mut builder = ExpressionBuilder::new(&concepts, model.user.clone(), model.environment.clone());
    for subject in &model.subjects {
        builder.add_subject(subject.concept.clone());
    }

    let mut roles: HashMap<String, Role> = HashMap::new();
    for decl in &model.roles {
        if roles.contains_key(&decl.name) {
            return Err(PolicyError::Configuration(format!(
                "Duplicate role '{}'",
                decl.name
            )));
        }
        let mut role = Role::new(decl.name.clone());
        for block in &decl.blocks {
            let id = *subject_index.get(&block.subject).ok_or_else(|| {
                PolicyError::Configuration(format!(
                    "Role '{}' references unknown subject '{}'",
                    decl.name, block.subject
                ))
            })?;
            let mut renderer = RuleRenderer::new(
                builder.scope(id),
                &subject_actions[id],
                &decl.name,
                &block.subject,
            );
            renderer.render(&block.statements)?;
            role.extend_rules(&block.subject, renderer.finish());
        }
        roles.insert(decl.name.clone(), role);
    }

    let tables = builder.finish();
    verify_tables(&tables)?;

    let schema_version = schema_version(model, &source_id)?;
    let concepts = Arc::new(concepts);
    let common_module = Module::compile(&tables.common, &concepts);
    let subjects: Vec<CompiledSubject> = model
        .subjects
        .iter()
        .zip(subject_actions)
        .zip(tables.subjects)
        .map(|((decl, actions), expressions)| CompiledSubject {
            name: decl.name.clone(),
            concept: decl.concept.clone(),
            actions,
            module: Module::compile(&expressions, &concepts),
            expressions,
        })
        .collect();

    info!(
        "Compiled policy {}: {} concepts, {} subjects, {} roles, {} common expressions, {} subject expressions",
        source_id,
        concepts.len(),
        subjects.len(),
        roles.len(),
        tables.common.len(),
        subjects.iter().map(|s| s.expressions.len()).sum::<usize>()
    );

    Ok(CompiledPolicy {
        source_id,
        schema_version,
        user: model.user.clone(),
        environment: model.environment.clone(),
        concepts,
        common: tables.common,
        common_module,
        subjects,
        subject_index,
        roles,
    })
}

fn require_concept(concepts: &Concepts, name: &str, owner: &str) -> Result<()> {
    if concepts.contains(name) {
        Ok(())
    } else {
        Err(PolicyError::Configuration(format!(
            "'{}' references unknown concept '{}'",
            owner, name
        )))
    }
}

fn schema_version(model: &Model, source_id: &SourceId) -> Result<String> {
    let serialized = serde_json::to_vec(model)
        .map_err(|e| PolicyError::Configuration(format!("Failed to serialize model: {}", e)))?;
    let mut hasher = Hasher::new();
    hasher.update(source_id.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(&serialized);
    Ok(hasher.finalize().to_hex().to_string())
}

/// Every element sits at its own index and only references earlier slots of
/// its own table or, from a subject table, existing common slots
pub fn verify_tables(tables: &ExpressionTables) -> Result<()> {
    verify_table(&tables.common, tables.common.len(), false)?;
    for table in &tables.subjects {
        verify_table(table, tables.common.len(), true)?;
    }
    Ok(())
}

fn verify_table(table: &[OpcodeElement], common_len: usize, subject: bool) -> Result<()> {
    for (position, element) in table.iter().enumerate() {
        let expected = if subject {
            ExprIndex::subject(position)
        } else {
            ExprIndex::common(position)
        };
        if element.index != expected {
            return Err(PolicyError::Configuration(format!(
                "Expression {} stored at slot {} of the {} table",
                element.index,
                position,
                if subject { "subject" } else { "common" }
            )));
        }

        for operand in element.opcode.operands() {
            let valid = match operand.slot() {
                Slot::Common(slot) if subject => slot < common_len,
                Slot::Common(slot) => slot < position,
                Slot::Subject(slot) => subject && slot < position,
            };
            if !valid {
                return Err(PolicyError::Configuration(format!(
                    "Expression {} references {} out of order",
                    element.index, operand
                )));
            }
        }
    }
    Ok(())
}
