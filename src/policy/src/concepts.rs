//! Concept (data type) schema: nested-set subtyping plus member lookup

use std::collections::HashMap;
use tracing::debug;

use crate::error::{PolicyError, Result};
use crate::hierarchy::{HierarchyNode, NestedSet};
use crate::model::{ConceptDecl, TypeRef};

/// Encoded concept hierarchy with member declarations
#[derive(Debug, Clone)]
pub struct Concepts {
    hierarchy: NestedSet<String>,
    decls: HashMap<String, ConceptDecl>,
}

impl Concepts {
    /// Encode the concept forest and validate member type references
    ///
    /// # Errors
    ///
    /// Returns a configuration error on inheritance cycles, duplicate concept
    /// names, unknown parents, or member types naming unknown concepts.
    pub fn build(decls: &[ConceptDecl]) -> Result<Self> {
        let nodes: Vec<HierarchyNode<String>> = decls
            .iter()
            .map(|decl| HierarchyNode::new(decl.name.clone(), decl.parent.clone()))
            .collect();
        let hierarchy = NestedSet::encode(&nodes)?;

        let decls: HashMap<String, ConceptDecl> = decls
            .iter()
            .map(|decl| (decl.name.clone(), decl.clone()))
            .collect();

        let concepts = Self { hierarchy, decls };
        for decl in concepts.decls.values() {
            for member in &decl.members {
                concepts.validate_type(&member.ty).map_err(|unknown| {
                    PolicyError::Configuration(format!(
                        "Member '{}.{}' references unknown concept '{}'",
                        decl.name, member.name, unknown
                    ))
                })?;
            }
        }

        debug!("Encoded {} concepts", concepts.hierarchy.len());
        Ok(concepts)
    }

    /// Returns the first unknown concept name referenced by `ty`
    fn validate_type(&self, ty: &TypeRef) -> std::result::Result<(), String> {
        match ty {
            TypeRef::Boolean | TypeRef::Number | TypeRef::String | TypeRef::Null => Ok(()),
            TypeRef::Array { element } => self.validate_type(element),
            TypeRef::Concept { name } => {
                if self.contains(name) {
                    Ok(())
                } else {
                    Err(name.clone())
                }
            }
            TypeRef::Object { members } => members
                .iter()
                .try_for_each(|member| self.validate_type(&member.ty)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    /// Type of `member` on `concept`, searching inherited members too
    pub fn member(&self, concept: &str, member: &str) -> Option<&TypeRef> {
        let mut current = self.decls.get(concept);
        while let Some(decl) = current {
            if let Some(found) = decl.members.iter().find(|m| m.name == member) {
                return Some(&found.ty);
            }
            current = decl.parent.as_deref().and_then(|parent| self.decls.get(parent));
        }
        None
    }

    /// `Some(true)` if `sub` is `sup` or inherits from it
    pub fn is_sub_type_of(&self, sub: &str, sup: &str) -> Option<bool> {
        self.hierarchy.is_sub_of(sub, sup)
    }

    pub fn hierarchy(&self) -> &NestedSet<String> {
        &self.hierarchy
    }

    pub fn len(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hierarchy.is_empty()
    }
}
