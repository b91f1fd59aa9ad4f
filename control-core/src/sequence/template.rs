//! Sequence templates: a [`SequenceDefinition`] skeleton with typed
//! parameters and `${name}` placeholders, instantiated into a concrete,
//! registered sequence.
//!
//! Grounded on the donor's `SequenceTemplate.h`, adapted from its
//! free-floating `parameterSubstitutions` map to substitution performed
//! directly over the skeleton's own step/action-id text, which is what
//! SPEC_FULL §4.D's "typed parameters and `${name}` placeholders in
//! action_ids and parameter values" actually describes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SequenceError;
use crate::sequence::dto::{BranchDescriptor, ConditionalBranch, ParallelBranch, SequenceDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    Int,
    Float,
    Bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    pub param_type: ParameterType,
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A [`SequenceDefinition`] skeleton whose step action ids and
/// parameter values may contain `${name}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceTemplate {
    pub id: String,
    pub name: String,
    pub version: String,
    pub parameters: Vec<TemplateParameter>,
    pub skeleton: SequenceDefinition,
}

impl SequenceTemplate {
    /// Validate every required parameter is present (or has a default),
    /// then substitute `${name}` in every step's `action_id` and
    /// parameter values, and in every branch descriptor's action-id
    /// lists and condition text. Returns the concrete definition with a
    /// fresh, unique `id`.
    pub fn instantiate(
        &self,
        instance_id: impl Into<String>,
        values: &HashMap<String, String>,
    ) -> Result<SequenceDefinition, SequenceError> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        for param in &self.parameters {
            match values.get(&param.name) {
                Some(v) => {
                    resolved.insert(param.name.clone(), v.clone());
                }
                None => match &param.default_value {
                    Some(default) => {
                        resolved.insert(param.name.clone(), default.clone());
                    }
                    None if param.required => {
                        return Err(SequenceError::MissingParameter(param.name.clone()))
                    }
                    None => {}
                },
            }
        }

        let mut def = self.skeleton.clone();
        def.id = instance_id.into();

        for step in &mut def.steps {
            step.action_id = substitute(&step.action_id, &resolved);
            for value in step.parameters.values_mut() {
                *value = substitute(value, &resolved);
            }
        }

        let mut branches = HashMap::with_capacity(def.branches.len());
        for (key, branch) in def.branches.drain() {
            let new_key = substitute(&key, &resolved);
            let new_branch = match branch {
                BranchDescriptor::Conditional(c) => BranchDescriptor::Conditional(ConditionalBranch {
                    condition: substitute(&c.condition, &resolved),
                    true_actions: c.true_actions.iter().map(|a| substitute(a, &resolved)).collect(),
                    false_actions: c.false_actions.iter().map(|a| substitute(a, &resolved)).collect(),
                }),
                BranchDescriptor::Parallel(p) => BranchDescriptor::Parallel(ParallelBranch {
                    branches: p
                        .branches
                        .iter()
                        .map(|group| group.iter().map(|a| substitute(a, &resolved)).collect())
                        .collect(),
                }),
            };
            branches.insert(new_key, new_branch);
        }
        def.branches = branches;

        Ok(def)
    }
}

fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = text[i + 2..].find('}') {
                let name = &text[i + 2..i + 2 + end];
                if let Some(value) = values.get(name) {
                    out.push_str(value);
                } else {
                    out.push_str(&text[i..i + 2 + end + 1]);
                }
                i = i + 2 + end + 1;
                continue;
            }
        }
        let ch = text[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}
