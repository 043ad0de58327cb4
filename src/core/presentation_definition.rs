use super::input_descriptor::InputDescriptor;
use crate::utils::NonEmptyVec;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors that arise from a malformed presentation definition.
#[derive(thiserror::Error, Debug)]
pub enum DefinitionError {
    /// Input descriptor ids must be unique within a definition.
    #[error("duplicate input descriptor id: {0}")]
    DuplicateInputDescriptorId(String),
}

/// A presentation definition describes the information a verifier requires
/// of a holder.
///
/// > Presentation Definitions are objects that articulate what proofs a
/// > Verifier requires. These help the Verifier to decide how or whether to
/// > interact with a Holder.
///
/// A definition carries at least one input descriptor; every descriptor must
/// be covered for the definition to be fulfilled.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: NonEmptyVec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
}

impl PresentationDefinition {
    /// The presentation definition MUST contain an id and at least one input
    /// descriptor.
    pub fn new(id: impl Into<String>, input_descriptor: InputDescriptor) -> Self {
        Self {
            id: id.into(),
            input_descriptors: NonEmptyVec::new(input_descriptor),
            name: None,
            purpose: None,
        }
    }

    pub fn id(&self) -> &String {
        &self.id
    }

    /// Add another input descriptor to the presentation definition.
    pub fn add_input_descriptor(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    pub fn input_descriptors(&self) -> &[InputDescriptor] {
        &self.input_descriptors
    }

    /// Set the name of the presentation definition.
    ///
    /// If present, its value SHOULD be a human-friendly string intended to
    /// constitute a distinctive designation of the presentation definition.
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the purpose of the presentation definition.
    ///
    /// If present, its value MUST be a string that describes the purpose for
    /// which the presentation definition's inputs are being used for.
    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Check the definition's own invariants.
    ///
    /// Deserialization alone cannot enforce id uniqueness, so selection and
    /// submission validation call this before trusting descriptor ids as
    /// keys.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen = HashSet::new();
        for descriptor in self.input_descriptors.iter() {
            if !seen.insert(descriptor.id()) {
                return Err(DefinitionError::DuplicateInputDescriptorId(
                    descriptor.id().to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Evaluate every input descriptor against a single credential's claims
    /// envelope.
    ///
    /// A credential satisfies the definition when at least one descriptor
    /// matches it; covering all descriptors across a credential pool is the
    /// selector's concern.
    pub fn match_credential(&self, envelope: &Value) -> DefinitionMatch {
        let per_descriptor: HashMap<String, bool> = self
            .input_descriptors
            .iter()
            .map(|descriptor| {
                let matched = descriptor.matches(envelope);
                (descriptor.id().to_string(), matched)
            })
            .collect();
        let satisfied = per_descriptor.values().any(|matched| *matched);

        tracing::debug!(definition = %self.id, satisfied, "evaluated credential against definition");

        DefinitionMatch {
            satisfied,
            per_descriptor,
        }
    }
}

/// The outcome of matching one credential against a whole definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionMatch {
    satisfied: bool,
    per_descriptor: HashMap<String, bool>,
}

impl DefinitionMatch {
    /// Whether at least one input descriptor matched.
    pub fn satisfied(&self) -> bool {
        self.satisfied
    }

    /// Per-descriptor outcomes, keyed by input descriptor id.
    pub fn per_descriptor(&self) -> &HashMap<String, bool> {
        &self.per_descriptor
    }

    pub fn matched_descriptor_ids(&self) -> Vec<&str> {
        self.per_descriptor
            .iter()
            .filter(|(_, matched)| **matched)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}
