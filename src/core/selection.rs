use super::credential::{CredentialCodec, SignedCredential};
use super::presentation_definition::{DefinitionError, PresentationDefinition};

use thiserror::Error;

/// Errors that arise while selecting credentials for a definition.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("presentation definition is malformed: {0}")]
    InvalidDefinition(#[from] DefinitionError),
    /// Selection is all-or-nothing: if any input descriptor has no matching
    /// credential, nothing is selected and every uncovered descriptor is
    /// reported.
    #[error("no credential in the pool satisfies input descriptor(s): {}", unsatisfied.join(", "))]
    UnsatisfiableDefinition { unsatisfied: Vec<String> },
    #[error("failed to parse a credential from the candidate pool")]
    Codec(#[source] anyhow::Error),
}

/// Ties an input descriptor to the selected credential that covers it, by
/// index into [Selection::selected].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorCoverage {
    descriptor_id: String,
    credential_index: usize,
}

impl DescriptorCoverage {
    pub fn descriptor_id(&self) -> &str {
        &self.descriptor_id
    }

    pub fn credential_index(&self) -> usize {
        self.credential_index
    }
}

/// The credentials chosen to fulfill a definition, with one coverage entry
/// per input descriptor in the definition's declared order.
///
/// `selected` is deduplicated: a credential that covers several descriptors
/// appears once and is referenced by several coverage entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    selected: Vec<SignedCredential>,
    coverage: Vec<DescriptorCoverage>,
}

impl Selection {
    pub fn selected(&self) -> &[SignedCredential] {
        &self.selected
    }

    pub fn coverage(&self) -> &[DescriptorCoverage] {
        &self.coverage
    }

    pub fn into_selected(self) -> Vec<SignedCredential> {
        self.selected
    }
}

/// Choose credentials from `pool` to cover every input descriptor of
/// `definition`.
///
/// For each descriptor in declared order, the pool is scanned in slice order
/// and the first satisfying credential is taken, which keeps the outcome
/// deterministic for a given pool ordering and discloses exactly one
/// credential per descriptor. Pool tokens the codec cannot parse abort the
/// selection.
pub fn select_credentials(
    pool: &[SignedCredential],
    definition: &PresentationDefinition,
    codec: &impl CredentialCodec,
) -> Result<Selection, SelectionError> {
    definition.validate()?;

    // Parse the pool up front so every descriptor scans the same envelopes.
    let envelopes = pool
        .iter()
        .map(|token| codec.parse(token).map(|c| c.claims_envelope()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(SelectionError::Codec)?;

    let mut selected: Vec<SignedCredential> = Vec::new();
    let mut selected_pool_indices: Vec<usize> = Vec::new();
    let mut coverage = Vec::new();
    let mut unsatisfied = Vec::new();

    for descriptor in definition.input_descriptors() {
        let Some(pool_index) = envelopes
            .iter()
            .position(|envelope| descriptor.matches(envelope))
        else {
            unsatisfied.push(descriptor.id().to_string());
            continue;
        };

        let credential_index = match selected_pool_indices
            .iter()
            .position(|&taken| taken == pool_index)
        {
            Some(existing) => existing,
            None => {
                selected_pool_indices.push(pool_index);
                selected.push(pool[pool_index].clone());
                selected.len() - 1
            }
        };

        coverage.push(DescriptorCoverage {
            descriptor_id: descriptor.id().to_string(),
            credential_index,
        });
    }

    if !unsatisfied.is_empty() {
        return Err(SelectionError::UnsatisfiableDefinition { unsatisfied });
    }

    tracing::debug!(
        definition = %definition.id(),
        descriptors = coverage.len(),
        selected = selected.len(),
        "selected credentials for presentation definition"
    );

    Ok(Selection { selected, coverage })
}
