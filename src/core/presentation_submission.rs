use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use super::credential::SignedCredential;
use super::presentation_definition::PresentationDefinition;
use super::selection::Selection;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use serde_json_path::JsonPath;

/// A DescriptorMapId is a unique identifier for a DescriptorMap, matching
/// the id of an input descriptor in the originating definition.
pub type DescriptorMapId = String;

const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VP: &str = "jwt_vp";

/// The claim format of a submitted credential.
///
/// Registry of claim format types: [https://identity.foundation/claim-format-registry/#registry](https://identity.foundation/claim-format-registry/#registry)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimFormat {
    /// A JWT-encoded verifiable credential, with a payload defined according
    /// to the JWT section of the W3C VC Data Model specification.
    JwtVc,
    /// A JWT-encoded verifiable presentation.
    JwtVp,
    /// Other claim format designations not covered by the above.
    Other(String),
}

impl ClaimFormat {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VP => Self::JwtVp,
            _ => Self::Other(name.into_owned()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVp => FORMAT_JWT_VP,
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for ClaimFormat {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormat {
    fn from(s: String) -> Self {
        Self::from_name(Cow::Owned(s))
    }
}

impl FromStr for ClaimFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<ClaimFormat> for String {
    fn from(format: ClaimFormat) -> Self {
        format.name().to_string()
    }
}

impl fmt::Display for ClaimFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}

/// How much a submission diagnostic matters.
///
/// Only `error` diagnostics make a submission structurally invalid;
/// `warning` flags disclosure hygiene issues and `info` is advisory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
            Self::Info => f.write_str("info"),
        }
    }
}

/// A single finding from submission validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    severity: Severity,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    descriptor_id: Option<DescriptorMapId>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            descriptor_id: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            descriptor_id: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            descriptor_id: None,
        }
    }

    /// Attach the input descriptor this finding is about.
    pub fn for_descriptor(mut self, id: impl Into<DescriptorMapId>) -> Self {
        self.descriptor_id = Some(id.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn descriptor_id(&self) -> Option<&String> {
        self.descriptor_id.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Whether any diagnostic blocks acceptance of the submission.
pub fn contains_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Descriptor maps tie each input descriptor to the presented credential
/// fulfilling it.
///
/// `path` is a JSONPath expression executed against the top-level of the
/// object the [PresentationSubmission] is embedded within, and resolves to
/// the submitted claim.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: ClaimFormat,
    pub path: JsonPath,
}

impl DescriptorMap {
    pub fn new(id: impl Into<DescriptorMapId>, format: ClaimFormat, path: JsonPath) -> Self {
        Self {
            id: id.into(),
            format,
            path,
        }
    }

    /// An entry pointing at slot `index` of a presentation's credential
    /// list.
    pub fn for_credential_index(id: impl Into<DescriptorMapId>, index: usize) -> Self {
        let path = JsonPath::parse(&format!("$.verifiableCredential[{index}]"))
            // A fixed template with a numeric index always parses.
            .expect("credential slot template is a valid JSONPath");
        Self::new(id, ClaimFormat::JwtVc, path)
    }
}

/// Presentation submissions express how the credentials presented to a
/// verifier fulfill the requirements specified in a
/// [PresentationDefinition].
///
/// Embedded presentation submission objects MUST be located within the
/// target data format as the value of a `presentation_submission` property.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: uuid::Uuid,
    definition_id: String,
    descriptor_map: Vec<DescriptorMap>,
}

impl PresentationSubmission {
    /// The presentation submission MUST contain an id (a UUID), the id of
    /// the definition it fulfills, and a descriptor map.
    pub fn new(id: uuid::Uuid, definition_id: String, descriptor_map: Vec<DescriptorMap>) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    /// Build the submission for a selection made against `definition`.
    ///
    /// Entries follow the definition's declared descriptor order, carry the
    /// `jwt_vc` format, and point into the selection's deduplicated
    /// credential list by index. The submission id is freshly generated.
    pub fn from_selection(definition: &PresentationDefinition, selection: &Selection) -> Self {
        let descriptor_map = selection
            .coverage()
            .iter()
            .map(|coverage| {
                DescriptorMap::for_credential_index(
                    coverage.descriptor_id(),
                    coverage.credential_index(),
                )
            })
            .collect();

        Self {
            id: uuid::Uuid::new_v4(),
            definition_id: definition.id().clone(),
            descriptor_map,
        }
    }

    pub fn id(&self) -> &uuid::Uuid {
        &self.id
    }

    pub fn definition_id(&self) -> &String {
        &self.definition_id
    }

    pub fn descriptor_map(&self) -> &Vec<DescriptorMap> {
        &self.descriptor_map
    }

    /// Check the submission's structure against the definition it claims to
    /// fulfill and the number of credentials actually presented.
    ///
    /// The submission is structurally valid iff no `error`-severity
    /// diagnostic is returned. Warnings flag disclosure hygiene issues
    /// (over-broad paths, credentials nothing references); a clean pass
    /// yields a single `info` notice. A malformed definition short-circuits,
    /// since descriptor ids are not reliable keys in that case.
    pub fn validate(
        &self,
        definition: &PresentationDefinition,
        credential_count: usize,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if let Err(err) = definition.validate() {
            diagnostics.push(Diagnostic::error(format!(
                "presentation definition is malformed: {err}"
            )));
            return diagnostics;
        }

        if &self.definition_id != definition.id() {
            diagnostics.push(Diagnostic::error(format!(
                "submission targets definition `{}` but was validated against `{}`",
                self.definition_id,
                definition.id()
            )));
        }

        let mut entry_counts: HashMap<&str, usize> = HashMap::new();
        for entry in &self.descriptor_map {
            *entry_counts.entry(entry.id.as_str()).or_default() += 1;
        }

        for descriptor in definition.input_descriptors() {
            match entry_counts.get(descriptor.id()).copied().unwrap_or(0) {
                0 => diagnostics.push(
                    Diagnostic::error(format!(
                        "input descriptor `{}` has no descriptor map entry",
                        descriptor.id()
                    ))
                    .for_descriptor(descriptor.id()),
                ),
                1 => {}
                n => diagnostics.push(
                    Diagnostic::error(format!(
                        "input descriptor `{}` has {n} descriptor map entries",
                        descriptor.id()
                    ))
                    .for_descriptor(descriptor.id()),
                ),
            }
        }

        let known: HashSet<&str> = definition
            .input_descriptors()
            .iter()
            .map(|descriptor| descriptor.id())
            .collect();
        for entry in &self.descriptor_map {
            if !known.contains(entry.id.as_str()) {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "descriptor map entry `{}` does not match any input descriptor",
                        entry.id
                    ))
                    .for_descriptor(entry.id.as_str()),
                );
            }
        }

        // Resolve each entry's path against a document with one numbered
        // slot per presented credential.
        let slots = json!({
            "verifiableCredential": (0..credential_count).collect::<Vec<usize>>()
        });
        let mut referenced: HashSet<usize> = HashSet::new();
        for entry in &self.descriptor_map {
            let resolved = entry.path.query(&slots).all();
            for slot in &resolved {
                if let Some(index) = slot.as_u64() {
                    referenced.insert(index as usize);
                }
            }
            match resolved.len() {
                0 => diagnostics.push(
                    Diagnostic::error(format!(
                        "descriptor map entry `{}` does not resolve to a presented credential",
                        entry.id
                    ))
                    .for_descriptor(entry.id.as_str()),
                ),
                // The slot document holds no numbers besides the indices,
                // so a lone non-index node is the slot array itself or the
                // enclosing document.
                1 if resolved[0].as_u64().is_none() => diagnostics.push(
                    Diagnostic::error(format!(
                        "descriptor map entry `{}` does not resolve to a single credential slot",
                        entry.id
                    ))
                    .for_descriptor(entry.id.as_str()),
                ),
                1 => {}
                n => diagnostics.push(
                    Diagnostic::warning(format!(
                        "descriptor map entry `{}` resolves to {n} credentials, expected exactly one",
                        entry.id
                    ))
                    .for_descriptor(entry.id.as_str()),
                ),
            }
        }

        for index in 0..credential_count {
            if !referenced.contains(&index) {
                diagnostics.push(Diagnostic::warning(format!(
                    "credential at index {index} is not referenced by any descriptor map entry"
                )));
            }
        }

        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::info(
                "presentation submission conforms to the definition",
            ));
        }

        tracing::debug!(
            submission = %self.id,
            errors = diagnostics.iter().filter(|d| d.is_error()).count(),
            total = diagnostics.len(),
            "validated presentation submission"
        );

        diagnostics
    }
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = anyhow::Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(raw).map_err(Into::into)
    }
}

impl From<PresentationSubmission> for Json {
    fn from(value: PresentationSubmission) -> Self {
        serde_json::to_value(value)
            // SAFETY: by definition, a presentation submission has a valid
            //         JSON representation.
            .unwrap()
    }
}

/// The outer document a holder hands to a verifier: the submission plus the
/// credentials it references, index-addressed as `verifiableCredential[n]`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Presentation {
    presentation_submission: PresentationSubmission,
    #[serde(rename = "verifiableCredential")]
    verifiable_credential: Vec<SignedCredential>,
}

impl Presentation {
    pub fn new(
        presentation_submission: PresentationSubmission,
        verifiable_credential: Vec<SignedCredential>,
    ) -> Self {
        Self {
            presentation_submission,
            verifiable_credential,
        }
    }

    pub fn presentation_submission(&self) -> &PresentationSubmission {
        &self.presentation_submission
    }

    pub fn verifiable_credential(&self) -> &[SignedCredential] {
        &self.verifiable_credential
    }

    /// Validate the embedded submission against `definition`.
    pub fn validate(&self, definition: &PresentationDefinition) -> Vec<Diagnostic> {
        self.presentation_submission
            .validate(definition, self.verifiable_credential.len())
    }
}
