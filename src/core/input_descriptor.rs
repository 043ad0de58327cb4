use std::borrow::Cow;

use crate::core::claim_path;
use crate::utils::NonEmptyVec;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A claim path selector: a JSONPath expression addressed against a
/// credential's claims envelope.
///
/// For syntax details, see [https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition)
pub type ClaimPath = String;

/// The runtime JSON type a filter requires of a resolved claim value.
///
/// String values MUST be one of the six primitive types
/// ("null" excluded here, "boolean", "object", "array", "number", or
/// "string"), or "integer" which matches any number with a zero fractional
/// part.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    /// Whether `value` carries this runtime type.
    pub fn is_type_of(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Integer => {
                value.as_i64().is_some()
                    || value.as_u64().is_some()
                    || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }
}

/// The value filter of a constraint field: a required runtime type and an
/// optional pattern.
///
/// The pattern is a regular expression and is **not** implicitly anchored,
/// matching JSON Schema `pattern` semantics: `silo0_UR` admits
/// `silo0_UR001`.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Filter {
    #[serde(rename = "type")]
    value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
}

impl Filter {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            pattern: None,
        }
    }

    /// Set the pattern of the filter.
    ///
    /// A value admitted by the filter must have a string representation the
    /// pattern matches somewhere; anchor with `^`/`$` for exact matches.
    pub fn set_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn pattern(&self) -> Option<&String> {
        self.pattern.as_ref()
    }

    /// Whether the filter admits `value`.
    ///
    /// The value must carry the filter's runtime type, and when a pattern is
    /// present its string representation must match the pattern. Definitions
    /// are verifier-authored input, so a pattern that fails to compile admits
    /// nothing rather than erroring.
    pub fn admits(&self, value: &Value) -> bool {
        if !self.value_type.is_type_of(value) {
            return false;
        }

        let Some(pattern) = self.pattern.as_ref() else {
            return true;
        };

        match Regex::new(pattern) {
            Ok(regex) => regex.is_match(&string_repr(value)),
            Err(err) => {
                tracing::debug!(%pattern, %err, "filter pattern failed to compile");
                false
            }
        }
    }
}

/// Strings match on their raw content; all other values match on their JSON
/// text.
fn string_repr(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// A single field constraint a credential must satisfy.
///
/// `path` is a non-empty list of [ClaimPath] expressions forming a fallback
/// chain: selectors are tried in order, and the first one that resolves to at
/// least one value decides the field. Later selectors are alternatives for
/// differently-shaped credentials, never additional requirements.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConstraintField {
    path: NonEmptyVec<ClaimPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    filter: Filter,
}

impl ConstraintField {
    /// Create a new field constraint for the given path and filter.
    ///
    /// Constraint fields must have at least one claim path; use
    /// [ConstraintField::add_path] to extend the fallback chain.
    pub fn new(path: ClaimPath, filter: Filter) -> Self {
        Self {
            path: NonEmptyVec::new(path),
            id: None,
            purpose: None,
            filter,
        }
    }

    /// Append an alternative claim path to the fallback chain.
    pub fn add_path(mut self, path: ClaimPath) -> Self {
        self.path.push(path);
        self
    }

    pub fn path(&self) -> &NonEmptyVec<ClaimPath> {
        &self.path
    }

    /// Set the id of the field constraint.
    ///
    /// If present, its value MUST be a string that is unique from every other
    /// field object's id property.
    pub fn set_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    /// Set the purpose of the field constraint.
    ///
    /// If present, its value MUST be a string that describes the purpose for
    /// which the field is being requested.
    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Evaluate the field against a credential's claims envelope.
    ///
    /// The first selector in the chain that resolves to at least one value
    /// decides: the field passes iff any of those values is admitted by the
    /// filter. If no selector resolves, the field fails: a constraint that
    /// found nothing to check is unsatisfied, not vacuously true.
    pub fn matches(&self, envelope: &Value) -> bool {
        for selector in self.path.iter() {
            let values = claim_path::resolve(envelope, selector);
            if values.is_empty() {
                // No match for this selector; fall through to the next one.
                continue;
            }
            return values.into_iter().any(|value| self.filter.admits(value));
        }

        tracing::debug!(field = ?self.id, "no claim path resolved, field is unsatisfied");
        false
    }
}

/// The constraints a credential must satisfy to fulfill an input descriptor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Constraints {
    fields: NonEmptyVec<ConstraintField>,
}

impl Constraints {
    pub fn new(field: ConstraintField) -> Self {
        Self {
            fields: NonEmptyVec::new(field),
        }
    }

    pub fn add_field(mut self, field: ConstraintField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ConstraintField] {
        &self.fields
    }
}

/// Input descriptors describe the information a verifier requires of a
/// holder.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct InputDescriptor {
    id: String,
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
}

impl InputDescriptor {
    /// Create a new input descriptor with the given id and constraints.
    ///
    /// The id MUST be a string that does not conflict with the id of another
    /// input descriptor in the same presentation definition.
    pub fn new(id: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            id: id.into(),
            constraints,
            name: None,
            purpose: None,
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the purpose of the input descriptor.
    ///
    /// If present, the purpose MUST be a string that describes the purpose
    /// for which the claim's data is being requested.
    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Whether a credential's claims envelope satisfies every field
    /// constraint of this descriptor.
    pub fn matches(&self, envelope: &Value) -> bool {
        self.constraints
            .fields()
            .iter()
            .all(|field| field.matches(envelope))
    }
}
