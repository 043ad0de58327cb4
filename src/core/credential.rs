use std::fmt;

use anyhow::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The type every issued credential carries, per the
/// [W3C VC Data Model](https://www.w3.org/TR/vc-data-model/#types).
pub const BASE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

/// An opaque, DID-equivalent identifier for an issuer or subject.
///
/// This crate never resolves identifiers; they are compared byte-wise and
/// passed through to the signer and verifier capabilities unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An opaque reference to a signing key held by a
/// [`Signer`](crate::issuer::Signer). Only the signer can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHandle(String);

impl KeyHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyHandle {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

impl From<String> for KeyHandle {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

/// The issuer-side identity bundle: the identifier credentials are issued
/// under, together with the key that signs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningIdentity {
    pub id: Identifier,
    pub key: KeyHandle,
}

impl SigningIdentity {
    pub fn new(id: Identifier, key: KeyHandle) -> Self {
        Self { id, key }
    }
}

/// An unsigned credential: a set of claims an issuer makes about a subject.
///
/// Instances are assembled by the issuance orchestrator, signed exactly once,
/// and never mutated afterwards. The type list is deduplicated and always
/// starts with [`BASE_CREDENTIAL_TYPE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    issuer: Identifier,
    subject: Identifier,
    #[serde(rename = "type")]
    types: Vec<String>,
    claims: Map<String, Value>,
    issuance_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration_time: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        issuer: Identifier,
        subject: Identifier,
        types: Vec<String>,
        claims: Map<String, Value>,
        issuance_time: DateTime<Utc>,
    ) -> Self {
        let mut normalized = vec![BASE_CREDENTIAL_TYPE.to_string()];
        for t in types {
            if !normalized.contains(&t) {
                normalized.push(t);
            }
        }
        Self {
            issuer,
            subject,
            types: normalized,
            claims,
            issuance_time,
            expiration_time: None,
        }
    }

    pub fn set_expiration(mut self, expiration_time: DateTime<Utc>) -> Self {
        self.expiration_time = Some(expiration_time);
        self
    }

    pub fn issuer(&self) -> &Identifier {
        &self.issuer
    }

    pub fn subject(&self) -> &Identifier {
        &self.subject
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn issuance_time(&self) -> DateTime<Utc> {
        self.issuance_time
    }

    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.expiration_time
    }

    /// Whether the credential is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.map(|exp| exp <= now).unwrap_or(false)
    }

    /// The JSON projection that constraint field paths address.
    ///
    /// Claim paths in a presentation definition are written against this
    /// shape, e.g. `$.type[*]` or `$.credentialSubject.siloNum`, matching the
    /// enveloped form of the
    /// [W3C VC Data Model](https://www.w3.org/TR/vc-data-model/#basic-concepts).
    pub fn claims_envelope(&self) -> Value {
        let mut subject = Map::new();
        subject.insert("id".into(), Value::String(self.subject.to_string()));
        for (key, value) in &self.claims {
            subject.insert(key.clone(), value.clone());
        }

        let mut envelope = Map::new();
        envelope.insert("issuer".into(), Value::String(self.issuer.to_string()));
        envelope.insert(
            "type".into(),
            Value::Array(self.types.iter().cloned().map(Value::String).collect()),
        );
        envelope.insert("credentialSubject".into(), Value::Object(subject));
        envelope.insert(
            "issuanceDate".into(),
            Value::String(self.issuance_time.to_rfc3339()),
        );
        if let Some(expiration) = self.expiration_time {
            envelope.insert(
                "expirationDate".into(),
                Value::String(expiration.to_rfc3339()),
            );
        }
        Value::Object(envelope)
    }
}

/// A credential in its signed, serialized compact form.
///
/// Tokens are opaque to the exchange layer: produced once at issuance,
/// stored, presented and verified without ever being altered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedCredential(String);

impl SignedCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SignedCredential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SignedCredential {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Outcome of verifying a single signed credential.
///
/// `claims` is populated only when the credential verified successfully and
/// the caller asked for claims to be included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
}

impl VerificationResult {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            claims: None,
        }
    }
}

/// Per-credential outcomes for a whole presentation, index-aligned with the
/// presentation's `verifiable_credential` list.
pub type VerificationResultList = Vec<VerificationResult>;

/// Bridges opaque signed tokens and the structured credential model.
///
/// Selection needs to read the claims inside pool tokens; a codec recovers
/// them. `serialize` produces the pre-signature compact form a
/// [`Signer`](crate::issuer::Signer) completes.
pub trait CredentialCodec {
    fn parse(&self, token: &SignedCredential) -> Result<Credential, Error>;

    fn serialize(&self, credential: &Credential) -> Result<String, Error>;
}


#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn sample() -> Credential {
        Credential::new(
            Identifier::from("did:ex:issuer"),
            Identifier::from("did:ex:subject"),
            vec!["SiloVerificationCredential".into()],
            json!({ "siloNum": "silo0_UR001", "city": "Ibadan" })
                .as_object()
                .unwrap()
                .clone(),
            Utc::now(),
        )
    }

    #[test]
    fn base_type_is_always_first() {
        let credential = sample();
        assert_eq!(credential.types()[0], BASE_CREDENTIAL_TYPE);
        assert_eq!(credential.types()[1], "SiloVerificationCredential");
    }

    #[test]
    fn duplicate_types_collapse() {
        let credential = Credential::new(
            Identifier::from("did:ex:issuer"),
            Identifier::from("did:ex:subject"),
            vec![
                BASE_CREDENTIAL_TYPE.to_string(),
                "EmploymentCredential".into(),
                "EmploymentCredential".into(),
            ],
            Map::new(),
            Utc::now(),
        );
        assert_eq!(
            credential.types(),
            &[BASE_CREDENTIAL_TYPE, "EmploymentCredential"]
        );
    }

    #[test]
    fn envelope_exposes_subject_claims() {
        let envelope = sample().claims_envelope();
        assert_eq!(envelope["credentialSubject"]["id"], "did:ex:subject");
        assert_eq!(envelope["credentialSubject"]["siloNum"], "silo0_UR001");
        assert_eq!(envelope["type"][0], BASE_CREDENTIAL_TYPE);
        assert!(envelope["issuanceDate"].is_string());
        assert!(envelope.get("expirationDate").is_none());
    }

    #[test]
    fn expiration_is_optional_and_checked_against_now() {
        let credential = sample();
        assert!(!credential.is_expired_at(Utc::now()));

        let expired = sample().set_expiration(Utc::now() - chrono::Duration::hours(1));
        assert!(expired.is_expired_at(Utc::now()));
        assert!(expired.claims_envelope().get("expirationDate").is_some());
    }
}
