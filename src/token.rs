//! A reference token stack for tests, demos and local development: a compact
//! JWT-style codec, an in-memory P-256 keyring, and [Signer] / [TokenVerifier]
//! capabilities backed by it. Not for production use!

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Error, Result};
use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::core::credential::{
    Credential, CredentialCodec, Identifier, KeyHandle, SignedCredential, SigningIdentity,
};
use crate::issuer::Signer;
use crate::verifier::{TokenVerifier, VerificationReport};

const W3C_CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Encodes credentials in the compact JOSE form `header.payload[.signature]`,
/// with the W3C-shaped document under the `vc` claim.
///
/// `serialize` produces the unsigned `header.payload` prefix; a signer
/// appends the signature segment. `parse` reads the payload and ignores any
/// signature, so it accepts both signed and unsigned tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactJwtCodec;

impl CredentialCodec for CompactJwtCodec {
    fn parse(&self, token: &SignedCredential) -> Result<Credential, Error> {
        let mut segments = token.as_str().split('.');
        let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
            bail!("token is not in compact form")
        };

        let payload_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .context("token payload was not valid base64url")?;
        let payload: Value =
            serde_json::from_slice(&payload_bytes).context("token payload was not valid json")?;

        credential_from_payload(&payload)
    }

    fn serialize(&self, credential: &Credential) -> Result<String, Error> {
        let header = json!({ "alg": "ES256", "typ": "JWT" });
        Ok(format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload_of(credential))?),
        ))
    }
}

fn payload_of(credential: &Credential) -> Value {
    let mut vc = match credential.claims_envelope() {
        Value::Object(envelope) => envelope,
        // The envelope is always an object.
        _ => Map::new(),
    };
    // The issuer lives in the `iss` claim in compact form.
    vc.remove("issuer");
    vc.insert("@context".into(), json!([W3C_CREDENTIALS_CONTEXT]));

    let mut payload = Map::new();
    payload.insert("iss".into(), Value::String(credential.issuer().to_string()));
    payload.insert(
        "sub".into(),
        Value::String(credential.subject().to_string()),
    );
    payload.insert("nbf".into(), json!(credential.issuance_time().timestamp()));
    if let Some(expiration) = credential.expiration_time() {
        payload.insert("exp".into(), json!(expiration.timestamp()));
    }
    payload.insert("vc".into(), Value::Object(vc));
    Value::Object(payload)
}

fn credential_from_payload(payload: &Value) -> Result<Credential> {
    let issuer = payload
        .get("iss")
        .and_then(Value::as_str)
        .context("'iss' was missing from the token payload")?;
    let subject = payload
        .get("sub")
        .and_then(Value::as_str)
        .context("'sub' was missing from the token payload")?;
    let vc = payload
        .get("vc")
        .and_then(Value::as_object)
        .context("'vc' was missing from the token payload")?;

    let types = vc
        .get("type")
        .and_then(Value::as_array)
        .context("'type' was missing from the vc claim")?
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect();

    let mut claims = vc
        .get("credentialSubject")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    claims.remove("id");

    let issuance_time = vc
        .get("issuanceDate")
        .and_then(Value::as_str)
        .context("'issuanceDate' was missing from the vc claim")?
        .parse::<DateTime<Utc>>()
        .context("'issuanceDate' was not a valid RFC 3339 instant")?;

    let mut credential = Credential::new(
        issuer.into(),
        subject.into(),
        types,
        claims,
        issuance_time,
    );
    if let Some(expiration) = vc.get("expirationDate").and_then(Value::as_str) {
        credential = credential.set_expiration(
            expiration
                .parse::<DateTime<Utc>>()
                .context("'expirationDate' was not a valid RFC 3339 instant")?,
        );
    }

    Ok(credential)
}

/// Split a signed compact token into its signable prefix and signature.
fn split_signed(token: &str) -> Result<(&str, &str)> {
    let Some((message, signature)) = token.rsplit_once('.') else {
        bail!("token is not in signed compact form")
    };
    if message.split('.').count() != 2 {
        bail!("token is not in signed compact form")
    }
    Ok((message, signature))
}

#[derive(Debug, Clone)]
struct KeyEntry {
    issuer: Identifier,
    key: SigningKey,
    revoked: bool,
}

/// An in-memory key store. Not for production use!
///
/// # Warning
/// This keyring should only be used for test and demo purposes; keys are
/// held unencrypted in process memory and do not survive a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyring {
    keys: Arc<Mutex<HashMap<String, KeyEntry>>>,
}

impl InMemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh P-256 key for `issuer` and return the identity bundle
    /// that issues under it.
    pub async fn register(&self, issuer: impl Into<Identifier>) -> Result<SigningIdentity> {
        let issuer = issuer.into();
        let handle = KeyHandle::new(uuid::Uuid::new_v4().to_string());
        let entry = KeyEntry {
            issuer: issuer.clone(),
            key: SigningKey::random(&mut OsRng),
            revoked: false,
        };
        self.keys
            .try_lock()?
            .insert(handle.as_str().to_string(), entry);

        Ok(SigningIdentity::new(issuer, handle))
    }

    /// Revoke the key behind `handle`. Signing with it fails afterwards;
    /// already-issued tokens keep verifying.
    pub async fn revoke(&self, handle: &KeyHandle) -> Result<()> {
        if let Some(entry) = self.keys.try_lock()?.get_mut(handle.as_str()) {
            entry.revoked = true;
            return Ok(());
        }

        bail!("key not found")
    }

    async fn signing_key(&self, handle: &KeyHandle) -> Result<SigningKey> {
        let keys = self.keys.try_lock()?;
        let Some(entry) = keys.get(handle.as_str()) else {
            bail!("key not found")
        };
        if entry.revoked {
            bail!("key is revoked")
        }

        Ok(entry.key.clone())
    }

    /// The verifying key for `issuer`, resolved by byte-wise identifier
    /// comparison.
    async fn verifying_key(&self, issuer: &Identifier) -> Result<Option<VerifyingKey>> {
        Ok(self
            .keys
            .try_lock()?
            .values()
            .find(|entry| &entry.issuer == issuer)
            .map(|entry| *entry.key.verifying_key()))
    }
}

/// A [Signer] producing ES256 compact tokens with keys from an
/// [InMemoryKeyring].
#[derive(Debug, Clone)]
pub struct KeyringSigner {
    keyring: InMemoryKeyring,
    codec: CompactJwtCodec,
}

impl KeyringSigner {
    pub fn new(keyring: InMemoryKeyring) -> Self {
        Self {
            keyring,
            codec: CompactJwtCodec,
        }
    }
}

#[async_trait]
impl Signer for KeyringSigner {
    async fn sign(
        &self,
        credential: &Credential,
        key: &KeyHandle,
    ) -> Result<SignedCredential> {
        let signing_key = self.keyring.signing_key(key).await?;
        let message = self.codec.serialize(credential)?;
        let signature: Signature = signing_key.sign(message.as_bytes());

        Ok(SignedCredential::new(format!(
            "{message}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(signature.to_vec())
        )))
    }
}

/// A [TokenVerifier] resolving issuers against an [InMemoryKeyring].
///
/// Well-formed tokens that fail a check (unknown issuer, bad signature,
/// expired under the default policy) report `valid: false`; only tokens
/// that cannot be examined at all are errors.
#[derive(Debug, Clone)]
pub struct KeyringVerifier {
    keyring: InMemoryKeyring,
    codec: CompactJwtCodec,
    reject_expired: bool,
}

impl KeyringVerifier {
    pub fn new(keyring: InMemoryKeyring) -> Self {
        Self {
            keyring,
            codec: CompactJwtCodec,
            reject_expired: true,
        }
    }

    /// Accept expired credentials instead of reporting them invalid.
    pub fn allow_expired(mut self) -> Self {
        self.reject_expired = false;
        self
    }
}

#[async_trait]
impl TokenVerifier for KeyringVerifier {
    async fn verify(&self, token: &SignedCredential) -> Result<VerificationReport> {
        let (message, encoded_signature) = split_signed(token.as_str())?;
        let credential = self.codec.parse(token)?;

        let Some(verifying_key) = self.keyring.verifying_key(credential.issuer()).await? else {
            tracing::debug!(issuer = %credential.issuer(), "issuer is not in the keyring");
            return Ok(VerificationReport {
                valid: false,
                claims: Map::new(),
            });
        };

        let signature = Signature::from_slice(
            &BASE64_URL_SAFE_NO_PAD
                .decode(encoded_signature)
                .context("could not decode base64url encoded token signature")?,
        )
        .context("token signature was not a valid P-256 signature")?;

        if verifying_key
            .verify(message.as_bytes(), &signature)
            .is_err()
        {
            tracing::debug!(issuer = %credential.issuer(), "token signature does not verify");
            return Ok(VerificationReport {
                valid: false,
                claims: Map::new(),
            });
        }

        if self.reject_expired && credential.is_expired_at(Utc::now()) {
            tracing::debug!(issuer = %credential.issuer(), "token is expired");
            return Ok(VerificationReport {
                valid: false,
                claims: Map::new(),
            });
        }

        let envelope = credential.claims_envelope();
        let claims = match envelope.get("credentialSubject") {
            Some(Value::Object(subject)) => subject.clone(),
            _ => Map::new(),
        };

        Ok(VerificationReport {
            valid: true,
            claims,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::issuer::{CredentialIssuer, IssueRequest};

    fn sample_credential() -> Credential {
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

    fn sample_request(identity: SigningIdentity) -> IssueRequest {
        IssueRequest::new()
            .with_issuer(identity)
            .with_subject("did:ex:subject")
            .with_type("SiloVerificationCredential")
            .with_claims(
                json!({ "siloNum": "silo0_UR001" })
                    .as_object()
                    .unwrap()
                    .clone(),
            )
    }

    #[test]
    fn credentials_round_trip_through_the_codec() {
        let credential = sample_credential().set_expiration(Utc::now() + chrono::Duration::days(30));
        let token = SignedCredential::new(CompactJwtCodec.serialize(&credential).unwrap());

        let parsed = CompactJwtCodec.parse(&token).unwrap();
        assert_eq!(parsed, credential);
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(CompactJwtCodec
            .parse(&SignedCredential::new("garbage"))
            .is_err());
        assert!(CompactJwtCodec
            .parse(&SignedCredential::new("not.base64url"))
            .is_err());
    }

    #[tokio::test]
    async fn issued_tokens_verify_against_the_keyring() {
        let keyring = InMemoryKeyring::new();
        let identity = keyring.register("did:ex:issuer").await.unwrap();
        let issuer = CredentialIssuer::new(KeyringSigner::new(keyring.clone()));

        let token = issuer.issue(sample_request(identity)).await.unwrap();
        let report = KeyringVerifier::new(keyring).verify(&token).await.unwrap();

        assert!(report.valid);
        assert_eq!(report.claims["siloNum"], "silo0_UR001");
        assert_eq!(report.claims["id"], "did:ex:subject");
    }

    #[tokio::test]
    async fn tampered_payloads_do_not_verify() {
        let keyring = InMemoryKeyring::new();
        let identity = keyring.register("did:ex:issuer").await.unwrap();
        let issuer = CredentialIssuer::new(KeyringSigner::new(keyring.clone()));

        let token = issuer.issue(sample_request(identity.clone())).await.unwrap();
        let other = issuer
            .issue(
                IssueRequest::new()
                    .with_issuer(identity)
                    .with_subject("did:ex:subject")
                    .with_claims(json!({ "siloNum": "silo9_XX999" }).as_object().unwrap().clone()),
            )
            .await
            .unwrap();

        // Stitch the other token's payload onto the first token's signature.
        let parts: Vec<&str> = token.as_str().split('.').collect();
        let other_parts: Vec<&str> = other.as_str().split('.').collect();
        let stitched =
            SignedCredential::new(format!("{}.{}.{}", parts[0], other_parts[1], parts[2]));

        let report = KeyringVerifier::new(keyring)
            .verify(&stitched)
            .await
            .unwrap();
        assert!(!report.valid);
        assert!(report.claims.is_empty());
    }

    #[tokio::test]
    async fn unknown_issuers_are_invalid_not_errors() {
        let signing_keyring = InMemoryKeyring::new();
        let identity = signing_keyring.register("did:ex:issuer").await.unwrap();
        let issuer = CredentialIssuer::new(KeyringSigner::new(signing_keyring));
        let token = issuer.issue(sample_request(identity)).await.unwrap();

        // A verifier with its own, empty keyring has never seen this issuer.
        let report = KeyringVerifier::new(InMemoryKeyring::new())
            .verify(&token)
            .await
            .unwrap();
        assert!(!report.valid);
    }

    #[tokio::test]
    async fn revoked_keys_refuse_to_sign() {
        let keyring = InMemoryKeyring::new();
        let identity = keyring.register("did:ex:issuer").await.unwrap();
        keyring.revoke(&identity.key).await.unwrap();

        let issuer = CredentialIssuer::new(KeyringSigner::new(keyring));
        let outcome = issuer.issue(sample_request(identity)).await;

        match outcome {
            Err(err) => assert!(err.to_string().contains("sign")),
            Ok(_) => panic!("expected signing to fail with a revoked key"),
        }
    }

    #[tokio::test]
    async fn expiry_enforcement_is_the_verifier_policy() {
        let keyring = InMemoryKeyring::new();
        let identity = keyring.register("did:ex:issuer").await.unwrap();
        let issuer = CredentialIssuer::new(KeyringSigner::new(keyring.clone()));

        let expired = issuer
            .issue(sample_request(identity).with_expiration(Utc::now() - chrono::Duration::hours(1)))
            .await
            .unwrap();

        let strict = KeyringVerifier::new(keyring.clone());
        assert!(!strict.verify(&expired).await.unwrap().valid);

        let lenient = KeyringVerifier::new(keyring).allow_expired();
        assert!(lenient.verify(&expired).await.unwrap().valid);
    }

    #[tokio::test]
    async fn malformed_tokens_are_errors() {
        let verifier = KeyringVerifier::new(InMemoryKeyring::new());
        assert!(verifier
            .verify(&SignedCredential::new("garbage"))
            .await
            .is_err());
        assert!(verifier
            .verify(&SignedCredential::new("only.two-segments"))
            .await
            .is_err());
    }
}
