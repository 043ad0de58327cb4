use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::credential::{SignedCredential, VerificationResult, VerificationResultList};
use crate::core::presentation_definition::PresentationDefinition;
use crate::core::presentation_submission::{contains_errors, Diagnostic, Presentation};

/// What a [TokenVerifier] learned about a single token.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub valid: bool,
    pub claims: Map<String, Value>,
}

/// Capability to check a signed token's authenticity.
///
/// `Err` is reserved for non-recoverable problems, i.e. a token so malformed
/// it cannot be examined. A token that is well-formed but fails its checks
/// (bad signature, unknown issuer, expired) is reported as `valid: false`.
#[async_trait]
pub trait TokenVerifier {
    async fn verify(&self, token: &SignedCredential) -> anyhow::Result<VerificationReport>;
}

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("the presentation carries no credentials")]
    EmptyCredentialSet,
    #[error("the presentation submission does not conform to the definition")]
    InvalidSubmission(Vec<Diagnostic>),
    #[error("the verifier capability failed")]
    External(#[source] anyhow::Error),
}

/// Verify a single credential through `capability`.
///
/// Claims are attached to the result only when the token verifies and
/// `include_claims` is set. A capability error means the token could not be
/// examined at all and propagates as [VerificationError::External].
pub async fn verify_credential(
    token: &SignedCredential,
    include_claims: bool,
    capability: &impl TokenVerifier,
) -> Result<VerificationResult, VerificationError> {
    let report = capability
        .verify(token)
        .await
        .map_err(VerificationError::External)?;

    let claims = (report.valid && include_claims).then_some(report.claims);
    Ok(VerificationResult {
        valid: report.valid,
        claims,
    })
}

/// Checks whole presentations against a fixed definition.
#[derive(Debug)]
pub struct PresentationVerifier<V> {
    verifier: V,
    definition: PresentationDefinition,
}

impl<V: TokenVerifier> PresentationVerifier<V> {
    pub fn new(verifier: V, definition: PresentationDefinition) -> Self {
        Self {
            verifier,
            definition,
        }
    }

    pub fn definition(&self) -> &PresentationDefinition {
        &self.definition
    }

    /// Verify every credential in `presentation`, one result per slot.
    ///
    /// An empty credential list is rejected before anything else, then the
    /// submission is structurally validated. Verification itself never
    /// short-circuits: a failing or unexaminable token becomes a
    /// `valid: false` slot and the remaining slots are still verified, so
    /// the result list is always index-aligned with the presented
    /// credentials.
    pub async fn verify_presentation(
        &self,
        presentation: &Presentation,
        include_claims: bool,
    ) -> Result<VerificationResultList, VerificationError> {
        if presentation.verifiable_credential().is_empty() {
            return Err(VerificationError::EmptyCredentialSet);
        }

        let diagnostics = presentation.validate(&self.definition);
        if contains_errors(&diagnostics) {
            return Err(VerificationError::InvalidSubmission(diagnostics));
        }

        let mut results = VerificationResultList::new();
        for (index, token) in presentation.verifiable_credential().iter().enumerate() {
            match verify_credential(token, include_claims, &self.verifier).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::warn!(index, %err, "credential could not be examined");
                    results.push(VerificationResult::invalid());
                }
            }
        }

        tracing::debug!(
            definition = %self.definition.id(),
            total = results.len(),
            valid = results.iter().filter(|result| result.valid).count(),
            "verified presentation"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::input_descriptor::{
        ConstraintField, Constraints, Filter, InputDescriptor, ValueType,
    };
    use crate::core::presentation_submission::{DescriptorMap, PresentationSubmission};

    /// Treats `tampered-*` tokens as failing verification and
    /// `unexaminable` as unparseable; everything else verifies.
    struct StubVerifier;

    #[async_trait]
    impl TokenVerifier for StubVerifier {
        async fn verify(&self, token: &SignedCredential) -> anyhow::Result<VerificationReport> {
            if token.as_str() == "unexaminable" {
                anyhow::bail!("token has no recognizable structure");
            }
            let mut claims = Map::new();
            claims.insert("token".into(), Value::String(token.as_str().into()));
            Ok(VerificationReport {
                valid: !token.as_str().starts_with("tampered"),
                claims,
            })
        }
    }

    fn silo_definition() -> PresentationDefinition {
        PresentationDefinition::new(
            "pd-1",
            InputDescriptor::new(
                "silo",
                Constraints::new(ConstraintField::new(
                    "$.type[*]".into(),
                    Filter::new(ValueType::String).set_pattern("SiloVerification"),
                )),
            ),
        )
    }

    fn submission(entries: Vec<DescriptorMap>) -> PresentationSubmission {
        PresentationSubmission::new(uuid::Uuid::new_v4(), "pd-1".to_string(), entries)
    }

    #[tokio::test]
    async fn claims_follow_the_include_flag() {
        let token = SignedCredential::new("token-a");

        let with_claims = verify_credential(&token, true, &StubVerifier).await.unwrap();
        assert!(with_claims.valid);
        assert_eq!(
            with_claims.claims.unwrap()["token"],
            Value::String("token-a".into())
        );

        let without_claims = verify_credential(&token, false, &StubVerifier)
            .await
            .unwrap();
        assert!(without_claims.valid);
        assert!(without_claims.claims.is_none());

        let failing = verify_credential(&SignedCredential::new("tampered-b"), true, &StubVerifier)
            .await
            .unwrap();
        assert!(!failing.valid);
        assert!(failing.claims.is_none());
    }

    #[tokio::test]
    async fn repeated_verification_is_stable() {
        let token = SignedCredential::new("token-a");
        let first = verify_credential(&token, false, &StubVerifier).await.unwrap();
        let second = verify_credential(&token, false, &StubVerifier).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unexaminable_tokens_error_when_verified_alone() {
        let outcome =
            verify_credential(&SignedCredential::new("unexaminable"), true, &StubVerifier).await;
        assert!(matches!(outcome, Err(VerificationError::External(_))));
    }

    #[tokio::test]
    async fn batch_verification_never_short_circuits() {
        let verifier = PresentationVerifier::new(StubVerifier, silo_definition());
        let presentation = Presentation::new(
            submission(vec![DescriptorMap::for_credential_index("silo", 0)]),
            vec![
                SignedCredential::new("token-a"),
                SignedCredential::new("tampered-b"),
                SignedCredential::new("unexaminable"),
                SignedCredential::new("token-c"),
            ],
        );

        let results = verifier
            .verify_presentation(&presentation, true)
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert!(!results[2].valid);
        assert!(results[3].valid);
        assert!(results[0].claims.is_some());
        assert!(results[1].claims.is_none());
        assert!(results[2].claims.is_none());
    }

    #[tokio::test]
    async fn empty_presentations_are_rejected_before_structure() {
        let verifier = PresentationVerifier::new(StubVerifier, silo_definition());
        // The submission is also structurally wrong; emptiness must win.
        let presentation = Presentation::new(
            PresentationSubmission::new(uuid::Uuid::new_v4(), "someone-elses-pd".into(), vec![]),
            vec![],
        );

        let outcome = verifier.verify_presentation(&presentation, false).await;
        assert!(matches!(outcome, Err(VerificationError::EmptyCredentialSet)));
    }

    #[tokio::test]
    async fn invalid_submissions_are_rejected_with_diagnostics() {
        let verifier = PresentationVerifier::new(StubVerifier, silo_definition());
        let presentation = Presentation::new(
            submission(vec![DescriptorMap::for_credential_index("imaginary", 0)]),
            vec![SignedCredential::new("token-a")],
        );

        match verifier.verify_presentation(&presentation, false).await {
            Err(VerificationError::InvalidSubmission(diagnostics)) => {
                assert!(contains_errors(&diagnostics));
            }
            other => panic!("expected InvalidSubmission, got {other:?}"),
        }
    }
}
