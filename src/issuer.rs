use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::credential::{
    Credential, Identifier, KeyHandle, SignedCredential, SigningIdentity, BASE_CREDENTIAL_TYPE,
};

/// Capability to encode and sign a credential into its compact token form.
///
/// The issuance orchestrator never inspects the produced token; whatever the
/// signer returns is handed to the caller unchanged.
#[async_trait]
pub trait Signer {
    /// Sign `credential` with the key behind `key`.
    ///
    /// Fails when the key is unknown or revoked.
    async fn sign(
        &self,
        credential: &Credential,
        key: &KeyHandle,
    ) -> anyhow::Result<SignedCredential>;
}

#[derive(Error, Debug)]
pub enum IssueError {
    #[error("an issuing identity is required")]
    MissingIssuer,
    #[error("a credential subject is required")]
    MissingSubject,
    #[error("a claims mapping is required")]
    MissingClaims,
    #[error("credential type `{0}` is not issuable by this issuer")]
    UnsupportedType(String),
    #[error("the signer failed to sign the credential")]
    Signer(#[source] anyhow::Error),
}

/// The input to [CredentialIssuer::issue].
///
/// Only the issuer, subject and claims are required. Additional credential
/// types and an expiration instant are optional; the base type is always
/// present on the minted credential whether requested or not.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    issuer: Option<SigningIdentity>,
    subject: Option<Identifier>,
    claims: Option<Map<String, Value>>,
    types: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl IssueRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity issuing and signing the credential.
    pub fn with_issuer(mut self, issuer: SigningIdentity) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Set the subject the claims are about.
    pub fn with_subject(mut self, subject: impl Into<Identifier>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the claims made about the subject.
    ///
    /// An empty mapping is a valid claims set; only leaving the claims unset
    /// fails issuance.
    pub fn with_claims(mut self, claims: Map<String, Value>) -> Self {
        self.claims = Some(claims);
        self
    }

    /// Request an additional credential type beyond the base type.
    pub fn with_type(mut self, credential_type: impl Into<String>) -> Self {
        self.types.push(credential_type.into());
        self
    }

    /// Set the instant at which the credential expires.
    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Mints signed credentials through an external [Signer].
#[derive(Debug)]
pub struct CredentialIssuer<S> {
    signer: S,
    allowed_types: Option<HashSet<String>>,
}

impl<S: Signer> CredentialIssuer<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            allowed_types: None,
        }
    }

    /// Restrict the credential types this issuer will mint.
    ///
    /// The base type does not need to be listed; it is always issuable.
    pub fn with_allowed_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Validate the request, assemble the credential, and sign it.
    ///
    /// The issuance instant is stamped here, so repeated calls with the same
    /// request produce distinct credentials.
    pub async fn issue(&self, request: IssueRequest) -> Result<SignedCredential, IssueError> {
        let IssueRequest {
            issuer,
            subject,
            claims,
            types,
            expires_at,
        } = request;

        let Some(issuer) = issuer else {
            return Err(IssueError::MissingIssuer);
        };
        let Some(subject) = subject else {
            return Err(IssueError::MissingSubject);
        };
        let Some(claims) = claims else {
            return Err(IssueError::MissingClaims);
        };

        if let Some(allowed) = &self.allowed_types {
            if let Some(unsupported) = types
                .iter()
                .find(|t| t.as_str() != BASE_CREDENTIAL_TYPE && !allowed.contains(*t))
            {
                return Err(IssueError::UnsupportedType(unsupported.clone()));
            }
        }

        let mut credential = Credential::new(issuer.id.clone(), subject, types, claims, Utc::now());
        if let Some(expires_at) = expires_at {
            credential = credential.set_expiration(expires_at);
        }

        let token = self
            .signer
            .sign(&credential, &issuer.key)
            .await
            .map_err(IssueError::Signer)?;

        tracing::info!(
            issuer = %credential.issuer(),
            subject = %credential.subject(),
            "issued credential"
        );

        Ok(token)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    struct EchoSigner;

    #[async_trait]
    impl Signer for EchoSigner {
        async fn sign(
            &self,
            credential: &Credential,
            _key: &KeyHandle,
        ) -> anyhow::Result<SignedCredential> {
            Ok(SignedCredential::new(serde_json::to_string(
                &credential.claims_envelope(),
            )?))
        }
    }

    fn identity() -> SigningIdentity {
        SigningIdentity::new(Identifier::new("did:ex:issuer"), KeyHandle::new("key-1"))
    }

    fn base_request() -> IssueRequest {
        IssueRequest::new()
            .with_issuer(identity())
            .with_subject("did:ex:subject")
            .with_claims(
                json!({ "siloNum": "silo0_UR001" })
                    .as_object()
                    .unwrap()
                    .clone(),
            )
    }

    #[tokio::test]
    async fn issues_a_signed_credential() {
        let issuer = CredentialIssuer::new(EchoSigner);
        let token = issuer
            .issue(base_request().with_type("SiloVerificationCredential"))
            .await
            .unwrap();

        assert!(token.as_str().contains("VerifiableCredential"));
        assert!(token.as_str().contains("SiloVerificationCredential"));
        assert!(token.as_str().contains("silo0_UR001"));
    }

    #[tokio::test]
    async fn missing_inputs_are_rejected() {
        let issuer = CredentialIssuer::new(EchoSigner);

        let no_issuer = IssueRequest::new()
            .with_subject("did:ex:subject")
            .with_claims(Map::new());
        assert!(matches!(
            issuer.issue(no_issuer).await,
            Err(IssueError::MissingIssuer)
        ));

        let no_subject = IssueRequest::new()
            .with_issuer(identity())
            .with_claims(Map::new());
        assert!(matches!(
            issuer.issue(no_subject).await,
            Err(IssueError::MissingSubject)
        ));

        let no_claims = IssueRequest::new()
            .with_issuer(identity())
            .with_subject("did:ex:subject");
        assert!(matches!(
            issuer.issue(no_claims).await,
            Err(IssueError::MissingClaims)
        ));
    }

    #[tokio::test]
    async fn empty_claims_are_still_claims() {
        let issuer = CredentialIssuer::new(EchoSigner);
        let request = IssueRequest::new()
            .with_issuer(identity())
            .with_subject("did:ex:subject")
            .with_claims(Map::new());

        assert!(issuer.issue(request).await.is_ok());
    }

    #[tokio::test]
    async fn type_restrictions_are_enforced() {
        let issuer =
            CredentialIssuer::new(EchoSigner).with_allowed_types(["SiloVerificationCredential"]);

        let ok = base_request().with_type("SiloVerificationCredential");
        assert!(issuer.issue(ok).await.is_ok());

        let unsupported = base_request().with_type("EmploymentCredential");
        match issuer.issue(unsupported).await {
            Err(IssueError::UnsupportedType(t)) => assert_eq!(t, "EmploymentCredential"),
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_base_type_never_needs_an_allowance() {
        let issuer =
            CredentialIssuer::new(EchoSigner).with_allowed_types(["SiloVerificationCredential"]);

        let base_only = base_request().with_type(BASE_CREDENTIAL_TYPE);
        assert!(issuer.issue(base_only).await.is_ok());
    }

    #[tokio::test]
    async fn signer_failures_surface_with_their_cause() {
        struct FailingSigner;

        #[async_trait]
        impl Signer for FailingSigner {
            async fn sign(
                &self,
                _credential: &Credential,
                _key: &KeyHandle,
            ) -> anyhow::Result<SignedCredential> {
                anyhow::bail!("key is revoked")
            }
        }

        let issuer = CredentialIssuer::new(FailingSigner);
        match issuer.issue(base_request()).await {
            Err(IssueError::Signer(err)) => assert!(err.to_string().contains("revoked")),
            other => panic!("expected a signer error, got {other:?}"),
        }
    }
}
