//! This library implements the lifecycle of [W3C Verifiable Credentials]:
//! issuance, verification, and selective disclosure through [DIF Presentation
//! Exchange].
//!
//! [W3C Verifiable Credentials]: <https://www.w3.org/TR/vc-data-model/>
//! [DIF Presentation Exchange]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>
//!
//! # Issuing Credentials
//!
//! An issuer mints signed claims about a subject through a [`Signer`]
//! capability. The [`token`] module provides a keyring-backed reference
//! signer for tests and demos:
//!
//! ```ignore
//! use vc_exchange::issuer::{CredentialIssuer, IssueRequest};
//! use vc_exchange::token::{InMemoryKeyring, KeyringSigner};
//!
//! let keyring = InMemoryKeyring::new();
//! let identity = keyring.register("did:ex:silo-registry").await?;
//!
//! let issuer = CredentialIssuer::new(KeyringSigner::new(keyring.clone()))
//!     .with_allowed_types(["SiloVerificationCredential"]);
//!
//! let token = issuer
//!     .issue(
//!         IssueRequest::new()
//!             .with_issuer(identity)
//!             .with_subject("did:ex:ada")
//!             .with_type("SiloVerificationCredential")
//!             .with_claims(claims),
//!     )
//!     .await?;
//! ```
//!
//! # Presenting Credentials
//!
//! A holder answers a verifier's [`PresentationDefinition`] by selecting
//! matching credentials from their pool and assembling a presentation:
//!
//! ```ignore
//! use vc_exchange::holder::{build_presentation, CredentialWallet};
//! use vc_exchange::token::CompactJwtCodec;
//! use vc_exchange::PresentationDefinition;
//!
//! let definition: PresentationDefinition = serde_json::from_str(definition_json)?;
//!
//! let wallet = CredentialWallet::new("did:ex:ada");
//! wallet.store(token, &CompactJwtCodec).await?;
//!
//! let pool = wallet.credentials().await?;
//! let presentation = build_presentation(&definition, &pool, &CompactJwtCodec)?;
//! ```
//!
//! # Verifying Presentations
//!
//! A verifier validates the submission's structure, then checks every
//! embedded credential through a [`TokenVerifier`] capability; one result per
//! credential, in presentation order, with no short-circuiting on failures:
//!
//! ```ignore
//! use vc_exchange::token::KeyringVerifier;
//! use vc_exchange::PresentationVerifier;
//!
//! let verifier = PresentationVerifier::new(KeyringVerifier::new(keyring), definition);
//! let results = verifier.verify_presentation(&presentation, true).await?;
//!
//! for (index, result) in results.iter().enumerate() {
//!     println!("credential {index}: valid = {}", result.valid);
//! }
//! ```
//!
//! # Exchange Overview
//!
//! 1. *Issuance*: [`CredentialIssuer`] validates the request, stamps the
//!    issuance instant, and delegates encoding and signing to a [`Signer`].
//!    The result is an opaque [`SignedCredential`] token.
//! 2. *Definition*: the verifier authors a [`PresentationDefinition`], a set
//!    of input descriptors whose constraint fields pair JSONPath claim
//!    selectors with type and pattern filters.
//! 3. *Selection*: [`select_credentials`] scans the holder's pool in order
//!    and picks the first credential satisfying each descriptor, failing as a
//!    whole when any descriptor cannot be covered.
//! 4. *Submission*: [`build_presentation`] wraps the selection in a
//!    [`PresentationSubmission`] mapping each descriptor to a credential slot
//!    by JSONPath.
//! 5. *Verification*: [`PresentationVerifier`] re-validates the submission
//!    and verifies each credential independently, aggregating partial
//!    failures instead of aborting.
//!
//! [`Signer`]: crate::issuer::Signer
//! [`TokenVerifier`]: crate::verifier::TokenVerifier
//! [`CredentialIssuer`]: crate::issuer::CredentialIssuer
//! [`SignedCredential`]: crate::core::credential::SignedCredential
//! [`PresentationDefinition`]: crate::core::presentation_definition::PresentationDefinition
//! [`PresentationSubmission`]: crate::core::presentation_submission::PresentationSubmission
//! [`PresentationVerifier`]: crate::verifier::PresentationVerifier
//! [`select_credentials`]: crate::core::selection::select_credentials
//! [`build_presentation`]: crate::holder::build_presentation
//! [`token`]: crate::token

pub mod core;
pub mod holder;
pub mod issuer;
pub mod token;
pub mod utils;
pub mod verifier;

pub use crate::core::credential::{
    Credential, CredentialCodec, Identifier, KeyHandle, SignedCredential, SigningIdentity,
    VerificationResult, VerificationResultList,
};
pub use crate::core::presentation_definition::PresentationDefinition;
pub use crate::core::presentation_submission::{Presentation, PresentationSubmission};
pub use crate::holder::build_presentation;
pub use crate::issuer::{CredentialIssuer, IssueRequest};
pub use crate::verifier::{verify_credential, PresentationVerifier};
pub use serde_json_path::JsonPath;
