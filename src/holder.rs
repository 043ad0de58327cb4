use std::sync::Arc;

use anyhow::{bail, Context, Result};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::credential::{CredentialCodec, Identifier, SignedCredential};
use crate::core::presentation_definition::PresentationDefinition;
use crate::core::presentation_submission::{
    contains_errors, Diagnostic, Presentation, PresentationSubmission,
};
use crate::core::selection::{select_credentials, SelectionError};

#[derive(Error, Debug)]
pub enum BuildPresentationError {
    #[error("cannot build a presentation from an empty candidate pool")]
    EmptyCandidatePool,
    #[error("credential selection failed")]
    Selection(#[from] SelectionError),
    #[error("the built presentation submission failed validation")]
    Submission(Vec<Diagnostic>),
}

/// Select matching credentials from `pool` and assemble a presentation
/// fulfilling `definition`.
///
/// The pool is scanned in slice order; see
/// [select_credentials](crate::core::selection::select_credentials) for the
/// selection policy. The built submission is validated before the
/// presentation is returned, so a successful build always yields a
/// structurally valid presentation.
pub fn build_presentation(
    definition: &PresentationDefinition,
    pool: &[SignedCredential],
    codec: &impl CredentialCodec,
) -> Result<Presentation, BuildPresentationError> {
    if pool.is_empty() {
        return Err(BuildPresentationError::EmptyCandidatePool);
    }

    let selection = select_credentials(pool, definition, codec)?;
    let submission = PresentationSubmission::from_selection(definition, &selection);
    let presentation = Presentation::new(submission, selection.into_selected());

    let diagnostics = presentation.validate(definition);
    if contains_errors(&diagnostics) {
        return Err(BuildPresentationError::Submission(diagnostics));
    }

    tracing::debug!(
        definition = %definition.id(),
        credentials = presentation.verifiable_credential().len(),
        "built presentation"
    );

    Ok(presentation)
}

/// A holder's in-memory credential store. Not for production use!
///
/// # Warning
/// This in-memory wallet should only be used for test and demo purposes; it
/// keeps tokens unencrypted in process memory.
#[derive(Debug, Clone)]
pub struct CredentialWallet {
    owner: Identifier,
    store: Arc<Mutex<Vec<(Uuid, SignedCredential)>>>,
}

impl CredentialWallet {
    pub fn new(owner: impl Into<Identifier>) -> Self {
        Self {
            owner: owner.into(),
            store: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn owner(&self) -> &Identifier {
        &self.owner
    }

    /// Store a token after checking it was issued to this wallet's owner.
    ///
    /// Returns the id the token is filed under.
    pub async fn store(
        &self,
        token: SignedCredential,
        codec: &impl CredentialCodec,
    ) -> Result<Uuid> {
        let credential = codec
            .parse(&token)
            .context("unable to parse the credential being stored")?;
        if credential.subject() != &self.owner {
            bail!(
                "credential subject `{}` does not match the wallet owner `{}`",
                credential.subject(),
                self.owner
            );
        }

        let id = Uuid::new_v4();
        self.store.try_lock()?.push((id, token));
        Ok(id)
    }

    /// A snapshot of every stored token, oldest first.
    ///
    /// The snapshot is the candidate pool for
    /// [build_presentation](crate::holder::build_presentation); its order
    /// fixes which credential is picked when several match.
    pub async fn credentials(&self) -> Result<Vec<SignedCredential>> {
        Ok(self
            .store
            .try_lock()?
            .iter()
            .map(|(_, token)| token.clone())
            .collect())
    }

    /// Stored tokens carrying the given credential type, oldest first.
    pub async fn credentials_of_type(
        &self,
        credential_type: &str,
        codec: &impl CredentialCodec,
    ) -> Result<Vec<SignedCredential>> {
        let mut matching = Vec::new();
        for token in self.credentials().await? {
            let credential = codec.parse(&token)?;
            if credential.types().iter().any(|t| t == credential_type) {
                matching.push(token);
            }
        }
        Ok(matching)
    }

    /// Remove and return the token filed under `id`.
    pub async fn remove(&self, id: Uuid) -> Result<SignedCredential> {
        let mut store = self.store.try_lock()?;
        match store.iter().position(|(stored, _)| *stored == id) {
            Some(index) => Ok(store.remove(index).1),
            None => bail!("credential not found"),
        }
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.try_lock()?.len())
    }
}
