//! Identity-token validation chain.
//!
//! Session activation presents an identity token plus a proof-of-possession
//! signature. Deployments accept several credential kinds at once, so
//! validation runs through an ordered chain: the first validator to accept
//! the token wins, intermediate failures are logged and skipped, and only
//! the last failure propagates to the caller.

use bytes::Bytes;

use crate::error::{ChannelError, Result};

/// An identity token presented during session activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToken {
    /// Id of the endpoint token policy this token was issued under.
    pub policy_id: String,
    /// Opaque token payload, interpreted by individual validators.
    pub data: Bytes,
}

/// Signature proving possession of the token's credentials.
///
/// Both fields are absent for token kinds that carry no signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSignature {
    /// URI of the signature algorithm.
    pub algorithm: Option<String>,
    /// The signature bytes.
    pub signature: Option<Bytes>,
}

/// The identity a validator resolved a token to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    /// Name of the authenticated principal.
    pub principal: String,
}

/// A single strategy for validating one kind of identity token.
pub trait IdentityValidator: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Validate a token and its proof-of-possession signature.
    ///
    /// # Errors
    ///
    /// Returns an error if this validator does not accept the token; a
    /// surrounding chain may still accept it with a later validator.
    fn validate(
        &self,
        token: &IdentityToken,
        signature: &TokenSignature,
    ) -> Result<ValidatedIdentity>;
}

/// An ordered chain of validators, itself usable as a validator.
///
/// Validators are tried in order; the first success wins. A failure from
/// any validator but the last is logged at debug and the next one is
/// tried; the last validator's failure propagates unchanged.
pub struct CompositeValidator {
    validators: Vec<Box<dyn IdentityValidator>>,
}

impl CompositeValidator {
    /// Build a chain from an ordered validator list.
    pub fn new(validators: Vec<Box<dyn IdentityValidator>>) -> Self {
        Self { validators }
    }
}

impl IdentityValidator for CompositeValidator {
    fn name(&self) -> &str {
        "composite"
    }

    fn validate(
        &self,
        token: &IdentityToken,
        signature: &TokenSignature,
    ) -> Result<ValidatedIdentity> {
        let last = self.validators.len().checked_sub(1);
        for (index, validator) in self.validators.iter().enumerate() {
            match validator.validate(token, signature) {
                Ok(identity) => return Ok(identity),
                Err(err) if Some(index) != last => {
                    tracing::debug!(
                        validator = validator.name(),
                        error = %err,
                        "identity validator failed, trying next"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Err(ChannelError::InvalidIdentity)
    }
}

impl std::fmt::Debug for CompositeValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeValidator")
            .field("validators", &self.validators.len())
            .finish()
    }
}
