//! # ferrolink-crypto
//!
//! Security-policy suites and cryptographic primitives for the Ferrolink
//! secure-conversation layer.
//!
//! This crate provides:
//! - **SecurityPolicy**: the closed set of negotiable crypto suites, from
//!   `None` (identity transform) up to `Aes256Sha256RsaPss`
//! - **Asymmetric primitives**: RSA signing and block-wise encryption for
//!   the handshake phase, plus certificate/thumbprint handling
//! - **Symmetric primitives**: AES-CBC and HMAC for the session phase
//! - **Key derivation**: HMAC-based PRF expansion of handshake nonces into
//!   per-direction signing key, encryption key, and initialization vector
//!
//! ## Security
//!
//! Derived key material uses `zeroize` for cleanup on drop, and all
//! signature comparisons on the symmetric path are constant-time via
//! `subtle`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asymmetric;
pub mod error;
pub mod keys;
pub mod policy;
pub mod symmetric;

pub use asymmetric::{AsymmetricKeyPair, Certificate, Thumbprint};
pub use error::{CryptoError, Result};
pub use keys::DerivedKeys;
pub use policy::{SecurityPolicy, SecurityPolicyRegistry};
