//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key generation failed.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (invalid ciphertext or key).
    #[error("Decryption failed: invalid ciphertext or key")]
    Decryption,

    /// Signature verification failed.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// Signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Invalid key length.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes.
        expected: usize,
        /// Actual key length in bytes.
        actual: usize,
    },

    /// Asymmetric key size outside the policy's permitted range.
    #[error("Key size {bits} bits outside permitted range {min}..={max}")]
    KeySizeOutOfRange {
        /// Actual key size in bits.
        bits: usize,
        /// Minimum permitted size in bits.
        min: usize,
        /// Maximum permitted size in bits.
        max: usize,
    },

    /// Data length is not a multiple of the cipher block size.
    #[error("Data length {length} is not a multiple of block size {block_size}")]
    BlockAlignment {
        /// Actual data length.
        length: usize,
        /// Required block size.
        block_size: usize,
    },

    /// Certificate could not be parsed.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// No security policy registered under the given identifier.
    #[error("Unknown security policy: {0}")]
    UnknownPolicy(String),

    /// The operation is not available under the active security policy.
    #[error("Operation not supported by policy: {0}")]
    UnsupportedByPolicy(&'static str),
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
