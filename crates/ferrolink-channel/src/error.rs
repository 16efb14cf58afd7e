//! Error types for secure-channel operations.

use thiserror::Error;

/// Protocol-level condition a [`ChannelError`] is surfaced as.
///
/// The transport layer maps these onto its status codes when tearing down or
/// faulting a channel; the chunk engine itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCondition {
    /// Malformed or inconsistent framing.
    MalformedMessage,
    /// A negotiated size or count limit was exceeded.
    MessageTooLarge,
    /// Certificate, thumbprint, token, signature, or decryption failure.
    SecurityChecksFailed,
    /// Non-contiguous or replayed sequence number.
    InvalidSequenceNumber,
    /// The peer aborted the message mid-stream.
    MessageAborted,
    /// No identity validator accepted the token.
    IdentityInvalid,
}

/// Errors that can occur while encoding or decoding secure-channel chunks.
///
/// All variants are terminal for the current call: no chunk is partially
/// trusted and nothing is silently corrected. Channel-level recovery is the
/// caller's responsibility.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] ferrolink_crypto::CryptoError),

    /// Declared chunk length does not match the received byte count.
    #[error("Declared chunk length {declared} does not match actual length {actual}")]
    LengthMismatch {
        /// Length claimed by the message header.
        declared: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// A header could not be parsed.
    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    /// A chunk other than the last carried the final marker, or the last
    /// chunk did not.
    #[error("Invalid final-chunk marker placement at chunk {index}")]
    InvalidFinalChunk {
        /// Index of the offending chunk.
        index: usize,
    },

    /// The security header referenced a different policy than negotiated.
    #[error("Security policy mismatch: expected {expected}, got {actual}")]
    PolicyMismatch {
        /// URI of the channel's negotiated policy.
        expected: String,
        /// URI carried by the chunk.
        actual: String,
    },

    /// The sender certificate does not match the channel's peer.
    #[error("Sender certificate does not match channel peer")]
    CertificateMismatch,

    /// The receiver thumbprint does not match the local certificate.
    #[error("Receiver certificate thumbprint mismatch")]
    ThumbprintMismatch,

    /// The chunk referenced a different secure channel.
    #[error("Channel id mismatch: expected {expected}, got {actual}")]
    ChannelIdMismatch {
        /// The local channel id.
        expected: u32,
        /// The id carried by the chunk.
        actual: u32,
    },

    /// The security token id matches neither the current nor the still-valid
    /// previous token.
    #[error("Unknown or expired security token {token_id}")]
    TokenMismatch {
        /// The token id carried by the chunk.
        token_id: u32,
    },

    /// No security token has been issued on this channel yet.
    #[error("No active security token")]
    NoSecurityToken,

    /// The channel is missing key material the operation requires.
    #[error("Missing key material: {0}")]
    MissingKeyMaterial(&'static str),

    /// Sequence number is not the expected next value.
    #[error("Sequence number mismatch: expected {expected}, got {actual}")]
    SequenceNumberMismatch {
        /// The expected next sequence number.
        expected: u32,
        /// The received sequence number.
        actual: u32,
    },

    /// Chunks of one message carried differing request ids.
    #[error("Request id mismatch: expected {expected}, got {actual}")]
    RequestIdMismatch {
        /// Request id of the first chunk.
        expected: u32,
        /// Request id of the offending chunk.
        actual: u32,
    },

    /// Message exceeds the negotiated maximum message size.
    #[error("Message too large: max {max} bytes, got {actual}")]
    MessageTooLarge {
        /// Negotiated maximum.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// Chunk exceeds the negotiated maximum chunk size.
    #[error("Chunk too large: max {max} bytes, got {actual}")]
    ChunkTooLarge {
        /// Negotiated maximum.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// Message requires more chunks than the negotiated maximum.
    #[error("Too many chunks: max {max}, required {required}")]
    TooManyChunks {
        /// Negotiated maximum.
        max: usize,
        /// Chunks the message would need.
        required: usize,
    },

    /// The negotiated chunk size cannot fit the chunk headers.
    #[error("Negotiated max chunk size {max_chunk_size} cannot fit chunk headers")]
    ChunkSizeTooSmall {
        /// The negotiated maximum chunk size.
        max_chunk_size: usize,
    },

    /// The peer aborted the in-progress message.
    #[error("Message aborted by peer: status {status:#010x}, {reason}")]
    MessageAborted {
        /// Status code carried by the abort chunk.
        status: u32,
        /// Human-readable reason carried by the abort chunk.
        reason: String,
    },

    /// No identity validator accepted the token.
    #[error("Identity token invalid")]
    InvalidIdentity,
}

impl ChannelError {
    /// The protocol-level condition this error is surfaced as.
    pub fn condition(&self) -> ErrorCondition {
        match self {
            ChannelError::Crypto(_)
            | ChannelError::PolicyMismatch { .. }
            | ChannelError::CertificateMismatch
            | ChannelError::ThumbprintMismatch
            | ChannelError::ChannelIdMismatch { .. }
            | ChannelError::TokenMismatch { .. }
            | ChannelError::NoSecurityToken
            | ChannelError::MissingKeyMaterial(_) => ErrorCondition::SecurityChecksFailed,
            ChannelError::LengthMismatch { .. }
            | ChannelError::MalformedChunk(_)
            | ChannelError::InvalidFinalChunk { .. } => ErrorCondition::MalformedMessage,
            ChannelError::SequenceNumberMismatch { .. }
            | ChannelError::RequestIdMismatch { .. } => ErrorCondition::InvalidSequenceNumber,
            ChannelError::MessageTooLarge { .. }
            | ChannelError::ChunkTooLarge { .. }
            | ChannelError::TooManyChunks { .. }
            | ChannelError::ChunkSizeTooSmall { .. } => ErrorCondition::MessageTooLarge,
            ChannelError::MessageAborted { .. } => ErrorCondition::MessageAborted,
            ChannelError::InvalidIdentity => ErrorCondition::IdentityInvalid,
        }
    }
}

/// Result type for secure-channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
