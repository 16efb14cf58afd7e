//! # ferrolink-channel
//!
//! Secure-conversation chunk engine for the Ferrolink M2M protocol.
//!
//! Messages of arbitrary length are split into size-bounded chunks, each
//! framed, optionally signed, and optionally encrypted according to the
//! channel's negotiated [`SecurityPolicy`](ferrolink_crypto::SecurityPolicy)
//! and [`MessageSecurityMode`]. The decoder runs the inverse path: validate
//! framing and security headers, decrypt, verify, strip padding, and
//! reassemble, rejecting anything out of sequence or over the negotiated
//! limits.
//!
//! The [`SecureChannel`] holds per-connection state: certificates for the
//! channel-establishment phase, rotating symmetric security tokens for the
//! session phase, and the send/receive sequence counters. [`ChunkEncoder`]
//! and [`ChunkDecoder`] are stateless apart from the negotiated
//! [`ChannelParameters`] and may be shared freely.
//!
//! Transport, handshake negotiation, and the application type system are
//! external collaborators; this crate begins and ends at chunk bytes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod header;
pub mod limits;
pub mod sequence;
pub mod validator;

pub use channel::{ChannelRole, MessageSecurityMode, SecureChannel, SecurityToken, TokenKeys};
pub use decoder::{ChunkDecoder, DecodedMessage};
pub use encoder::ChunkEncoder;
pub use error::{ChannelError, ErrorCondition, Result};
pub use header::{ChunkFinality, MessageType};
pub use limits::ChannelParameters;
pub use validator::{
    CompositeValidator, IdentityToken, IdentityValidator, TokenSignature, ValidatedIdentity,
};
