//! Wire headers for secure-channel chunks.
//!
//! Layout on the wire (all integers little-endian):
//!
//! ```text
//! [Message Header: 8 bytes]
//!   3 ASCII bytes message type (OPN / CLO / MSG)
//!   1 ASCII byte finality (C intermediate, F final, A abort)
//!   u32 total chunk length
//! [Security Header]
//!   asymmetric: policy URI, sender certificate, receiver thumbprint,
//!               each as an i32 length-prefixed byte string (-1 = absent)
//!   symmetric:  u32 channel id, u32 token id
//! [Sequence Header: 8 bytes]
//!   u32 sequence number, u32 request id
//! [Body, padding, signature per the active policy and mode]
//! ```
//!
//! Decoding validates structure only; identity and security checks happen
//! in the decoder against the channel state.

use bytes::{BufMut, BytesMut};

use crate::error::{ChannelError, Result};

/// Size of the message header in bytes.
pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Size of the symmetric security header in bytes.
pub const SYMMETRIC_SECURITY_HEADER_SIZE: usize = 8;

/// Size of the sequence header in bytes.
pub const SEQUENCE_HEADER_SIZE: usize = 8;

/// Message category carried in the message header.
///
/// Determines which security-header variant applies: channel-opening
/// messages use the asymmetric header, everything else the symmetric one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Secure-channel open request/response (asymmetric phase).
    OpenSecureChannel,
    /// Secure-channel close notification.
    CloseSecureChannel,
    /// Application message on an established channel (symmetric phase).
    SecureMessage,
}

impl MessageType {
    /// The 3-byte ASCII tag for this message type.
    pub fn tag(self) -> [u8; 3] {
        match self {
            MessageType::OpenSecureChannel => *b"OPN",
            MessageType::CloseSecureChannel => *b"CLO",
            MessageType::SecureMessage => *b"MSG",
        }
    }

    /// Parse a 3-byte tag.
    fn from_tag(tag: [u8; 3]) -> Result<Self> {
        match &tag {
            b"OPN" => Ok(MessageType::OpenSecureChannel),
            b"CLO" => Ok(MessageType::CloseSecureChannel),
            b"MSG" => Ok(MessageType::SecureMessage),
            _ => Err(ChannelError::MalformedChunk(format!(
                "unknown message type tag {tag:?}"
            ))),
        }
    }
}

/// Position of a chunk within its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFinality {
    /// More chunks of this message follow.
    Intermediate,
    /// Last chunk of the message.
    Final,
    /// The message is abandoned; the body carries a status code and reason.
    Abort,
}

impl ChunkFinality {
    /// The ASCII marker byte for this finality.
    pub fn marker(self) -> u8 {
        match self {
            ChunkFinality::Intermediate => b'C',
            ChunkFinality::Final => b'F',
            ChunkFinality::Abort => b'A',
        }
    }

    fn from_marker(marker: u8) -> Result<Self> {
        match marker {
            b'C' => Ok(ChunkFinality::Intermediate),
            b'F' => Ok(ChunkFinality::Final),
            b'A' => Ok(ChunkFinality::Abort),
            _ => Err(ChannelError::MalformedChunk(format!(
                "unknown finality marker {marker:#04x}"
            ))),
        }
    }
}

/// Bounds-checked little-endian reader over a chunk buffer.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes consumed so far.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ChannelError::MalformedChunk(format!(
                "truncated chunk: needed {len} bytes, {} remaining",
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_exact(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_exact(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an i32 length-prefixed byte string; -1 means absent.
    pub(crate) fn read_byte_string(&mut self) -> Result<Option<Vec<u8>>> {
        let len = self.read_i32()?;
        match len {
            -1 => Ok(None),
            len if len < 0 => Err(ChannelError::MalformedChunk(format!(
                "negative byte-string length {len}"
            ))),
            len => Ok(Some(self.read_exact(len as usize)?.to_vec())),
        }
    }
}

/// Write an i32 length-prefixed byte string; `None` encodes as -1.
pub(crate) fn put_byte_string(dst: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        None => dst.put_i32_le(-1),
        Some(bytes) => {
            dst.put_i32_le(bytes.len() as i32);
            dst.put_slice(bytes);
        }
    }
}

/// Encoded length of an i32 length-prefixed byte string.
pub(crate) fn byte_string_len(value: Option<&[u8]>) -> usize {
    4 + value.map_or(0, <[u8]>::len)
}

/// The fixed 8-byte message header leading every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message category.
    pub message_type: MessageType,
    /// Chunk position marker.
    pub finality: ChunkFinality,
    /// Total chunk length on the wire, header included.
    pub total_length: u32,
}

impl MessageHeader {
    /// Append the header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.message_type.tag());
        dst.put_u8(self.finality.marker());
        dst.put_u32_le(self.total_length);
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::MalformedChunk`] on truncation or unknown
    /// type/finality markers.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let tag = reader.read_exact(3)?;
        let message_type = MessageType::from_tag([tag[0], tag[1], tag[2]])?;
        let finality = ChunkFinality::from_marker(reader.read_u8()?)?;
        let total_length = reader.read_u32()?;
        Ok(Self {
            message_type,
            finality,
            total_length,
        })
    }
}

/// Security header for the asymmetric (handshake) phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricSecurityHeader {
    /// URI of the negotiated security policy.
    pub policy_uri: String,
    /// DER bytes of the sender's certificate; present when signing applies.
    pub sender_certificate: Option<Vec<u8>>,
    /// Thumbprint of the receiver's certificate; present when encryption
    /// applies.
    pub receiver_thumbprint: Option<Vec<u8>>,
}

impl AsymmetricSecurityHeader {
    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        byte_string_len(Some(self.policy_uri.as_bytes()))
            + byte_string_len(self.sender_certificate.as_deref())
            + byte_string_len(self.receiver_thumbprint.as_deref())
    }

    /// Append the header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        put_byte_string(dst, Some(self.policy_uri.as_bytes()));
        put_byte_string(dst, self.sender_certificate.as_deref());
        put_byte_string(dst, self.receiver_thumbprint.as_deref());
    }

    /// Parse the header from `bytes`, returning it and the bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::MalformedChunk`] on truncation, a negative
    /// length other than -1, or a non-UTF-8 policy URI.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut reader = Reader::new(bytes);
        let policy_uri = reader
            .read_byte_string()?
            .ok_or_else(|| ChannelError::MalformedChunk("missing policy URI".into()))?;
        let policy_uri = String::from_utf8(policy_uri)
            .map_err(|_| ChannelError::MalformedChunk("policy URI is not UTF-8".into()))?;
        let sender_certificate = reader.read_byte_string()?;
        let receiver_thumbprint = reader.read_byte_string()?;
        let consumed = reader.position();
        Ok((
            Self {
                policy_uri,
                sender_certificate,
                receiver_thumbprint,
            },
            consumed,
        ))
    }
}

/// Security header for the symmetric (session) phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricSecurityHeader {
    /// Id of the secure channel the chunk belongs to.
    pub channel_id: u32,
    /// Id of the security token whose keys secure the chunk.
    pub token_id: u32,
}

impl SymmetricSecurityHeader {
    /// Append the header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.channel_id);
        dst.put_u32_le(self.token_id);
    }

    /// Parse the header from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::MalformedChunk`] on truncation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        Ok(Self {
            channel_id: reader.read_u32()?,
            token_id: reader.read_u32()?,
        })
    }
}

/// Sequence header binding a chunk to its position in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    /// Per-direction monotonically increasing chunk counter.
    pub sequence_number: u32,
    /// Caller-supplied request id, constant across one message's chunks.
    pub request_id: u32,
}

impl SequenceHeader {
    /// Append the header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.sequence_number);
        dst.put_u32_le(self.request_id);
    }

    /// Parse the header from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::MalformedChunk`] on truncation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        Ok(Self {
            sequence_number: reader.read_u32()?,
            request_id: reader.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_header_roundtrip() {
        let header = MessageHeader {
            message_type: MessageType::SecureMessage,
            finality: ChunkFinality::Final,
            total_length: 0xDEAD_BEEF,
        };

        let mut wire = BytesMut::new();
        header.encode(&mut wire);
        assert_eq!(wire.len(), MESSAGE_HEADER_SIZE);
        assert_eq!(&wire[..4], b"MSGF");

        let parsed = MessageHeader::decode(&wire).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_message_header_rejects_unknown_tag() {
        let result = MessageHeader::decode(b"XXXF\x00\x00\x00\x00");
        assert!(matches!(result, Err(ChannelError::MalformedChunk(_))));
    }

    #[test]
    fn test_message_header_rejects_unknown_finality() {
        let result = MessageHeader::decode(b"MSGX\x00\x00\x00\x00");
        assert!(matches!(result, Err(ChannelError::MalformedChunk(_))));
    }

    #[test]
    fn test_message_header_rejects_truncation() {
        let result = MessageHeader::decode(b"MSGF\x00");
        assert!(matches!(result, Err(ChannelError::MalformedChunk(_))));
    }

    #[test]
    fn test_asymmetric_header_roundtrip() {
        let header = AsymmetricSecurityHeader {
            policy_uri: "https://ferrolink.rs/securitypolicy#Basic256".into(),
            sender_certificate: Some(vec![1, 2, 3, 4]),
            receiver_thumbprint: Some(vec![9; 20]),
        };

        let mut wire = BytesMut::new();
        header.encode(&mut wire);
        assert_eq!(wire.len(), header.encoded_len());

        let (parsed, consumed) = AsymmetricSecurityHeader::decode(&wire).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn test_asymmetric_header_absent_fields() {
        let header = AsymmetricSecurityHeader {
            policy_uri: "https://ferrolink.rs/securitypolicy#None".into(),
            sender_certificate: None,
            receiver_thumbprint: None,
        };

        let mut wire = BytesMut::new();
        header.encode(&mut wire);

        let (parsed, _) = AsymmetricSecurityHeader::decode(&wire).unwrap();
        assert_eq!(parsed.sender_certificate, None);
        assert_eq!(parsed.receiver_thumbprint, None);
    }

    #[test]
    fn test_asymmetric_header_rejects_oversized_length() {
        let mut wire = BytesMut::new();
        // Policy URI claims 100 bytes but only 2 follow.
        wire.put_i32_le(100);
        wire.put_slice(b"ab");
        let result = AsymmetricSecurityHeader::decode(&wire);
        assert!(matches!(result, Err(ChannelError::MalformedChunk(_))));
    }

    #[test]
    fn test_symmetric_header_roundtrip() {
        let header = SymmetricSecurityHeader {
            channel_id: 42,
            token_id: 7,
        };
        let mut wire = BytesMut::new();
        header.encode(&mut wire);
        assert_eq!(wire.len(), SYMMETRIC_SECURITY_HEADER_SIZE);
        assert_eq!(SymmetricSecurityHeader::decode(&wire).unwrap(), header);
    }

    #[test]
    fn test_sequence_header_roundtrip() {
        let header = SequenceHeader {
            sequence_number: u32::MAX,
            request_id: 1,
        };
        let mut wire = BytesMut::new();
        header.encode(&mut wire);
        assert_eq!(wire.len(), SEQUENCE_HEADER_SIZE);
        assert_eq!(SequenceHeader::decode(&wire).unwrap(), header);
    }
}
