//! Verifying and reassembling secured chunks into messages.
//!
//! Decoding mirrors the encoder in reverse: for each chunk the framing and
//! security header are checked first, then the secured region is decrypted,
//! the signature verified, the padding stripped, and the sequence header
//! validated. Only then is the body appended to the reassembled message.
//! Any failure is terminal for the whole message.
//!
//! Security checks run before any ciphertext is touched: a chunk that names
//! the wrong policy, certificate, channel, or token is rejected without a
//! single decryption operation.

use bytes::{BufMut, Bytes, BytesMut};
use ferrolink_crypto::policy::{AsymmetricEncryption, AsymmetricSignature, SecurityPolicyRegistry};
use ferrolink_crypto::{symmetric, AsymmetricKeyPair, Certificate, DerivedKeys};

use crate::channel::SecureChannel;
use crate::error::{ChannelError, Result};
use crate::header::{
    AsymmetricSecurityHeader, ChunkFinality, MessageHeader, MessageType, Reader, SequenceHeader,
    SymmetricSecurityHeader, MESSAGE_HEADER_SIZE, SEQUENCE_HEADER_SIZE,
    SYMMETRIC_SECURITY_HEADER_SIZE,
};
use crate::limits::{within_limit, ChannelParameters};

/// A fully verified, reassembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Message type shared by every chunk.
    pub message_type: MessageType,
    /// Request id shared by every chunk.
    pub request_id: u32,
    /// The reassembled message body.
    pub message: Bytes,
}

enum Verifier<'a> {
    None,
    Asymmetric {
        certificate: &'a Certificate,
        algorithm: AsymmetricSignature,
    },
    Symmetric {
        algorithm: ferrolink_crypto::policy::SymmetricSignature,
        key: &'a [u8],
    },
}

impl Verifier<'_> {
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            Verifier::None => Ok(()),
            Verifier::Asymmetric {
                certificate,
                algorithm,
            } => Ok(certificate.verify(*algorithm, data, signature)?),
            Verifier::Symmetric { algorithm, key } => {
                Ok(symmetric::verify(*algorithm, key, data, signature)?)
            }
        }
    }
}

enum Decryptor<'a> {
    None,
    Asymmetric {
        keypair: &'a AsymmetricKeyPair,
        encryption: AsymmetricEncryption,
    },
    Symmetric {
        algorithm: ferrolink_crypto::policy::SymmetricEncryption,
        keys: &'a DerivedKeys,
    },
}

impl Decryptor<'_> {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Decryptor::None => Ok(ciphertext.to_vec()),
            Decryptor::Asymmetric {
                keypair,
                encryption,
            } => Ok(keypair.decrypt(*encryption, ciphertext)?),
            Decryptor::Symmetric { algorithm, keys } => Ok(symmetric::decrypt(
                *algorithm,
                keys.encryption_key(),
                keys.initialization_vector(),
                ciphertext,
            )?),
        }
    }
}

struct ChunkSecurity<'a> {
    signing: bool,
    encrypting: bool,
    signature_size: usize,
    extra_padding_byte: bool,
    verifier: Verifier<'a>,
    decryptor: Decryptor<'a>,
}

/// Verifies and reassembles incoming chunks per a channel's negotiated state.
#[derive(Debug, Clone)]
pub struct ChunkDecoder {
    parameters: ChannelParameters,
    registry: SecurityPolicyRegistry,
}

impl ChunkDecoder {
    /// Create a decoder bound to the negotiated channel parameters, accepting
    /// every supported security policy URI.
    pub fn new(parameters: ChannelParameters) -> Self {
        Self::with_registry(parameters, SecurityPolicyRegistry::default())
    }

    /// Create a decoder that only accepts policy URIs found in the given
    /// registry.
    pub fn with_registry(parameters: ChannelParameters, registry: SecurityPolicyRegistry) -> Self {
        Self {
            parameters,
            registry,
        }
    }

    /// The negotiated parameters this decoder enforces.
    pub fn parameters(&self) -> &ChannelParameters {
        &self.parameters
    }

    /// Decode a message secured with the channel's certificates.
    ///
    /// The security header of every chunk must name the negotiated policy,
    /// carry the peer's certificate when the mode signs, and carry the
    /// local certificate's thumbprint when the mode encrypts.
    ///
    /// # Errors
    ///
    /// Fails on any framing, limit, security, or sequencing violation. A
    /// chunk with the abort marker yields [`ChannelError::MessageAborted`].
    pub fn decode_asymmetric(
        &self,
        channel: &SecureChannel,
        chunks: &[Bytes],
    ) -> Result<DecodedMessage> {
        let policy = channel.security_policy();
        let mode = channel.security_mode();
        let signing = mode.is_signing_enabled();
        let encrypting = mode.is_encryption_enabled();

        let mut security = ChunkSecurity {
            signing,
            encrypting,
            signature_size: 0,
            extra_padding_byte: false,
            verifier: Verifier::None,
            decryptor: Decryptor::None,
        };
        if signing {
            let remote = channel.require_remote_certificate()?;
            security.signature_size = remote.key_size();
            security.verifier = Verifier::Asymmetric {
                certificate: remote,
                algorithm: policy.asymmetric_signature(),
            };
        }
        if encrypting {
            let keypair = channel.require_keypair()?;
            security.extra_padding_byte =
                policy.uses_extra_padding_byte(keypair.key_size());
            security.decryptor = Decryptor::Asymmetric {
                keypair,
                encryption: policy.asymmetric_encryption(),
            };
        }

        self.decode_chunks(channel, chunks, |chunk| {
            let (header, consumed) = AsymmetricSecurityHeader::decode(&chunk[MESSAGE_HEADER_SIZE..])?;
            self.check_asymmetric_header(channel, &header)?;
            Ok(consumed)
        }, &security)
    }

    /// Decode a message secured with one of the channel's security tokens.
    ///
    /// Chunks carrying the previous token id are accepted while that token
    /// is still within its lifetime.
    ///
    /// # Errors
    ///
    /// Fails on any framing, limit, security, or sequencing violation. A
    /// chunk with the abort marker yields [`ChannelError::MessageAborted`].
    pub fn decode_symmetric(
        &self,
        channel: &SecureChannel,
        chunks: &[Bytes],
    ) -> Result<DecodedMessage> {
        let policy = channel.security_policy();
        let mode = channel.security_mode();
        let signing = mode.is_signing_enabled();
        let encrypting = mode.is_encryption_enabled();

        // All chunks of one message must resolve to key material before any
        // of them is decrypted, so the token is looked up per chunk first.
        let first = chunks
            .first()
            .ok_or_else(|| ChannelError::MalformedChunk("empty chunk list".to_owned()))?;
        if first.len() < MESSAGE_HEADER_SIZE + SYMMETRIC_SECURITY_HEADER_SIZE {
            return Err(ChannelError::MalformedChunk(
                "chunk too short for symmetric security header".to_owned(),
            ));
        }
        let sec_header = SymmetricSecurityHeader::decode(&first[MESSAGE_HEADER_SIZE..])?;
        if sec_header.channel_id != channel.channel_id() {
            return Err(ChannelError::ChannelIdMismatch {
                expected: channel.channel_id(),
                actual: sec_header.channel_id,
            });
        }
        let token_keys = channel.token_keys(sec_header.token_id)?;
        let keys = channel.remote_keys(&token_keys);

        let block = policy.encryption_block_size();
        let security = ChunkSecurity {
            signing,
            encrypting,
            signature_size: if signing {
                policy.symmetric_signature_size()
            } else {
                0
            },
            extra_padding_byte: policy.uses_extra_padding_byte(block),
            verifier: if signing {
                Verifier::Symmetric {
                    algorithm: policy.symmetric_signature(),
                    key: keys.signing_key(),
                }
            } else {
                Verifier::None
            },
            decryptor: if encrypting {
                Decryptor::Symmetric {
                    algorithm: policy.symmetric_encryption(),
                    keys,
                }
            } else {
                Decryptor::None
            },
        };

        self.decode_chunks(channel, chunks, |chunk| {
            if chunk.len() < MESSAGE_HEADER_SIZE + SYMMETRIC_SECURITY_HEADER_SIZE {
                return Err(ChannelError::MalformedChunk(
                    "chunk too short for symmetric security header".to_owned(),
                ));
            }
            let header = SymmetricSecurityHeader::decode(&chunk[MESSAGE_HEADER_SIZE..])?;
            if header.channel_id != channel.channel_id() {
                return Err(ChannelError::ChannelIdMismatch {
                    expected: channel.channel_id(),
                    actual: header.channel_id,
                });
            }
            if header.token_id != sec_header.token_id {
                return Err(ChannelError::TokenMismatch {
                    token_id: header.token_id,
                });
            }
            Ok(SYMMETRIC_SECURITY_HEADER_SIZE)
        }, &security)
    }

    fn check_asymmetric_header(
        &self,
        channel: &SecureChannel,
        header: &AsymmetricSecurityHeader,
    ) -> Result<()> {
        let policy = channel.security_policy();
        let named = self.registry.lookup(&header.policy_uri).map_err(|_| {
            ChannelError::PolicyMismatch {
                expected: policy.uri().to_owned(),
                actual: header.policy_uri.clone(),
            }
        })?;
        if named != policy {
            return Err(ChannelError::PolicyMismatch {
                expected: policy.uri().to_owned(),
                actual: header.policy_uri.clone(),
            });
        }
        if channel.security_mode().is_signing_enabled() {
            let remote = channel.require_remote_certificate()?;
            match &header.sender_certificate {
                Some(der) if der.as_slice() == remote.der() => {}
                _ => return Err(ChannelError::CertificateMismatch),
            }
        }
        if channel.security_mode().is_encryption_enabled() {
            let local = channel
                .local_certificate()
                .ok_or(ChannelError::MissingKeyMaterial("local keypair"))?;
            match &header.receiver_thumbprint {
                Some(tp) if tp.as_slice() == local.thumbprint().as_bytes() => {}
                _ => return Err(ChannelError::ThumbprintMismatch),
            }
        }
        Ok(())
    }

    fn decode_chunks(
        &self,
        channel: &SecureChannel,
        chunks: &[Bytes],
        check_security_header: impl Fn(&[u8]) -> Result<usize>,
        security: &ChunkSecurity<'_>,
    ) -> Result<DecodedMessage> {
        if chunks.is_empty() {
            return Err(ChannelError::MalformedChunk("empty chunk list".to_owned()));
        }
        let max_count = self.parameters.receive_max_chunk_count();
        if !within_limit(max_count, chunks.len()) {
            return Err(ChannelError::TooManyChunks {
                max: max_count,
                required: chunks.len(),
            });
        }

        let mut message = BytesMut::new();
        let mut message_type = None;
        let mut request_id = None;

        for (index, chunk) in chunks.iter().enumerate() {
            let header = MessageHeader::decode(chunk)?;
            if header.total_length as usize != chunk.len() {
                return Err(ChannelError::LengthMismatch {
                    declared: header.total_length as usize,
                    actual: chunk.len(),
                });
            }
            let max_chunk = self.parameters.receive_max_chunk_size();
            if !within_limit(max_chunk, chunk.len()) {
                return Err(ChannelError::ChunkTooLarge {
                    max: max_chunk,
                    actual: chunk.len(),
                });
            }
            match message_type {
                None => message_type = Some(header.message_type),
                Some(expected) if expected == header.message_type => {}
                Some(_) => {
                    return Err(ChannelError::MalformedChunk(
                        "message type changed between chunks".to_owned(),
                    ))
                }
            }

            let security_header_size = check_security_header(chunk)?;
            let secured_offset = MESSAGE_HEADER_SIZE + security_header_size;

            let plain = security
                .decryptor
                .decrypt(&chunk[secured_offset..])
                .map(|plain| {
                    let mut buf = BytesMut::with_capacity(secured_offset + plain.len());
                    buf.put_slice(&chunk[..secured_offset]);
                    buf.put_slice(&plain);
                    buf
                })?;

            if plain.len() < secured_offset + SEQUENCE_HEADER_SIZE + security.signature_size {
                return Err(ChannelError::MalformedChunk(
                    "chunk too short for sequence header".to_owned(),
                ));
            }

            // Signature covers everything before it, length field included.
            let signed_end = plain.len() - security.signature_size;
            if security.signing {
                security
                    .verifier
                    .verify(&plain[..signed_end], &plain[signed_end..])?;
            }

            // The padding-size byte is attacker-controlled until this point;
            // a claim larger than the secured region must not underflow.
            let body_end = if security.encrypting {
                signed_end
                    .checked_sub(self.padding_length(&plain[..signed_end], security)?)
                    .ok_or_else(|| {
                        ChannelError::MalformedChunk("padding exceeds chunk body".to_owned())
                    })?
            } else {
                signed_end
            };

            let sequence_header = SequenceHeader::decode(&plain[secured_offset..])?;
            match request_id {
                None => request_id = Some(sequence_header.request_id),
                Some(expected) if expected == sequence_header.request_id => {}
                Some(expected) => {
                    return Err(ChannelError::RequestIdMismatch {
                        expected,
                        actual: sequence_header.request_id,
                    })
                }
            }
            channel.verify_receive_sequence(sequence_header.sequence_number)?;

            let body_start = secured_offset + SEQUENCE_HEADER_SIZE;
            if body_end < body_start {
                return Err(ChannelError::MalformedChunk(
                    "padding exceeds chunk body".to_owned(),
                ));
            }
            let body = &plain[body_start..body_end];

            if header.finality == ChunkFinality::Abort {
                return Err(parse_abort(body));
            }
            let is_last = index + 1 == chunks.len();
            let expected_finality = if is_last {
                ChunkFinality::Final
            } else {
                ChunkFinality::Intermediate
            };
            if header.finality != expected_finality {
                return Err(ChannelError::InvalidFinalChunk { index });
            }

            message.put_slice(body);
            let max_message = self.parameters.receive_max_message_size();
            if !within_limit(max_message, message.len()) {
                return Err(ChannelError::MessageTooLarge {
                    max: max_message,
                    actual: message.len(),
                });
            }
        }

        let message_type = message_type
            .ok_or_else(|| ChannelError::MalformedChunk("empty chunk list".to_owned()))?;
        let request_id = request_id
            .ok_or_else(|| ChannelError::MalformedChunk("empty chunk list".to_owned()))?;

        tracing::trace!(
            message_type = ?message_type,
            request_id,
            message_len = message.len(),
            chunks = chunks.len(),
            "decoded message"
        );

        Ok(DecodedMessage {
            message_type,
            request_id,
            message: message.freeze(),
        })
    }

    /// Recover the padding field length from the trailing bytes of the
    /// decrypted region, before the signature.
    ///
    /// The padding-size byte precedes the padding bytes, all of which carry
    /// the same low-byte value, so the byte just before the signature (or
    /// before the extra high-order byte) always reads back the low byte.
    fn padding_length(&self, plain_to_sig: &[u8], security: &ChunkSecurity<'_>) -> Result<usize> {
        let malformed =
            || ChannelError::MalformedChunk("chunk too short for padding".to_owned());
        if security.extra_padding_byte {
            let high = *plain_to_sig.last().ok_or_else(malformed)? as usize;
            let low = *plain_to_sig
                .get(plain_to_sig.len().checked_sub(2).ok_or_else(malformed)?)
                .ok_or_else(malformed)? as usize;
            Ok((high << 8 | low) + 2)
        } else {
            let low = *plain_to_sig.last().ok_or_else(malformed)? as usize;
            Ok(low + 1)
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new(ChannelParameters::default())
    }
}

fn parse_abort(body: &[u8]) -> ChannelError {
    let mut reader = Reader::new(body);
    let status = match reader.read_u32() {
        Ok(status) => status,
        Err(err) => return err,
    };
    let reason = match reader.read_byte_string() {
        Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(None) => String::new(),
        Err(err) => return err,
    };
    ChannelError::MessageAborted { status, reason }
}
