//! Splitting messages into secured chunks.
//!
//! The encoder cuts a message body into chunks that each fit the negotiated
//! chunk size, then secures every chunk independently: padding to the cipher
//! block size, signing, then encrypting. The total-length field is computed
//! for the final encrypted size and written before signing, so the signature
//! covers the length the receiver will actually observe.
//!
//! All size and count limits are checked before the first chunk is built;
//! encoding either yields the complete chunk list or nothing.

use bytes::{BufMut, Bytes, BytesMut};
use ferrolink_crypto::policy::{AsymmetricEncryption, AsymmetricSignature};
use ferrolink_crypto::{symmetric, AsymmetricKeyPair, Certificate, DerivedKeys};

use crate::channel::SecureChannel;
use crate::error::{ChannelError, Result};
use crate::header::{
    AsymmetricSecurityHeader, ChunkFinality, MessageHeader, MessageType, SequenceHeader,
    SymmetricSecurityHeader, MESSAGE_HEADER_SIZE, SEQUENCE_HEADER_SIZE,
};
use crate::limits::{within_limit, ChannelParameters, DEFAULT_MAX_CHUNK_SIZE};

/// How one chunk's signature is produced.
enum Signer<'a> {
    None,
    Asymmetric {
        keypair: &'a AsymmetricKeyPair,
        algorithm: AsymmetricSignature,
    },
    Symmetric {
        algorithm: ferrolink_crypto::policy::SymmetricSignature,
        key: &'a [u8],
    },
}

impl Signer<'_> {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Signer::None => Ok(Vec::new()),
            Signer::Asymmetric { keypair, algorithm } => Ok(keypair.sign(*algorithm, data)?),
            Signer::Symmetric { algorithm, key } => Ok(symmetric::sign(*algorithm, key, data)?),
        }
    }
}

/// How one chunk's post-header region is encrypted.
enum Encryptor<'a> {
    None,
    Asymmetric {
        certificate: &'a Certificate,
        encryption: AsymmetricEncryption,
    },
    Symmetric {
        algorithm: ferrolink_crypto::policy::SymmetricEncryption,
        keys: &'a DerivedKeys,
    },
}

impl Encryptor<'_> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Encryptor::None => Ok(plaintext.to_vec()),
            Encryptor::Asymmetric {
                certificate,
                encryption,
            } => Ok(certificate.encrypt(*encryption, plaintext)?),
            Encryptor::Symmetric { algorithm, keys } => Ok(symmetric::encrypt(
                *algorithm,
                keys.encryption_key(),
                keys.initialization_vector(),
                plaintext,
            )?),
        }
    }
}

/// Security parameters shared by every chunk of one message.
struct ChunkSecurity<'a> {
    signing: bool,
    encrypting: bool,
    signature_size: usize,
    /// Plaintext bytes per cipher block when encrypting.
    plain_block_size: usize,
    /// Ciphertext bytes per cipher block when encrypting.
    cipher_block_size: usize,
    /// Whether padding carries a second, high-order size byte.
    extra_padding_byte: bool,
    signer: Signer<'a>,
    encryptor: Encryptor<'a>,
}

impl ChunkSecurity<'_> {
    fn padding_overhead(&self) -> usize {
        if !self.encrypting {
            0
        } else if self.extra_padding_byte {
            2
        } else {
            1
        }
    }

    /// Largest message body one chunk can carry under `max_chunk_size` with
    /// the given security header length.
    fn max_body_size(&self, max_chunk_size: usize, security_header_size: usize) -> Result<usize> {
        let too_small = ChannelError::ChunkSizeTooSmall { max_chunk_size };
        let usable = max_chunk_size
            .checked_sub(MESSAGE_HEADER_SIZE + security_header_size)
            .ok_or(too_small)?;

        let max_body = if self.encrypting {
            let blocks = usable / self.cipher_block_size;
            (blocks * self.plain_block_size)
                .checked_sub(SEQUENCE_HEADER_SIZE + self.signature_size + self.padding_overhead())
        } else {
            usable.checked_sub(SEQUENCE_HEADER_SIZE + self.signature_size)
        };

        match max_body {
            Some(n) if n > 0 => Ok(n),
            _ => Err(ChannelError::ChunkSizeTooSmall { max_chunk_size }),
        }
    }
}

/// Splits and secures outgoing messages per a channel's negotiated state.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    parameters: ChannelParameters,
}

impl ChunkEncoder {
    /// Create an encoder bound to the negotiated channel parameters.
    pub fn new(parameters: ChannelParameters) -> Self {
        Self { parameters }
    }

    /// The negotiated parameters this encoder enforces.
    pub fn parameters(&self) -> &ChannelParameters {
        &self.parameters
    }

    /// Encode a message secured with the channel's certificates.
    ///
    /// Used for channel-establishment traffic, before any security token
    /// exists. When the mode signs, the local keypair signs each chunk and
    /// the security header carries the local certificate; when it encrypts,
    /// each chunk is encrypted to the peer certificate and the header
    /// carries the peer's thumbprint.
    ///
    /// # Errors
    ///
    /// Fails if the message exceeds the negotiated size or chunk-count
    /// limits, if required key material is missing, or if a cryptographic
    /// operation fails. No chunks are produced on failure.
    pub fn encode_asymmetric(
        &self,
        channel: &SecureChannel,
        message_type: MessageType,
        message: &[u8],
        request_id: u32,
    ) -> Result<Vec<Bytes>> {
        let policy = channel.security_policy();
        let mode = channel.security_mode();
        let signing = mode.is_signing_enabled();
        let encrypting = mode.is_encryption_enabled();

        let mut security = ChunkSecurity {
            signing,
            encrypting,
            signature_size: 0,
            plain_block_size: 1,
            cipher_block_size: 1,
            extra_padding_byte: false,
            signer: Signer::None,
            encryptor: Encryptor::None,
        };

        if signing {
            let keypair = channel.require_keypair()?;
            security.signature_size = keypair.key_size();
            security.signer = Signer::Asymmetric {
                keypair,
                algorithm: policy.asymmetric_signature(),
            };
        }
        if encrypting {
            let remote = channel.require_remote_certificate()?;
            let encryption = policy.asymmetric_encryption();
            security.cipher_block_size = remote.key_size();
            security.plain_block_size = remote.plain_block_size(encryption);
            security.extra_padding_byte =
                policy.uses_extra_padding_byte(security.cipher_block_size);
            security.encryptor = Encryptor::Asymmetric {
                certificate: remote,
                encryption,
            };
        }

        let header = AsymmetricSecurityHeader {
            policy_uri: policy.uri().to_owned(),
            sender_certificate: if signing {
                channel
                    .local_certificate()
                    .map(|cert| cert.der().to_vec())
            } else {
                None
            },
            receiver_thumbprint: if encrypting {
                channel
                    .remote_certificate()
                    .map(|cert| cert.thumbprint().as_bytes().to_vec())
            } else {
                None
            },
        };

        self.encode_chunks(channel, message_type, message, request_id, &security, |dst| {
            header.encode(dst);
        })
    }

    /// Encode a message secured with the channel's current security token.
    ///
    /// # Errors
    ///
    /// Fails if no token has been issued, if the message exceeds the
    /// negotiated limits, or if a cryptographic operation fails. No chunks
    /// are produced on failure.
    pub fn encode_symmetric(
        &self,
        channel: &SecureChannel,
        message_type: MessageType,
        message: &[u8],
        request_id: u32,
    ) -> Result<Vec<Bytes>> {
        let policy = channel.security_policy();
        let mode = channel.security_mode();
        let token_keys = channel.current_token_keys()?;
        let keys = channel.local_keys(&token_keys);

        let signing = mode.is_signing_enabled();
        let encrypting = mode.is_encryption_enabled();
        let block = policy.encryption_block_size();

        let security = ChunkSecurity {
            signing,
            encrypting,
            signature_size: if signing {
                policy.symmetric_signature_size()
            } else {
                0
            },
            plain_block_size: block,
            cipher_block_size: block,
            extra_padding_byte: policy.uses_extra_padding_byte(block),
            signer: if signing {
                Signer::Symmetric {
                    algorithm: policy.symmetric_signature(),
                    key: keys.signing_key(),
                }
            } else {
                Signer::None
            },
            encryptor: if encrypting {
                Encryptor::Symmetric {
                    algorithm: policy.symmetric_encryption(),
                    keys,
                }
            } else {
                Encryptor::None
            },
        };

        let header = SymmetricSecurityHeader {
            channel_id: channel.channel_id(),
            token_id: token_keys.token.token_id,
        };

        self.encode_chunks(channel, message_type, message, request_id, &security, |dst| {
            header.encode(dst);
        })
    }

    fn encode_chunks(
        &self,
        channel: &SecureChannel,
        message_type: MessageType,
        message: &[u8],
        request_id: u32,
        security: &ChunkSecurity<'_>,
        write_security_header: impl Fn(&mut BytesMut),
    ) -> Result<Vec<Bytes>> {
        // Measure the security header once; it repeats verbatim per chunk.
        let mut probe = BytesMut::new();
        write_security_header(&mut probe);
        let security_header_size = probe.len();

        let max_message = self.parameters.send_max_message_size();
        if !within_limit(max_message, message.len()) {
            return Err(ChannelError::MessageTooLarge {
                max: max_message,
                actual: message.len(),
            });
        }

        // An unbounded chunk size still needs a finite slicing width.
        let max_chunk = match self.parameters.send_max_chunk_size() {
            0 => DEFAULT_MAX_CHUNK_SIZE,
            n => n,
        };
        // The wire length field is a u32, so no chunk may exceed it.
        if max_chunk > u32::MAX as usize {
            return Err(ChannelError::ChunkTooLarge {
                max: u32::MAX as usize,
                actual: max_chunk,
            });
        }
        let max_body = security.max_body_size(max_chunk, security_header_size)?;
        let required = message.len().div_ceil(max_body).max(1);
        let max_count = self.parameters.send_max_chunk_count();
        if !within_limit(max_count, required) {
            return Err(ChannelError::TooManyChunks {
                max: max_count,
                required,
            });
        }

        tracing::trace!(
            message_type = ?message_type,
            request_id,
            message_len = message.len(),
            chunks = required,
            "encoding message"
        );

        let mut chunks = Vec::with_capacity(required);
        for index in 0..required {
            let start = index * max_body;
            let end = usize::min(start + max_body, message.len());
            let finality = if index + 1 == required {
                ChunkFinality::Final
            } else {
                ChunkFinality::Intermediate
            };

            let chunk = self.encode_chunk(
                message_type,
                finality,
                &message[start..end],
                SequenceHeader {
                    sequence_number: channel.next_send_sequence(),
                    request_id,
                },
                security,
                security_header_size,
                &write_security_header,
            )?;
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_chunk(
        &self,
        message_type: MessageType,
        finality: ChunkFinality,
        body: &[u8],
        sequence_header: SequenceHeader,
        security: &ChunkSecurity<'_>,
        security_header_size: usize,
        write_security_header: &impl Fn(&mut BytesMut),
    ) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        MessageHeader {
            message_type,
            finality,
            total_length: 0,
        }
        .encode(&mut buf);
        write_security_header(&mut buf);
        sequence_header.encode(&mut buf);
        buf.put_slice(body);

        if security.encrypting {
            let overhead = security.padding_overhead();
            let unpadded = SEQUENCE_HEADER_SIZE + body.len() + security.signature_size;
            let block = security.plain_block_size;
            let padding = (block - (unpadded + overhead) % block) % block;

            buf.put_u8(padding as u8);
            buf.put_bytes(padding as u8, padding);
            if security.extra_padding_byte {
                buf.put_u8((padding >> 8) as u8);
            }
        }

        // The length field covers the chunk as transmitted, so it accounts
        // for ciphertext expansion and must be in place before signing.
        let plaintext_len =
            buf.len() - MESSAGE_HEADER_SIZE - security_header_size + security.signature_size;
        let total_length = if security.encrypting {
            let blocks = plaintext_len / security.plain_block_size;
            MESSAGE_HEADER_SIZE + security_header_size + blocks * security.cipher_block_size
        } else {
            MESSAGE_HEADER_SIZE + security_header_size + plaintext_len
        };
        // Bounded by the chunk size, which encode_chunks caps at u32::MAX.
        buf[4..8].copy_from_slice(&(total_length as u32).to_le_bytes());

        if security.signing {
            let signature = security.signer.sign(&buf)?;
            buf.put_slice(&signature);
        }

        if security.encrypting {
            let secured_offset = MESSAGE_HEADER_SIZE + security_header_size;
            let ciphertext = security.encryptor.encrypt(&buf[secured_offset..])?;
            buf.truncate(secured_offset);
            buf.put_slice(&ciphertext);
        }

        debug_assert_eq!(buf.len(), total_length);
        Ok(buf.freeze())
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new(ChannelParameters::default())
    }
}
