//! Per-connection secure-channel state.
//!
//! A [`SecureChannel`] owns everything the chunk engine needs for one
//! connection: the negotiated policy and security mode, certificate and key
//! material for the asymmetric phase, derived symmetric key sets for the
//! session phase, and the two independent sequence counters.
//!
//! Token rotation publishes the new key set atomically: the token state is
//! replaced in one write under a lock, so a concurrent decode observes
//! either the old state or the new one, never a torn mix. The previous
//! token stays decode-valid until it expires, covering chunks that were in
//! flight when the renewal completed.

use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use ferrolink_crypto::keys::derive_keys;
use ferrolink_crypto::{AsymmetricKeyPair, Certificate, DerivedKeys, SecurityPolicy};

use crate::error::{ChannelError, Result};
use crate::sequence::{next_sequence, SequenceCounter};

/// Per-message security level layered on top of the negotiated policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSecurityMode {
    /// No signing, no encryption.
    None,
    /// Chunks are signed but not encrypted.
    Sign,
    /// Chunks are signed and encrypted.
    SignAndEncrypt,
}

impl MessageSecurityMode {
    /// Whether chunks carry a signature under this mode.
    pub fn is_signing_enabled(self) -> bool {
        !matches!(self, MessageSecurityMode::None)
    }

    /// Whether chunks are encrypted under this mode.
    pub fn is_encryption_enabled(self) -> bool {
        matches!(self, MessageSecurityMode::SignAndEncrypt)
    }
}

impl std::fmt::Display for MessageSecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageSecurityMode::None => "None",
            MessageSecurityMode::Sign => "Sign",
            MessageSecurityMode::SignAndEncrypt => "SignAndEncrypt",
        };
        f.write_str(name)
    }
}

/// Which end of the connection this channel represents.
///
/// The role decides which derived key set is "local" (secures our output)
/// and which is "remote" (checks the peer's output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Connection initiator.
    Client,
    /// Connection responder.
    Server,
}

/// Identity and lifetime of one symmetric key set.
#[derive(Debug, Clone, Copy)]
pub struct SecurityToken {
    /// Token id carried in symmetric security headers.
    pub token_id: u32,
    /// When the token was issued.
    pub issued_at: Instant,
    /// How long the token remains valid.
    pub lifetime: Duration,
}

impl SecurityToken {
    /// Whether the token's lifetime has elapsed.
    pub fn is_expired(&self) -> bool {
        self.issued_at.elapsed() > self.lifetime
    }
}

/// A security token together with both directions' derived keys.
#[derive(Debug, Clone)]
pub struct TokenKeys {
    /// The token identifying this key set.
    pub token: SecurityToken,
    /// Keys securing client-to-server traffic.
    pub client_keys: DerivedKeys,
    /// Keys securing server-to-client traffic.
    pub server_keys: DerivedKeys,
}

#[derive(Debug, Default)]
struct TokenState {
    current: Option<TokenKeys>,
    previous: Option<TokenKeys>,
}

#[derive(Debug, Default)]
struct ReceiveState {
    last_sequence: Option<u32>,
}

/// State shared by the encoder and decoder for one connection lifetime.
#[derive(Debug)]
pub struct SecureChannel {
    role: ChannelRole,
    channel_id: u32,
    policy: SecurityPolicy,
    mode: MessageSecurityMode,
    keypair: Option<AsymmetricKeyPair>,
    remote_certificate: Option<Certificate>,
    tokens: RwLock<TokenState>,
    send_sequence: SequenceCounter,
    receive: Mutex<ReceiveState>,
}

impl SecureChannel {
    /// Create a channel with no key material attached yet.
    ///
    /// Certificates and keys are attached with [`set_keypair`]
    /// (Self::set_keypair) and [`set_remote_certificate`]
    /// (Self::set_remote_certificate) once the handshake resolves them.
    pub fn new(
        role: ChannelRole,
        channel_id: u32,
        policy: SecurityPolicy,
        mode: MessageSecurityMode,
    ) -> Self {
        Self {
            role,
            channel_id,
            policy,
            mode,
            keypair: None,
            remote_certificate: None,
            tokens: RwLock::new(TokenState::default()),
            send_sequence: SequenceCounter::default(),
            receive: Mutex::new(ReceiveState::default()),
        }
    }

    /// This channel's role.
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// The channel id carried in symmetric security headers.
    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// The negotiated security policy.
    pub fn security_policy(&self) -> SecurityPolicy {
        self.policy
    }

    /// The negotiated message security mode.
    pub fn security_mode(&self) -> MessageSecurityMode {
        self.mode
    }

    /// Attach the local keypair and certificate.
    pub fn set_keypair(&mut self, keypair: AsymmetricKeyPair) {
        self.keypair = Some(keypair);
    }

    /// Attach the peer's certificate, validating its key size against the
    /// negotiated policy.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the key size is outside the policy range.
    pub fn set_remote_certificate(&mut self, certificate: Certificate) -> Result<()> {
        certificate.validate_key_size(self.policy)?;
        self.remote_certificate = Some(certificate);
        Ok(())
    }

    /// The local keypair, if attached.
    pub fn keypair(&self) -> Option<&AsymmetricKeyPair> {
        self.keypair.as_ref()
    }

    /// The local certificate, if a keypair is attached.
    pub fn local_certificate(&self) -> Option<&Certificate> {
        self.keypair.as_ref().map(AsymmetricKeyPair::certificate)
    }

    /// The peer's certificate, if attached.
    pub fn remote_certificate(&self) -> Option<&Certificate> {
        self.remote_certificate.as_ref()
    }

    pub(crate) fn require_keypair(&self) -> Result<&AsymmetricKeyPair> {
        self.keypair
            .as_ref()
            .ok_or(ChannelError::MissingKeyMaterial("local keypair"))
    }

    pub(crate) fn require_remote_certificate(&self) -> Result<&Certificate> {
        self.remote_certificate
            .as_ref()
            .ok_or(ChannelError::MissingKeyMaterial("remote certificate"))
    }

    /// Install a new security token, deriving both directions' key sets
    /// from the handshake nonces.
    ///
    /// The outgoing state switches to the new token immediately; the
    /// previous token remains valid for decoding in-flight chunks until it
    /// expires.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if key derivation fails.
    pub fn renew_security_token(
        &self,
        token_id: u32,
        client_nonce: &[u8],
        server_nonce: &[u8],
        lifetime: Duration,
    ) -> Result<()> {
        let client_keys = derive_keys(self.policy, server_nonce, client_nonce)?;
        let server_keys = derive_keys(self.policy, client_nonce, server_nonce)?;
        let token_keys = TokenKeys {
            token: SecurityToken {
                token_id,
                issued_at: Instant::now(),
                lifetime,
            },
            client_keys,
            server_keys,
        };

        let mut state = self.tokens.write().expect("token lock poisoned");
        state.previous = state.current.take();
        state.current = Some(token_keys);
        Ok(())
    }

    /// The key set for new outgoing chunks.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NoSecurityToken`] before the first renewal.
    pub fn current_token_keys(&self) -> Result<TokenKeys> {
        let state = self.tokens.read().expect("token lock poisoned");
        state
            .current
            .clone()
            .ok_or(ChannelError::NoSecurityToken)
    }

    /// Resolve a token id from an incoming chunk to its key set.
    ///
    /// Accepts the current token, or the previous one while it is still
    /// within its lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NoSecurityToken`] before the first renewal
    /// and [`ChannelError::TokenMismatch`] for any other id.
    pub fn token_keys(&self, token_id: u32) -> Result<TokenKeys> {
        let state = self.tokens.read().expect("token lock poisoned");
        let current = state.current.as_ref().ok_or(ChannelError::NoSecurityToken)?;

        if current.token.token_id == token_id {
            return Ok(current.clone());
        }
        if let Some(previous) = &state.previous {
            if previous.token.token_id == token_id && !previous.token.is_expired() {
                return Ok(previous.clone());
            }
        }
        Err(ChannelError::TokenMismatch { token_id })
    }

    /// Keys securing chunks this channel sends.
    pub fn local_keys<'a>(&self, keys: &'a TokenKeys) -> &'a DerivedKeys {
        match self.role {
            ChannelRole::Client => &keys.client_keys,
            ChannelRole::Server => &keys.server_keys,
        }
    }

    /// Keys securing chunks this channel receives.
    pub fn remote_keys<'a>(&self, keys: &'a TokenKeys) -> &'a DerivedKeys {
        match self.role {
            ChannelRole::Client => &keys.server_keys,
            ChannelRole::Server => &keys.client_keys,
        }
    }

    /// Take the next send-direction sequence number.
    pub fn next_send_sequence(&self) -> u32 {
        self.send_sequence.next()
    }

    /// Validate an incoming sequence number against the receive counter.
    ///
    /// The first chunk ever received initializes the counter; every later
    /// chunk must be the wrap-aware successor of the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SequenceNumberMismatch`] on any gap, repeat,
    /// or reordering.
    pub fn verify_receive_sequence(&self, actual: u32) -> Result<()> {
        let mut state = self.receive.lock().expect("receive lock poisoned");
        if let Some(last) = state.last_sequence {
            let expected = next_sequence(last);
            if actual != expected {
                return Err(ChannelError::SequenceNumberMismatch { expected, actual });
            }
        }
        state.last_sequence = Some(actual);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(policy: SecurityPolicy) -> SecureChannel {
        SecureChannel::new(
            ChannelRole::Client,
            1,
            policy,
            MessageSecurityMode::SignAndEncrypt,
        )
    }

    #[test]
    fn test_no_token_before_renewal() {
        let channel = channel(SecurityPolicy::Basic256Sha256);
        assert!(matches!(
            channel.current_token_keys(),
            Err(ChannelError::NoSecurityToken)
        ));
        assert!(matches!(
            channel.token_keys(1),
            Err(ChannelError::NoSecurityToken)
        ));
    }

    #[test]
    fn test_renewal_keeps_previous_token_valid() {
        let channel = channel(SecurityPolicy::Basic256Sha256);
        let lifetime = Duration::from_secs(3600);

        channel
            .renew_security_token(1, b"client-1", b"server-1", lifetime)
            .unwrap();
        channel
            .renew_security_token(2, b"client-2", b"server-2", lifetime)
            .unwrap();

        // New encodes use token 2; in-flight decodes may still use token 1.
        assert_eq!(channel.current_token_keys().unwrap().token.token_id, 2);
        assert_eq!(channel.token_keys(1).unwrap().token.token_id, 1);
        assert_eq!(channel.token_keys(2).unwrap().token.token_id, 2);
    }

    #[test]
    fn test_expired_previous_token_rejected() {
        let channel = channel(SecurityPolicy::Basic256Sha256);

        channel
            .renew_security_token(1, b"a", b"b", Duration::ZERO)
            .unwrap();
        channel
            .renew_security_token(2, b"c", b"d", Duration::from_secs(3600))
            .unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            channel.token_keys(1),
            Err(ChannelError::TokenMismatch { token_id: 1 })
        ));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let channel = channel(SecurityPolicy::Basic256Sha256);
        channel
            .renew_security_token(1, b"a", b"b", Duration::from_secs(3600))
            .unwrap();
        assert!(matches!(
            channel.token_keys(9),
            Err(ChannelError::TokenMismatch { token_id: 9 })
        ));
    }

    #[test]
    fn test_role_selects_key_direction() {
        let client = SecureChannel::new(
            ChannelRole::Client,
            1,
            SecurityPolicy::Basic256,
            MessageSecurityMode::SignAndEncrypt,
        );
        let server = SecureChannel::new(
            ChannelRole::Server,
            1,
            SecurityPolicy::Basic256,
            MessageSecurityMode::SignAndEncrypt,
        );
        let lifetime = Duration::from_secs(60);
        client.renew_security_token(1, b"cn", b"sn", lifetime).unwrap();
        server.renew_security_token(1, b"cn", b"sn", lifetime).unwrap();

        let ck = client.current_token_keys().unwrap();
        let sk = server.current_token_keys().unwrap();

        // What the client signs with, the server verifies with.
        assert_eq!(
            client.local_keys(&ck).signing_key(),
            server.remote_keys(&sk).signing_key()
        );
        assert_eq!(
            server.local_keys(&sk).encryption_key(),
            client.remote_keys(&ck).encryption_key()
        );
    }

    #[test]
    fn test_receive_sequence_validation() {
        let channel = channel(SecurityPolicy::None);

        // First chunk initializes the counter at any value.
        channel.verify_receive_sequence(5).unwrap();
        channel.verify_receive_sequence(6).unwrap();

        let result = channel.verify_receive_sequence(8);
        assert!(matches!(
            result,
            Err(ChannelError::SequenceNumberMismatch {
                expected: 7,
                actual: 8
            })
        ));
    }

    #[test]
    fn test_receive_sequence_wraps() {
        let channel = channel(SecurityPolicy::None);
        channel.verify_receive_sequence(u32::MAX).unwrap();
        channel.verify_receive_sequence(1).unwrap();
        channel.verify_receive_sequence(2).unwrap();
    }

    #[test]
    fn test_replayed_sequence_rejected() {
        let channel = channel(SecurityPolicy::None);
        channel.verify_receive_sequence(1).unwrap();
        assert!(channel.verify_receive_sequence(1).is_err());
    }
}
