//! End-to-end chunk round-trips across the policy and mode matrix.

use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use proptest::prelude::*;

use ferrolink_channel::limits::DEFAULT_MAX_CHUNK_SIZE;
use ferrolink_channel::{
    ChannelError, ChannelParameters, ChannelRole, ChunkDecoder, ChunkEncoder, ErrorCondition,
    MessageSecurityMode, MessageType, SecureChannel,
};
use ferrolink_crypto::{AsymmetricKeyPair, SecurityPolicy};

fn client_keypair() -> &'static AsymmetricKeyPair {
    static KEYPAIR: OnceLock<AsymmetricKeyPair> = OnceLock::new();
    KEYPAIR.get_or_init(|| AsymmetricKeyPair::generate(2048).unwrap())
}

fn server_keypair() -> &'static AsymmetricKeyPair {
    static KEYPAIR: OnceLock<AsymmetricKeyPair> = OnceLock::new();
    KEYPAIR.get_or_init(|| AsymmetricKeyPair::generate(2048).unwrap())
}

/// A client/server channel pair sharing certificates and token keys.
fn connected_pair(
    policy: SecurityPolicy,
    mode: MessageSecurityMode,
) -> (SecureChannel, SecureChannel) {
    let mut client = SecureChannel::new(ChannelRole::Client, 99, policy, mode);
    let mut server = SecureChannel::new(ChannelRole::Server, 99, policy, mode);

    if !policy.is_none() {
        client.set_keypair(client_keypair().clone());
        server.set_keypair(server_keypair().clone());
        client
            .set_remote_certificate(server_keypair().certificate().clone())
            .unwrap();
        server
            .set_remote_certificate(client_keypair().certificate().clone())
            .unwrap();
    }

    let lifetime = Duration::from_secs(3600);
    client
        .renew_security_token(1, b"client-nonce", b"server-nonce", lifetime)
        .unwrap();
    server
        .renew_security_token(1, b"client-nonce", b"server-nonce", lifetime)
        .unwrap();

    (client, server)
}

fn codec() -> (ChunkEncoder, ChunkDecoder) {
    let parameters = ChannelParameters::default();
    (ChunkEncoder::new(parameters), ChunkDecoder::new(parameters))
}

fn roundtrip_symmetric(policy: SecurityPolicy, mode: MessageSecurityMode, size: usize) {
    let (client, server) = connected_pair(policy, mode);
    let (encoder, decoder) = codec();
    let message: Vec<u8> = (0..size).map(|i| i as u8).collect();

    let chunks = encoder
        .encode_symmetric(&client, MessageType::SecureMessage, &message, 17)
        .unwrap();
    for chunk in &chunks {
        assert!(chunk.len() <= encoder.parameters().send_max_chunk_size());
    }
    let decoded = decoder.decode_symmetric(&server, &chunks).unwrap();

    assert_eq!(decoded.message_type, MessageType::SecureMessage);
    assert_eq!(decoded.request_id, 17);
    assert_eq!(&decoded.message[..], &message[..]);
}

fn roundtrip_asymmetric(policy: SecurityPolicy, mode: MessageSecurityMode, size: usize) -> usize {
    let (client, server) = connected_pair(policy, mode);
    let (encoder, decoder) = codec();
    let message: Vec<u8> = (0..size).map(|i| (i * 7) as u8).collect();

    let chunks = encoder
        .encode_asymmetric(&client, MessageType::OpenSecureChannel, &message, 1)
        .unwrap();
    for chunk in &chunks {
        assert!(chunk.len() <= encoder.parameters().send_max_chunk_size());
    }
    let decoded = decoder.decode_asymmetric(&server, &chunks).unwrap();

    assert_eq!(decoded.message_type, MessageType::OpenSecureChannel);
    assert_eq!(decoded.request_id, 1);
    assert_eq!(&decoded.message[..], &message[..]);
    chunks.len()
}

#[test]
fn test_unsecured_small_message_single_chunk() {
    let (client, server) = connected_pair(SecurityPolicy::None, MessageSecurityMode::None);
    let (encoder, decoder) = codec();
    let message = vec![0x42; 128];

    let chunks = encoder
        .encode_symmetric(&client, MessageType::SecureMessage, &message, 1)
        .unwrap();
    assert_eq!(chunks.len(), 1);
    // Three 8-byte headers, no padding, no signature.
    assert_eq!(chunks[0].len(), 24 + 128);

    let decoded = decoder.decode_symmetric(&server, &chunks).unwrap();
    assert_eq!(&decoded.message[..], &message[..]);
}

#[test]
fn test_symmetric_matrix_sign() {
    for policy in SecurityPolicy::ALL {
        if policy.is_none() {
            continue;
        }
        for size in [0, 128, 4000, DEFAULT_MAX_CHUNK_SIZE] {
            roundtrip_symmetric(policy, MessageSecurityMode::Sign, size);
        }
    }
}

#[test]
fn test_symmetric_matrix_sign_and_encrypt() {
    for policy in SecurityPolicy::ALL {
        if policy.is_none() {
            continue;
        }
        for size in [0, 128, 4000, DEFAULT_MAX_CHUNK_SIZE] {
            roundtrip_symmetric(policy, MessageSecurityMode::SignAndEncrypt, size);
        }
    }
}

#[test]
fn test_asymmetric_matrix_sign() {
    for policy in SecurityPolicy::ALL {
        if policy.is_none() {
            continue;
        }
        assert_eq!(
            roundtrip_asymmetric(policy, MessageSecurityMode::Sign, 600),
            1
        );
        // A full-sized message spills into a second chunk once the
        // certificate-bearing security header and signature are accounted for.
        assert!(
            roundtrip_asymmetric(policy, MessageSecurityMode::Sign, DEFAULT_MAX_CHUNK_SIZE) > 1
        );
    }
}

#[test]
fn test_asymmetric_matrix_sign_and_encrypt() {
    for policy in SecurityPolicy::ALL {
        if policy.is_none() {
            continue;
        }
        // 600 bytes spans multiple RSA plaintext blocks within one chunk.
        assert_eq!(
            roundtrip_asymmetric(policy, MessageSecurityMode::SignAndEncrypt, 600),
            1
        );
        // A full-sized message cannot fit one chunk once blockwise ciphertext
        // expansion is accounted for.
        assert!(
            roundtrip_asymmetric(
                policy,
                MessageSecurityMode::SignAndEncrypt,
                DEFAULT_MAX_CHUNK_SIZE
            ) > 1
        );
    }
}

#[test]
fn test_max_message_chunk_count() {
    let (client, server) = connected_pair(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    );
    let (encoder, decoder) = codec();
    let max_message = encoder.parameters().send_max_message_size();
    let message = vec![0x33; max_message];

    let chunks = encoder
        .encode_symmetric(&client, MessageType::SecureMessage, &message, 5)
        .unwrap();

    // usable = 65536 - 16 = 65520 bytes, 4095 AES blocks; each chunk body is
    // 65520 - 8 (sequence) - 32 (signature) - 1 (padding size) = 65479 bytes.
    let max_body = 65479;
    assert_eq!(chunks.len(), max_message.div_ceil(max_body));

    let decoded = decoder.decode_symmetric(&server, &chunks).unwrap();
    assert_eq!(decoded.message.len(), max_message);
}

#[test]
fn test_max_message_roundtrip_all_policies() {
    for policy in SecurityPolicy::ALL {
        if policy.is_none() {
            continue;
        }
        let (client, server) = connected_pair(policy, MessageSecurityMode::SignAndEncrypt);
        let (encoder, decoder) = codec();
        let max_message = encoder.parameters().send_max_message_size();
        let message = vec![0x5C; max_message];

        let chunks = encoder
            .encode_symmetric(&client, MessageType::SecureMessage, &message, 5)
            .unwrap();
        let decoded = decoder.decode_symmetric(&server, &chunks).unwrap();
        assert_eq!(&decoded.message[..], &message[..]);
    }
}

#[test]
fn test_padding_block_boundaries() {
    // Body sizes straddling the AES block alignment, including the size at
    // which the padded region needs no padding bytes at all.
    for size in [7, 8, 23, 24, 64, 65, 1024, 1025] {
        roundtrip_symmetric(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
            size,
        );
    }
}

#[test]
fn test_tampered_ciphertext_rejected() {
    let (client, server) = connected_pair(
        SecurityPolicy::Aes128Sha256RsaOaep,
        MessageSecurityMode::SignAndEncrypt,
    );
    let (encoder, decoder) = codec();

    let chunks = encoder
        .encode_symmetric(&client, MessageType::SecureMessage, b"sensor reading", 1)
        .unwrap();
    let mut tampered = chunks[0].to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    let err = decoder
        .decode_symmetric(&server, &[Bytes::from(tampered)])
        .unwrap_err();
    assert_eq!(err.condition(), ErrorCondition::SecurityChecksFailed);
}

#[test]
fn test_tampered_signed_plaintext_rejected() {
    let (client, server) =
        connected_pair(SecurityPolicy::Basic256Sha256, MessageSecurityMode::Sign);
    let (encoder, decoder) = codec();

    let chunks = encoder
        .encode_symmetric(&client, MessageType::SecureMessage, b"sensor reading", 1)
        .unwrap();
    let mut tampered = chunks[0].to_vec();
    tampered[25] ^= 0x01;

    let err = decoder
        .decode_symmetric(&server, &[Bytes::from(tampered)])
        .unwrap_err();
    assert!(matches!(err, ChannelError::Crypto(_)));
}

#[test]
fn test_policy_mismatch_rejected_before_decryption() {
    let (client, _) = connected_pair(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    );
    let (encoder, decoder) = codec();

    let chunks = encoder
        .encode_asymmetric(&client, MessageType::OpenSecureChannel, b"open", 1)
        .unwrap();

    // A channel negotiated for a different policy must refuse the header
    // outright; no key material for the claimed policy is ever touched.
    let (_, wrong_server) = connected_pair(
        SecurityPolicy::Aes256Sha256RsaPss,
        MessageSecurityMode::SignAndEncrypt,
    );
    let err = decoder
        .decode_asymmetric(&wrong_server, &chunks)
        .unwrap_err();
    assert!(matches!(err, ChannelError::PolicyMismatch { .. }));
}

#[test]
fn test_unknown_token_rejected_before_decryption() {
    let (client, server) = connected_pair(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    );
    let (encoder, decoder) = codec();

    let chunks = encoder
        .encode_symmetric(&client, MessageType::SecureMessage, b"hello", 1)
        .unwrap();
    let mut tampered = chunks[0].to_vec();
    // Token id field sits at offset 12 within the symmetric security header.
    tampered[12..16].copy_from_slice(&9u32.to_le_bytes());

    let err = decoder
        .decode_symmetric(&server, &[Bytes::from(tampered)])
        .unwrap_err();
    assert!(matches!(err, ChannelError::TokenMismatch { token_id: 9 }));
}

#[test]
fn test_previous_token_accepted_after_renewal() {
    let (client, server) = connected_pair(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
    );
    let (encoder, decoder) = codec();

    // Chunks encoded under token 1 while it was current.
    let chunks = encoder
        .encode_symmetric(&client, MessageType::SecureMessage, b"in flight", 3)
        .unwrap();

    // The receiver rotates to token 2 before the chunks arrive.
    server
        .renew_security_token(2, b"fresh-client", b"fresh-server", Duration::from_secs(3600))
        .unwrap();

    let decoded = decoder.decode_symmetric(&server, &chunks).unwrap();
    assert_eq!(&decoded.message[..], b"in flight");
}

#[test]
fn test_consecutive_messages_share_sequence_stream() {
    let (client, server) = connected_pair(
        SecurityPolicy::Basic128Rsa15,
        MessageSecurityMode::Sign,
    );
    let (encoder, decoder) = codec();

    for request_id in 1..=3 {
        let chunks = encoder
            .encode_symmetric(&client, MessageType::SecureMessage, b"ping", request_id)
            .unwrap();
        let decoded = decoder.decode_symmetric(&server, &chunks).unwrap();
        assert_eq!(decoded.request_id, request_id);
    }
}

#[test]
fn test_chunk_count_overflow_yields_no_chunks() {
    let (client, _) = connected_pair(SecurityPolicy::None, MessageSecurityMode::None);
    let parameters = ChannelParameters::symmetric(0, 64, 2);
    let encoder = ChunkEncoder::new(parameters);

    let result = encoder.encode_symmetric(&client, MessageType::SecureMessage, &[0u8; 1000], 1);
    match result {
        Err(ChannelError::TooManyChunks { max: 2, required }) => assert!(required > 2),
        other => panic!("expected chunk-count overflow, got {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_symmetric_roundtrip_preserves_message(message in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let (client, server) = connected_pair(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
        );
        let (encoder, decoder) = codec();

        let chunks = encoder
            .encode_symmetric(&client, MessageType::SecureMessage, &message, 11)
            .unwrap();
        let decoded = decoder.decode_symmetric(&server, &chunks).unwrap();
        prop_assert_eq!(&decoded.message[..], &message[..]);
    }
}
