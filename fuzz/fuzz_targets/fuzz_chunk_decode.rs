//! Fuzz target for chunk decoding.
//!
//! Tests that the decode path handles arbitrary chunk bytes safely on an
//! unsecured channel.

#![no_main]

use std::time::Duration;

use bytes::Bytes;
use ferrolink_channel::{
    ChannelParameters, ChannelRole, ChunkDecoder, ChunkEncoder, MessageSecurityMode, MessageType,
    SecureChannel,
};
use ferrolink_crypto::SecurityPolicy;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let channel = SecureChannel::new(
        ChannelRole::Server,
        1,
        SecurityPolicy::None,
        MessageSecurityMode::None,
    );
    channel
        .renew_security_token(1, b"c", b"s", Duration::from_secs(60))
        .unwrap();
    let decoder = ChunkDecoder::default();

    // Arbitrary bytes as a single chunk - should succeed or fail
    // gracefully, never panic
    let _ = decoder.decode_symmetric(&channel, &[Bytes::copy_from_slice(data)]);

    // A well-formed encode of the same bytes must decode back
    let sender = SecureChannel::new(
        ChannelRole::Client,
        1,
        SecurityPolicy::None,
        MessageSecurityMode::None,
    );
    sender
        .renew_security_token(1, b"c", b"s", Duration::from_secs(60))
        .unwrap();
    let encoder = ChunkEncoder::new(ChannelParameters::symmetric(0, 4096, 0));

    let receiver = SecureChannel::new(
        ChannelRole::Server,
        1,
        SecurityPolicy::None,
        MessageSecurityMode::None,
    );
    receiver
        .renew_security_token(1, b"c", b"s", Duration::from_secs(60))
        .unwrap();

    let chunks = encoder
        .encode_symmetric(&sender, MessageType::SecureMessage, data, 1)
        .unwrap();
    let decoded = ChunkDecoder::default()
        .decode_symmetric(&receiver, &chunks)
        .unwrap();
    assert_eq!(&decoded.message[..], data);
});
