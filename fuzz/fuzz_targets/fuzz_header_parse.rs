//! Fuzz target for chunk header parsing.
//!
//! Tests that message and security header decoding handles arbitrary
//! input safely.

#![no_main]

use bytes::BytesMut;
use ferrolink_channel::header::{AsymmetricSecurityHeader, MessageHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Should succeed or fail gracefully - never panic
    if let Ok(header) = MessageHeader::decode(data) {
        let mut encoded = BytesMut::new();
        header.encode(&mut encoded);
        assert_eq!(&encoded[..], &data[..8]);
    }

    if let Ok((header, consumed)) = AsymmetricSecurityHeader::decode(data) {
        assert!(consumed <= data.len());
        assert_eq!(header.encoded_len(), consumed);

        let mut encoded = BytesMut::new();
        header.encode(&mut encoded);
        assert_eq!(&encoded[..], &data[..consumed]);
    }
});
