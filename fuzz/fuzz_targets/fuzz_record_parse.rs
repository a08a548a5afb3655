#![no_main]

//! Fuzz target for TLS record and handshake message parsing.
//!
//! TLS 1.2 record format:
//! - ContentType: 1 byte (20-23 valid values)
//! - ProtocolVersion: 2 bytes (0x0303 for TLS 1.2)
//! - Length: 2 bytes
//! - Fragment: variable (up to 2^14 bytes for plaintext)

use libfuzzer_sys::fuzz_target;

use minitls::message::{Handshake, Record};
use minitls::CipherSuite;

/// TLS record header length
const HEADER_LEN: usize = 5;
/// Maximum TLS plaintext fragment size
const MAX_FRAGMENT_SIZE: usize = 16384;

fuzz_target!(|data: &[u8]| {
    // Input as-is
    let _ = Record::parse(data);
    let _ = Handshake::parse(data, None);
    let _ = Handshake::parse(data, Some(CipherSuite::RSA_AES128_GCM_SHA256));

    if !data.is_empty() {
        let frag_len = data.len().min(MAX_FRAGMENT_SIZE);

        let mut record = Vec::with_capacity(HEADER_LEN + frag_len);
        record.push(22u8); // ContentType::Handshake
        record.extend_from_slice(&[0x03, 0x03]);
        record.extend_from_slice(&(frag_len as u16).to_be_bytes());
        record.extend_from_slice(&data[..frag_len]);

        if let Ok((_, parsed)) = Record::parse(&record) {
            let _ = Handshake::parse(parsed.fragment, None);
        }
    }
});
