//! Cryptographic primitives used by the TLS engine.
//!
//! Everything here is implemented in this crate on top of [`crate::bignum`].
//! Tests cross-check each primitive against an independent implementation.

mod aes;
mod gcm;
mod hmac;
pub mod prf;
mod record_cipher;
pub(crate) mod rsa;
mod sha256;

pub use aes::Aes128;
pub use gcm::Aes128Gcm;
pub use hmac::{constant_time_eq, hmac_sha256, HmacSha256};
pub use record_cipher::{Direction, KeyMaterial, RecordCipher};
pub use rsa::RsaPublicKey;
pub use sha256::{sha256, Sha256};
