//! Record protection for the two supported suites.
//!
//! CBC suites use MAC-then-encrypt (RFC 5246 section 6.2.3.2) with a fresh
//! random IV per record. GCM suites use a 4-byte implicit IV from the key
//! block and an 8-byte explicit nonce carried on the wire (RFC 5288).

use rand::RngCore;
use zeroize::Zeroize;

use super::aes::{Aes128, BLOCK_LEN, KEY_LEN};
use super::gcm::{Aes128Gcm, NONCE_LEN, TAG_LEN};
use super::hmac::{constant_time_eq, HmacSha256};
use super::sha256::DIGEST_LEN;
use crate::message::{CipherSuite, ContentType, ProtocolVersion};
use crate::Error;

/// Explicit nonce length for GCM records.
pub const EXPLICIT_NONCE_LEN: usize = 8;

/// Implicit (fixed) IV length for GCM records.
pub const FIXED_IV_LEN: usize = 4;

/// Overhead per GCM record (explicit nonce + tag).
pub const GCM_OVERHEAD: usize = EXPLICIT_NONCE_LEN + TAG_LEN; // 24

/// HMAC-SHA256 output appended to CBC plaintext.
pub const MAC_LEN: usize = DIGEST_LEN;

/// Smallest valid CBC fragment: IV plus the blocks holding MAC and padding
/// of an empty plaintext.
pub const CBC_MIN_FRAGMENT: usize = BLOCK_LEN + 3 * BLOCK_LEN;

/// Fixed IV portion for GCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv(pub [u8; FIXED_IV_LEN]);

/// Full GCM nonce (fixed IV + explicit nonce).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    pub fn new(iv: Iv, explicit_nonce: &[u8; EXPLICIT_NONCE_LEN]) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..FIXED_IV_LEN].copy_from_slice(&iv.0);
        nonce[FIXED_IV_LEN..].copy_from_slice(explicit_nonce);
        Self(nonce)
    }
}

/// Data authenticated alongside a record: seq(8) type(1) version(2) length(2).
///
/// Serves as the GCM additional data and as the CBC MAC prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aad(pub [u8; 13]);

impl Aad {
    pub fn new(
        sequence: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        length: u16,
    ) -> Self {
        let mut aad = [0u8; 13];
        aad[..8].copy_from_slice(&sequence.to_be_bytes());
        aad[8] = content_type.as_u8();
        aad[9..11].copy_from_slice(&version.as_u16().to_be_bytes());
        aad[11..].copy_from_slice(&length.to_be_bytes());
        Aad(aad)
    }
}

/// Keys sliced out of the key block for one connection.
///
/// For GCM suites the MAC keys are unused and only the first
/// [`FIXED_IV_LEN`] bytes of each IV are populated.
pub struct KeyMaterial {
    client_mac_key: [u8; MAC_LEN],
    server_mac_key: [u8; MAC_LEN],
    client_key: [u8; KEY_LEN],
    server_key: [u8; KEY_LEN],
    client_iv: [u8; BLOCK_LEN],
    server_iv: [u8; BLOCK_LEN],
}

impl KeyMaterial {
    /// Split `key_block` in the order RFC 5246 section 6.3 lays it out.
    pub fn from_key_block(suite: CipherSuite, key_block: &[u8]) -> Result<Self, Error> {
        if !suite.is_supported() || key_block.len() < suite.key_block_len() {
            return Err(Error::CryptoError(format!(
                "key block of {} bytes too short for {:?}",
                key_block.len(),
                suite
            )));
        }

        let mut km = KeyMaterial {
            client_mac_key: [0; MAC_LEN],
            server_mac_key: [0; MAC_LEN],
            client_key: [0; KEY_LEN],
            server_key: [0; KEY_LEN],
            client_iv: [0; BLOCK_LEN],
            server_iv: [0; BLOCK_LEN],
        };

        let mac_len = if suite.is_aead() { 0 } else { MAC_LEN };
        let iv_len = if suite.is_aead() {
            FIXED_IV_LEN
        } else {
            BLOCK_LEN
        };

        let mut rest = key_block;
        let mut take = |n: usize| {
            let (head, tail) = rest.split_at(n);
            rest = tail;
            head
        };

        km.client_mac_key[..mac_len].copy_from_slice(take(mac_len));
        km.server_mac_key[..mac_len].copy_from_slice(take(mac_len));
        km.client_key.copy_from_slice(take(KEY_LEN));
        km.server_key.copy_from_slice(take(KEY_LEN));
        km.client_iv[..iv_len].copy_from_slice(take(iv_len));
        km.server_iv[..iv_len].copy_from_slice(take(iv_len));

        Ok(km)
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.client_mac_key.zeroize();
        self.server_mac_key.zeroize();
        self.client_key.zeroize();
        self.server_key.zeroize();
        self.client_iv.zeroize();
        self.server_iv.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial")
    }
}

/// Which side of the connection a [`RecordCipher`] protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Records written by the client.
    ClientWrite,
    /// Records written by the server.
    ServerWrite,
}

/// One direction's record protection state.
pub enum RecordCipher {
    Cbc { cipher: Aes128, mac_key: [u8; MAC_LEN] },
    Gcm { cipher: Aes128Gcm, iv: Iv },
}

impl RecordCipher {
    pub fn new(suite: CipherSuite, keys: &KeyMaterial, direction: Direction) -> Self {
        let (mac_key, key, iv) = match direction {
            Direction::ClientWrite => (&keys.client_mac_key, &keys.client_key, &keys.client_iv),
            Direction::ServerWrite => (&keys.server_mac_key, &keys.server_key, &keys.server_iv),
        };

        if suite.is_aead() {
            let mut fixed = [0u8; FIXED_IV_LEN];
            fixed.copy_from_slice(&iv[..FIXED_IV_LEN]);
            RecordCipher::Gcm {
                cipher: Aes128Gcm::new(key),
                iv: Iv(fixed),
            }
        } else {
            RecordCipher::Cbc {
                cipher: Aes128::new(key),
                mac_key: *mac_key,
            }
        }
    }

    /// Protect `plaintext` and append the resulting fragment to `output`.
    pub fn seal<R: RngCore>(
        &self,
        sequence: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
        rng: &mut R,
        output: &mut Vec<u8>,
    ) -> Result<(), Error> {
        let aad = Aad::new(sequence, content_type, version, plaintext.len() as u16);

        match self {
            RecordCipher::Gcm { cipher, iv } => {
                let explicit_nonce = sequence.to_be_bytes();
                let nonce = Nonce::new(*iv, &explicit_nonce);

                output.extend_from_slice(&explicit_nonce);
                let start = output.len();
                output.extend_from_slice(plaintext);
                let tag = cipher.seal_in_place(&nonce.0, &aad.0, &mut output[start..]);
                output.extend_from_slice(&tag);
            }
            RecordCipher::Cbc { cipher, mac_key } => {
                let mut iv = [0u8; BLOCK_LEN];
                rng.fill_bytes(&mut iv);

                let mut mac = HmacSha256::new(mac_key);
                mac.update(&aad.0);
                mac.update(plaintext);
                let mac = mac.finalize();

                // p + 1 bytes of value p, bringing the total to a block multiple.
                let unpadded = plaintext.len() + MAC_LEN;
                let pad = (BLOCK_LEN - 1 - unpadded % BLOCK_LEN) as u8;

                output.extend_from_slice(&iv);
                let start = output.len();
                output.extend_from_slice(plaintext);
                output.extend_from_slice(&mac);
                output.extend(std::iter::repeat(pad).take(pad as usize + 1));
                cipher.cbc_encrypt(&iv, &mut output[start..])?;
            }
        }

        Ok(())
    }

    /// Remove protection from `fragment`, returning the plaintext.
    ///
    /// `verify_mac` only affects CBC. GCM tags are always checked.
    pub fn open(
        &self,
        sequence: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        fragment: &[u8],
        verify_mac: bool,
    ) -> Result<Vec<u8>, Error> {
        match self {
            RecordCipher::Gcm { cipher, iv } => {
                if fragment.len() < GCM_OVERHEAD {
                    return Err(Error::BadRecordMac);
                }
                let (explicit_nonce, rest) = fragment.split_at(EXPLICIT_NONCE_LEN);
                let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

                let mut explicit = [0u8; EXPLICIT_NONCE_LEN];
                explicit.copy_from_slice(explicit_nonce);
                let nonce = Nonce::new(*iv, &explicit);
                let aad = Aad::new(sequence, content_type, version, ciphertext.len() as u16);

                let mut plaintext = ciphertext.to_vec();
                cipher.open_in_place(&nonce.0, &aad.0, &mut plaintext, tag)?;
                Ok(plaintext)
            }
            RecordCipher::Cbc { cipher, mac_key } => {
                if fragment.len() < CBC_MIN_FRAGMENT || fragment.len() % BLOCK_LEN != 0 {
                    return Err(Error::BadRecordMac);
                }
                let mut iv = [0u8; BLOCK_LEN];
                iv.copy_from_slice(&fragment[..BLOCK_LEN]);

                let mut data = fragment[BLOCK_LEN..].to_vec();
                cipher.cbc_decrypt(&iv, &mut data)?;

                match strip_padding_and_mac(
                    &mut data,
                    mac_key,
                    sequence,
                    content_type,
                    version,
                    verify_mac,
                ) {
                    Ok(()) => Ok(data),
                    Err(e) => {
                        data.zeroize();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Bytes added to a plaintext of `len` bytes by [`RecordCipher::seal`].
    pub fn overhead(&self, len: usize) -> usize {
        match self {
            RecordCipher::Gcm { .. } => GCM_OVERHEAD,
            RecordCipher::Cbc { .. } => {
                let unpadded = len + MAC_LEN;
                let padded = (unpadded / BLOCK_LEN + 1) * BLOCK_LEN;
                BLOCK_LEN + padded - len
            }
        }
    }
}

fn strip_padding_and_mac(
    data: &mut Vec<u8>,
    mac_key: &[u8; MAC_LEN],
    sequence: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    verify_mac: bool,
) -> Result<(), Error> {
    let pad = *data.last().ok_or(Error::BadRecordMac)? as usize;
    if pad + 1 + MAC_LEN > data.len() {
        return Err(Error::BadRecordMac);
    }

    let pad_start = data.len() - pad - 1;
    if data[pad_start..].iter().any(|b| *b as usize != pad) {
        return Err(Error::BadRecordMac);
    }

    let mac_start = pad_start - MAC_LEN;
    if verify_mac {
        let aad = Aad::new(sequence, content_type, version, mac_start as u16);
        let mut mac = HmacSha256::new(mac_key);
        mac.update(&aad.0);
        mac.update(&data[..mac_start]);
        let expected = mac.finalize();

        if !constant_time_eq(&expected, &data[mac_start..pad_start]) {
            return Err(Error::BadRecordMac);
        }
    }

    data.truncate(mac_start);
    Ok(())
}

impl Drop for RecordCipher {
    fn drop(&mut self) {
        if let RecordCipher::Cbc { mac_key, .. } = self {
            mac_key.zeroize();
        }
    }
}

impl std::fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordCipher::Cbc { .. } => write!(f, "RecordCipher::Cbc"),
            RecordCipher::Gcm { .. } => write!(f, "RecordCipher::Gcm"),
        }
    }
}
