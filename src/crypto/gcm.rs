//! AES-128-GCM (NIST SP 800-38D) with 96-bit nonces and 128-bit tags.

use zeroize::Zeroize;

use super::aes::{Aes128, BLOCK_LEN, KEY_LEN};
use super::hmac::constant_time_eq;
use crate::Error;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// AES-128-GCM keyed context.
pub struct Aes128Gcm {
    cipher: Aes128,
    h: [u8; BLOCK_LEN],
}

impl Aes128Gcm {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let cipher = Aes128::new(key);
        let mut h = [0u8; BLOCK_LEN];
        cipher.encrypt_block(&mut h);
        Aes128Gcm { cipher, h }
    }

    /// Encrypt `buf` in place and return the tag.
    pub fn seal_in_place(
        &self,
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buf: &mut [u8],
    ) -> [u8; TAG_LEN] {
        let j0 = initial_counter(nonce);
        self.ctr(&j0, buf);
        self.tag(&j0, aad, buf)
    }

    /// Verify `tag` and decrypt `buf` in place.
    ///
    /// The tag is checked before any decryption happens. On mismatch `buf`
    /// still holds the ciphertext and [`Error::BadRecordMac`] is returned.
    pub fn open_in_place(
        &self,
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        buf: &mut [u8],
        tag: &[u8],
    ) -> Result<(), Error> {
        let j0 = initial_counter(nonce);
        let expected = self.tag(&j0, aad, buf);

        if !constant_time_eq(&expected, tag) {
            return Err(Error::BadRecordMac);
        }

        self.ctr(&j0, buf);
        Ok(())
    }

    // CTR keystream starting at inc32(J0).
    fn ctr(&self, j0: &[u8; BLOCK_LEN], data: &mut [u8]) {
        let mut counter = *j0;
        for chunk in data.chunks_mut(BLOCK_LEN) {
            inc32(&mut counter);
            let mut keystream = counter;
            self.cipher.encrypt_block(&mut keystream);
            for (d, k) in chunk.iter_mut().zip(keystream.iter()) {
                *d ^= k;
            }
        }
    }

    fn tag(&self, j0: &[u8; BLOCK_LEN], aad: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
        let mut s = ghash(&self.h, aad, ciphertext);
        let mut ek = *j0;
        self.cipher.encrypt_block(&mut ek);
        for (t, k) in s.iter_mut().zip(ek.iter()) {
            *t ^= k;
        }
        s
    }
}

impl Drop for Aes128Gcm {
    fn drop(&mut self) {
        self.h.zeroize();
    }
}

fn initial_counter(nonce: &[u8; NONCE_LEN]) -> [u8; BLOCK_LEN] {
    let mut j0 = [0u8; BLOCK_LEN];
    j0[..NONCE_LEN].copy_from_slice(nonce);
    j0[15] = 1;
    j0
}

fn inc32(counter: &mut [u8; BLOCK_LEN]) {
    let c = u32::from_be_bytes([counter[12], counter[13], counter[14], counter[15]]);
    counter[12..].copy_from_slice(&c.wrapping_add(1).to_be_bytes());
}

// Bitwise multiply in GF(2^128) with the GCM bit order.
fn gf128_mul(x: &[u8; BLOCK_LEN], y: &[u8; BLOCK_LEN]) -> [u8; BLOCK_LEN] {
    let mut z = [0u8; BLOCK_LEN];
    let mut v = *y;

    for i in 0..128 {
        if (x[i / 8] >> (7 - i % 8)) & 1 == 1 {
            for (zj, vj) in z.iter_mut().zip(v.iter()) {
                *zj ^= vj;
            }
        }

        let lsb = v[15] & 1;
        for j in (1..BLOCK_LEN).rev() {
            v[j] = (v[j] >> 1) | (v[j - 1] << 7);
        }
        v[0] >>= 1;
        if lsb == 1 {
            v[0] ^= 0xe1;
        }
    }
    z
}

fn ghash(h: &[u8; BLOCK_LEN], aad: &[u8], ciphertext: &[u8]) -> [u8; BLOCK_LEN] {
    let mut y = [0u8; BLOCK_LEN];
    ghash_update(&mut y, h, aad);
    ghash_update(&mut y, h, ciphertext);

    let mut lengths = [0u8; BLOCK_LEN];
    lengths[..8].copy_from_slice(&((aad.len() as u64) * 8).to_be_bytes());
    lengths[8..].copy_from_slice(&((ciphertext.len() as u64) * 8).to_be_bytes());
    for (yj, lj) in y.iter_mut().zip(lengths.iter()) {
        *yj ^= lj;
    }
    gf128_mul(&y, h)
}

// Partial final blocks are implicitly zero padded.
fn ghash_update(y: &mut [u8; BLOCK_LEN], h: &[u8; BLOCK_LEN], data: &[u8]) {
    for chunk in data.chunks(BLOCK_LEN) {
        for (yj, dj) in y.iter_mut().zip(chunk.iter()) {
            *yj ^= dj;
        }
        *y = gf128_mul(y, h);
    }
}
