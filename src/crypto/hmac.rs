//! HMAC-SHA256 (RFC 2104).

use zeroize::Zeroize;

use super::sha256::{Sha256, BLOCK_LEN, DIGEST_LEN};

const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5c;

/// Keyed HMAC-SHA256 context.
///
/// Both hash states are primed with the padded key at construction, so a
/// context can be cloned to MAC several messages under the same key.
#[derive(Clone)]
pub struct HmacSha256 {
    inner: Sha256,
    outer: Sha256,
}

impl HmacSha256 {
    pub fn new(key: &[u8]) -> Self {
        let mut block = [0u8; BLOCK_LEN];
        if key.len() > BLOCK_LEN {
            let digest = super::sha256::sha256(key);
            block[..DIGEST_LEN].copy_from_slice(&digest);
        } else {
            block[..key.len()].copy_from_slice(key);
        }

        let mut pad = [0u8; BLOCK_LEN];

        for (p, k) in pad.iter_mut().zip(block.iter()) {
            *p = k ^ IPAD;
        }
        let mut inner = Sha256::new();
        inner.update(&pad);

        for (p, k) in pad.iter_mut().zip(block.iter()) {
            *p = k ^ OPAD;
        }
        let mut outer = Sha256::new();
        outer.update(&pad);

        block.zeroize();
        pad.zeroize();

        HmacSha256 { inner, outer }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        let inner = self.inner.finalize();
        let mut outer = self.outer;
        outer.update(&inner);
        outer.finalize()
    }
}

/// One-shot HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut mac = HmacSha256::new(key);
    mac.update(data);
    mac.finalize()
}

/// Compare two byte strings without exiting early on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}
