//! RSA public-key operations with PKCS#1 v1.5 padding.

use rand::RngCore;

use crate::bignum::{BigUint, MAX_BITS};
use crate::Error;

/// Minimum padding overhead for PKCS#1 v1.5 encryption.
const PKCS1_OVERHEAD: usize = 11;

/// `DigestInfo` DER prefix for SHA-256 (RFC 8017 section 9.2).
const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];

/// Server RSA public key.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    n: BigUint,
    e: BigUint,
    bits: usize,
}

impl RsaPublicKey {
    /// Build a key from big-endian modulus and exponent bytes.
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Result<Self, Error> {
        let n = BigUint::from_bytes(modulus)?;
        let e = BigUint::from_bytes(exponent)?;

        if n.is_zero() {
            return Err(Error::CertificateError("RSA modulus is zero".into()));
        }
        if e.is_zero() || e >= n {
            return Err(Error::CertificateError(format!(
                "RSA exponent out of range ({} bits)",
                e.bit_len()
            )));
        }

        let bits = n.bit_len();
        debug_assert!(bits <= MAX_BITS);

        Ok(RsaPublicKey { n, e, bits })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    pub fn exponent(&self) -> &BigUint {
        &self.e
    }

    /// Bit length of the modulus.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Modulus length in bytes, which is also the ciphertext length.
    pub fn byte_len(&self) -> usize {
        self.bits.div_ceil(8)
    }

    /// PKCS#1 v1.5 type 2 encryption.
    ///
    /// Output is exactly [`byte_len`](Self::byte_len) bytes.
    pub fn encrypt<R: RngCore>(&self, message: &[u8], rng: &mut R) -> Result<Vec<u8>, Error> {
        let k = self.byte_len();
        let padded = pkcs1_pad(message, k, rng)?;

        let m = BigUint::from_bytes(&padded)?;
        let c = m.mod_pow(&self.e, &self.n)?;
        Ok(c.to_bytes(k)?)
    }

    /// Verify a PKCS#1 v1.5 SHA-256 signature over `digest`.
    ///
    /// Every malformation yields `false`.
    pub fn verify_pkcs1_sha256(&self, digest: &[u8], signature: &[u8]) -> bool {
        let k = self.byte_len();
        if signature.len() != k || digest.len() != 32 {
            return false;
        }

        let Ok(s) = BigUint::from_bytes(signature) else {
            return false;
        };
        if s >= self.n {
            return false;
        }
        let Ok(em) = s.mod_pow(&self.e, &self.n).and_then(|m| m.to_bytes(k)) else {
            return false;
        };

        // 00 01 FF.. 00 DigestInfo digest
        let ps_len = k
            .checked_sub(3 + SHA256_DIGEST_INFO.len() + digest.len())
            .unwrap_or(0);
        if ps_len < 8 {
            return false;
        }

        let (header, rest) = em.split_at(2);
        let (ps, rest) = rest.split_at(ps_len);
        let (sep, rest) = rest.split_at(1);
        let (info, hash) = rest.split_at(SHA256_DIGEST_INFO.len());

        header == [0x00, 0x01]
            && ps.iter().all(|&b| b == 0xff)
            && sep == [0x00]
            && info == SHA256_DIGEST_INFO
            && hash == digest
    }
}

impl std::fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("bits", &self.bits)
            .field("e", &self.e)
            .finish()
    }
}

/// PKCS#1 v1.5 encryption padding: `00 02 PS 00 message`.
///
/// `PS` is `target_len - message.len() - 3` non-zero random bytes.
pub fn pkcs1_pad<R: RngCore>(
    message: &[u8],
    target_len: usize,
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    if target_len < PKCS1_OVERHEAD || message.len() > target_len - PKCS1_OVERHEAD {
        return Err(Error::CryptoError(format!(
            "Message of {} bytes too long for {} byte RSA block",
            message.len(),
            target_len
        )));
    }

    let ps_len = target_len - message.len() - 3;
    let mut out = Vec::with_capacity(target_len);
    out.push(0x00);
    out.push(0x02);

    let mut byte = [0u8; 1];
    for _ in 0..ps_len {
        loop {
            rng.fill_bytes(&mut byte);
            if byte[0] != 0 {
                break;
            }
        }
        out.push(byte[0]);
    }

    out.push(0x00);
    out.extend_from_slice(message);
    Ok(out)
}
