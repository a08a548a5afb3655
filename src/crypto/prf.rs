use tinyvec::ArrayVec;

use super::hmac::HmacSha256;
use crate::Error;

/// Largest PRF output we produce in one call (the CBC key block).
pub const MAX_PRF_OUTPUT: usize = 128;

pub const MASTER_SECRET_LEN: usize = 48;
pub const VERIFY_DATA_LEN: usize = 12;

/// PRF for TLS 1.2
/// as specified in RFC 5246 Section 5.
///
/// PRF(secret, label, seed) = P_SHA256(secret, label + seed)
///
/// NOTE: The seed parameter here is the actual seed data WITHOUT the label.
pub fn prf_tls12(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<ArrayVec<[u8; MAX_PRF_OUTPUT]>, Error> {
    if output_len > MAX_PRF_OUTPUT {
        return Err(Error::CryptoError(format!(
            "PRF output of {} bytes exceeds {}",
            output_len, MAX_PRF_OUTPUT
        )));
    }

    let mut result = ArrayVec::default();
    let key = HmacSha256::new(secret);

    // A(1) = HMAC(secret, label + seed)
    let mut a = {
        let mut mac = key.clone();
        mac.update(label.as_bytes());
        mac.update(seed);
        mac.finalize()
    };

    while result.len() < output_len {
        // HMAC(secret, A(i) + label + seed)
        let mut mac = key.clone();
        mac.update(&a);
        mac.update(label.as_bytes());
        mac.update(seed);
        let output = mac.finalize();

        let to_copy = (output_len - result.len()).min(output.len());
        result.extend_from_slice(&output[..to_copy]);

        if result.len() < output_len {
            let mut mac = key.clone();
            mac.update(&a);
            a = mac.finalize();
        }
    }

    Ok(result)
}

/// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)[..48]
pub fn master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<[u8; MASTER_SECRET_LEN], Error> {
    let mut seed: ArrayVec<[u8; 64]> = ArrayVec::default();
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);

    let out = prf_tls12(pre_master_secret, "master secret", &seed, MASTER_SECRET_LEN)?;
    let mut master = [0u8; MASTER_SECRET_LEN];
    master.copy_from_slice(&out);
    Ok(master)
}

/// Key expansion for TLS 1.2
/// as specified in RFC 5246 Section 6.3
pub fn key_expansion(
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    key_material_length: usize,
) -> Result<ArrayVec<[u8; MAX_PRF_OUTPUT]>, Error> {
    // Note the order: server_random + client_random
    let mut seed: ArrayVec<[u8; 64]> = ArrayVec::default();
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    prf_tls12(master_secret, "key expansion", &seed, key_material_length)
}

/// verify_data = PRF(master_secret, label, SHA256(handshake_messages))[..12]
///
/// `label` is "client finished" or "server finished".
pub fn verify_data(
    master_secret: &[u8],
    label: &str,
    handshake_hash: &[u8],
) -> Result<[u8; VERIFY_DATA_LEN], Error> {
    let out = prf_tls12(master_secret, label, handshake_hash, VERIFY_DATA_LEN)?;
    let mut data = [0u8; VERIFY_DATA_LEN];
    data.copy_from_slice(&out);
    Ok(data)
}
