//! RSA public key extraction from an X.509 certificate.
//!
//! No chain building, validity or signature checking happens here. The key
//! of whatever certificate the server sends first is trusted as is.

use crate::asn1::{Node, Tag};
use crate::crypto::RsaPublicKey;
use crate::Error;

/// rsaEncryption, 1.2.840.113549.1.1.1 (content octets only).
pub const RSA_ENCRYPTION_OID: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// Pull the RSA public key out of a DER-encoded certificate.
///
/// Walks Certificate → TBSCertificate → SubjectPublicKeyInfo, identifies the
/// SPKI as the SEQUENCE whose AlgorithmIdentifier carries the rsaEncryption
/// OID, then decodes the BIT STRING as RSAPublicKey ::= SEQUENCE { n, e }.
pub fn rsa_public_key(der: &[u8]) -> Result<RsaPublicKey, Error> {
    let certificate = Node::parse_exact(der)?;
    certificate.expect(Tag::Sequence)?;

    let tbs = certificate
        .children()
        .next()
        .ok_or_else(|| Error::CertificateError("empty certificate".into()))??;
    tbs.expect(Tag::Sequence)?;

    let spki = tbs
        .try_children()?
        .into_iter()
        .find(is_rsa_spki)
        .ok_or_else(|| Error::CertificateError("no RSA subject public key".into()))?;

    let [_, key] = spki.try_children()?[..] else {
        return Err(Error::CertificateError(
            "SubjectPublicKeyInfo is not two elements".into(),
        ));
    };

    let rsa_key = Node::parse_exact(key.as_bit_string()?)?;
    rsa_key.expect(Tag::Sequence)?;

    let [n, e] = rsa_key.try_children()?[..] else {
        return Err(Error::CertificateError(
            "RSAPublicKey is not two INTEGERs".into(),
        ));
    };

    let public_key = RsaPublicKey::new(n.as_unsigned_integer()?, e.as_unsigned_integer()?)?;
    debug!("Server RSA key: {} bits", public_key.bits());

    Ok(public_key)
}

// SEQUENCE { SEQUENCE { OID rsaEncryption, ... }, BIT STRING }
fn is_rsa_spki(node: &Node) -> bool {
    if node.tag != Tag::Sequence {
        return false;
    }
    let mut children = node.children();
    let Some(Ok(algorithm)) = children.next() else {
        return false;
    };
    if algorithm.tag != Tag::Sequence {
        return false;
    }
    matches!(
        algorithm.children().next(),
        Some(Ok(oid)) if oid.tag == Tag::ObjectIdentifier && oid.content == RSA_ENCRYPTION_OID
    )
}
