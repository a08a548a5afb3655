use crate::message::{HashAlgorithm, SignatureAlgorithm, SignatureAndHashAlgorithm};
use crate::util::many0;
use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;
use tinyvec::ArrayVec;

/// SignatureAlgorithms extension as defined in RFC 5246
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureAlgorithmsExtension {
    pub supported_signature_algorithms: ArrayVec<[SignatureAndHashAlgorithm; 8]>,
}

impl SignatureAlgorithmsExtension {
    pub fn new(supported_signature_algorithms: ArrayVec<[SignatureAndHashAlgorithm; 8]>) -> Self {
        SignatureAlgorithmsExtension {
            supported_signature_algorithms,
        }
    }

    /// The only pair we can check: rsa_pkcs1_sha256 (0x0401).
    pub fn rsa_sha256() -> Self {
        let mut supported_signature_algorithms = ArrayVec::new();
        supported_signature_algorithms.push(SignatureAndHashAlgorithm::new(
            HashAlgorithm::SHA256,
            SignatureAlgorithm::RSA,
        ));
        SignatureAlgorithmsExtension {
            supported_signature_algorithms,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureAlgorithmsExtension> {
        let (input, list_len) = be_u16(input)?;
        let (input, list) = take(list_len)(input)?;
        let (_, supported_signature_algorithms) = many0(SignatureAndHashAlgorithm::parse)(list)?;

        Ok((
            input,
            SignatureAlgorithmsExtension {
                supported_signature_algorithms,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        // Write the total length of all algorithms (2 bytes per algorithm)
        output.extend_from_slice(
            &((self.supported_signature_algorithms.len() * 2) as u16).to_be_bytes(),
        );

        for alg in &self.supported_signature_algorithms {
            output.extend_from_slice(&alg.as_u16().to_be_bytes());
        }
    }
}
