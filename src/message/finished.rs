use nom::bytes::complete::take;
use nom::IResult;

use crate::crypto::constant_time_eq;
use crate::message::CipherSuite;

/// Finished handshake message (RFC 5246 section 7.4.9).
#[derive(Debug, PartialEq, Eq)]
pub struct Finished<'a> {
    pub verify_data: &'a [u8],
}

impl<'a> Finished<'a> {
    pub fn new(verify_data: &'a [u8]) -> Self {
        Finished { verify_data }
    }

    /// The verify_data length depends on the negotiated suite.
    pub fn parse(input: &'a [u8], cipher_suite: CipherSuite) -> IResult<&'a [u8], Finished<'a>> {
        let (input, verify_data) = take(cipher_suite.verify_data_length())(input)?;
        Ok((input, Finished::new(verify_data)))
    }

    /// Compare against locally computed verify_data in constant time.
    pub fn verify(&self, expected: &[u8]) -> bool {
        constant_time_eq(self.verify_data, expected)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(self.verify_data);
    }
}
