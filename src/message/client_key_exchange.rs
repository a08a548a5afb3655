use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

/// RSA ClientKeyExchange: the encrypted pre-master secret with a 2-byte
/// length prefix.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientKeyExchange<'a> {
    pub encrypted_pre_master_secret: &'a [u8],
}

impl<'a> ClientKeyExchange<'a> {
    pub fn new(encrypted_pre_master_secret: &'a [u8]) -> Self {
        ClientKeyExchange {
            encrypted_pre_master_secret,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ClientKeyExchange<'a>> {
        let (input, len) = be_u16(input)?;
        let (input, encrypted_pre_master_secret) = take(len)(input)?;
        Ok((
            input,
            ClientKeyExchange {
                encrypted_pre_master_secret,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&(self.encrypted_pre_master_secret.len() as u16).to_be_bytes());
        output.extend_from_slice(self.encrypted_pre_master_secret);
    }
}
