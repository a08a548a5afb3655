use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

const HOST_NAME: u8 = 0;

/// server_name extension (RFC 6066 section 3) carrying one host name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerNameExtension<'a> {
    pub host_name: &'a str,
}

impl<'a> ServerNameExtension<'a> {
    pub fn new(host_name: &'a str) -> Self {
        ServerNameExtension { host_name }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ServerNameExtension<'a>> {
        let (input, _list_len) = be_u16(input)?;
        let (input, name_type) = be_u8(input)?;
        if name_type != HOST_NAME {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }
        let (input, name_len) = be_u16(input)?;
        let (input, name) = take(name_len)(input)?;
        let host_name = std::str::from_utf8(name)
            .map_err(|_| Err::Failure(Error::new(input, ErrorKind::Char)))?;

        Ok((input, ServerNameExtension { host_name }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let name = self.host_name.as_bytes();
        output.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
        output.push(HOST_NAME);
        output.extend_from_slice(&(name.len() as u16).to_be_bytes());
        output.extend_from_slice(name);
    }
}
