use super::ProtocolVersion;
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

/// Size of the record header: type(1) version(2) length(2).
pub const HEADER_LEN: usize = 5;

/// Largest plaintext fragment (2^14).
pub const MAX_PLAINTEXT: usize = 16384;

/// Largest protected fragment a peer may send (2^14 + 2048).
pub const MAX_CIPHERTEXT: usize = MAX_PLAINTEXT + 2048;

#[derive(Debug, PartialEq, Eq)]
pub struct Record<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub fragment: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn new(content_type: ContentType, version: ProtocolVersion, fragment: &'a [u8]) -> Self {
        Record {
            content_type,
            version,
            fragment,
        }
    }

    /// Parse the 5-byte header, returning the type, version and fragment length.
    pub fn parse_header(input: &[u8]) -> IResult<&[u8], (ContentType, ProtocolVersion, usize)> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;
        let (input, length) = be_u16(input)?;
        Ok((input, (content_type, version, length as usize)))
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Record<'a>> {
        let (input, (content_type, version, length)) = Self::parse_header(input)?;
        if length > MAX_CIPHERTEXT {
            return Err(Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }
        let (input, fragment) = take(length)(input)?;

        Ok((
            input,
            Record {
                content_type,
                version,
                fragment,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.content_type.as_u8());
        self.version.serialize(output);
        output.extend_from_slice(&(self.fragment.len() as u16).to_be_bytes());
        output.extend_from_slice(self.fragment);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}
