use super::{CipherSuite, CompressionMethod, Extension, ProtocolVersion, Random, SessionId};
use crate::util::many0;
use nom::error::{Error, ErrorKind};
use nom::Err;
use nom::{bytes::complete::take, number::complete::be_u16, IResult};
use tinyvec::ArrayVec;

#[derive(Debug, PartialEq, Eq)]
pub struct ServerHello<'a> {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub extensions: Option<ArrayVec<[Extension<'a>; 32]>>,
}

impl<'a> ServerHello<'a> {
    pub fn new(
        server_version: ProtocolVersion,
        random: Random,
        session_id: SessionId,
        cipher_suite: CipherSuite,
        compression_method: CompressionMethod,
        extensions: Option<ArrayVec<[Extension<'a>; 32]>>,
    ) -> Self {
        ServerHello {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ServerHello<'a>> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression_method) = CompressionMethod::parse(input)?;

        // Extensions are optional and only present if bytes remain.
        let (input, extensions) = if input.is_empty() {
            (input, None)
        } else {
            let (input, extensions_len) = be_u16(input)?;
            let (input, input_ext) = take(extensions_len)(input)?;
            let (rest, extensions) = many0(Extension::parse)(input_ext)?;
            if !rest.is_empty() {
                return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
            }
            (input, Some(extensions))
        };

        Ok((
            input,
            ServerHello {
                server_version,
                random,
                session_id,
                cipher_suite,
                compression_method,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        output.extend_from_slice(&self.cipher_suite.as_u16().to_be_bytes());
        output.push(self.compression_method.as_u8());

        if let Some(extensions) = &self.extensions {
            let extensions_len: usize = extensions
                .iter()
                .map(|ext| 4 + ext.extension_data.len())
                .sum();
            output.extend_from_slice(&(extensions_len as u16).to_be_bytes());
            for ext in extensions {
                ext.serialize(output);
            }
        }
    }
}
