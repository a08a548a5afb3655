use super::extensions::{ServerNameExtension, SignatureAlgorithmsExtension};
use super::{CipherSuite, CompressionMethod, ProtocolVersion};
use super::{Extension, ExtensionType, Random, SessionId};
use nom::error::{Error, ErrorKind};
use nom::Err;
use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u8},
    IResult,
};
use tinyvec::ArrayVec;

use crate::util::{many0, many1};

#[derive(Debug, PartialEq, Eq)]
pub struct ClientHello<'a> {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suites: ArrayVec<[CipherSuite; 32]>,
    pub compression_methods: ArrayVec<[CompressionMethod; 4]>,
    pub extensions: ArrayVec<[Extension<'a>; 16]>,
}

impl<'a> ClientHello<'a> {
    pub fn new(
        client_version: ProtocolVersion,
        random: Random,
        session_id: SessionId,
        cipher_suites: ArrayVec<[CipherSuite; 32]>,
        compression_methods: ArrayVec<[CompressionMethod; 4]>,
    ) -> Self {
        ClientHello {
            client_version,
            random,
            session_id,
            cipher_suites,
            compression_methods,
            extensions: ArrayVec::new(),
        }
    }

    /// Add server_name (when `host_name` is non-empty) and
    /// signature_algorithms.
    pub fn with_extensions(mut self, host_name: &str, extension_data: &'a mut Vec<u8>) -> Self {
        extension_data.clear();

        // First write all extension data, then borrow the ranges.
        let mut extension_ranges = ArrayVec::<[(ExtensionType, usize, usize); 4]>::new();

        if !host_name.is_empty() {
            let start_pos = extension_data.len();
            ServerNameExtension::new(host_name).serialize(extension_data);
            extension_ranges.push((ExtensionType::ServerName, start_pos, extension_data.len()));
        }

        let start_pos = extension_data.len();
        SignatureAlgorithmsExtension::rsa_sha256().serialize(extension_data);
        extension_ranges.push((
            ExtensionType::SignatureAlgorithms,
            start_pos,
            extension_data.len(),
        ));

        let extension_data: &'a Vec<u8> = extension_data;
        for (extension_type, start, end) in extension_ranges {
            self.extensions
                .push(Extension::new(extension_type, &extension_data[start..end]));
        }

        self
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ClientHello<'a>> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cipher_suites_len) = be_u16(input)?;
        let (input, input_cipher) = take(cipher_suites_len)(input)?;
        let (rest, cipher_suites) = many1(CipherSuite::parse)(input_cipher)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }
        let (input, compression_methods_len) = be_u8(input)?;
        let (input, input_compression) = take(compression_methods_len)(input)?;
        let (rest, compression_methods) = many1(CompressionMethod::parse)(input_compression)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        let (input, extensions) = if input.is_empty() {
            (input, ArrayVec::new())
        } else {
            let (input, extensions_len) = be_u16(input)?;
            let (input, extensions_data) = take(extensions_len)(input)?;
            let (rest, extensions) = many0(Extension::parse)(extensions_data)?;
            if !rest.is_empty() {
                return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
            }
            (input, extensions)
        };

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cipher_suites,
                compression_methods,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.client_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        output.extend_from_slice(&(self.cipher_suites.len() as u16 * 2).to_be_bytes());
        for suite in &self.cipher_suites {
            output.extend_from_slice(&suite.as_u16().to_be_bytes());
        }
        output.push(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            output.push(method.as_u8());
        }

        if !self.extensions.is_empty() {
            // Extension type (2) + Extension length (2) + Extension data
            let extensions_len: usize = self
                .extensions
                .iter()
                .map(|ext| 4 + ext.extension_data.len())
                .sum();
            output.extend_from_slice(&(extensions_len as u16).to_be_bytes());

            for ext in &self.extensions {
                ext.serialize(output);
            }
        }
    }

    /// Host name from the server_name extension, if present.
    pub fn server_name(&self) -> Option<&'a str> {
        self.extensions
            .iter()
            .find(|e| e.extension_type == ExtensionType::ServerName)
            .and_then(|e| ServerNameExtension::parse(e.extension_data).ok())
            .map(|(_, sni)| sni.host_name)
    }
}
