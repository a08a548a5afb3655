use super::{Certificate, CipherSuite, ClientHello, ClientKeyExchange, Finished, ServerHello};
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u24, be_u8};
use nom::{Err, IResult};

/// Handshake header length: msg_type(1) + length(3).
pub const HANDSHAKE_HEADER_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Handshake<'a> {
    pub header: Header,
    pub body: Body<'a>,
}

impl<'a> Handshake<'a> {
    pub fn new(msg_type: MessageType, length: u32, body: Body<'a>) -> Self {
        Handshake {
            header: Header { msg_type, length },
            body,
        }
    }

    pub fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        Ok((input, Header { msg_type, length }))
    }

    /// Total length of the first handshake message in `input`, if all of
    /// it has arrived.
    pub fn complete_len(input: &[u8]) -> Option<usize> {
        let (_, header) = Self::parse_header(input).ok()?;
        let total = HANDSHAKE_HEADER_LEN + header.length as usize;
        (input.len() >= total).then_some(total)
    }

    pub fn parse(input: &'a [u8], c: Option<CipherSuite>) -> IResult<&'a [u8], Handshake<'a>> {
        let (input, header) = Self::parse_header(input)?;
        let (input, body_bytes) = take(header.length as usize)(input)?;
        let (rest, body) = Body::parse(body_bytes, header.msg_type, c)?;

        // A body that leaves bytes behind disagrees with its own length.
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        Ok((input, Handshake { header, body }))
    }

    /// Serialize header and body. The header length is computed from the
    /// body, not taken from `self.header`.
    pub fn serialize(&self, output: &mut Vec<u8>) {
        let start = output.len();
        output.push(self.header.msg_type.as_u8());
        output.extend_from_slice(&[0, 0, 0]);
        self.body.serialize(output);

        let body_len = (output.len() - start - HANDSHAKE_HEADER_LEN) as u32;
        output[start + 1..start + HANDSHAKE_HEADER_LEN].copy_from_slice(&body_len.to_be_bytes()[1..]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    HelloRequest, // empty
    ClientHello,
    ServerHello,
    NewSessionTicket,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone, // empty
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest, // empty
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            4 => MessageType::NewSessionTicket,
            11 => MessageType::Certificate,
            12 => MessageType::ServerKeyExchange,
            13 => MessageType::CertificateRequest,
            14 => MessageType::ServerHelloDone, // empty
            15 => MessageType::CertificateVerify,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::NewSessionTicket => 4,
            MessageType::Certificate => 11,
            MessageType::ServerKeyExchange => 12,
            MessageType::CertificateRequest => 13,
            MessageType::ServerHelloDone => 14,
            MessageType::CertificateVerify => 15,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

#[derive(Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Body<'a> {
    HelloRequest, // empty
    ClientHello(ClientHello<'a>),
    ServerHello(ServerHello<'a>),
    Certificate(Certificate<'a>),
    /// Kept opaque. RSA key transport has no use for it.
    ServerKeyExchange(&'a [u8]),
    /// Kept opaque. Client authentication is not offered.
    CertificateRequest(&'a [u8]),
    ServerHelloDone, // empty
    ClientKeyExchange(ClientKeyExchange<'a>),
    Finished(Finished<'a>),
    Unknown(u8, &'a [u8]),
}

impl<'a> Default for Body<'a> {
    fn default() -> Self {
        Self::Unknown(0, &[])
    }
}

impl<'a> Body<'a> {
    pub fn parse(
        input: &'a [u8],
        m: MessageType,
        c: Option<CipherSuite>,
    ) -> IResult<&'a [u8], Body<'a>> {
        match m {
            MessageType::HelloRequest => Ok((input, Body::HelloRequest)),
            MessageType::ClientHello => {
                let (input, client_hello) = ClientHello::parse(input)?;
                Ok((input, Body::ClientHello(client_hello)))
            }
            MessageType::ServerHello => {
                let (input, server_hello) = ServerHello::parse(input)?;
                Ok((input, Body::ServerHello(server_hello)))
            }
            MessageType::Certificate => {
                let (input, certificate) = Certificate::parse(input)?;
                Ok((input, Body::Certificate(certificate)))
            }
            MessageType::ServerKeyExchange => Ok((&[], Body::ServerKeyExchange(input))),
            MessageType::CertificateRequest => Ok((&[], Body::CertificateRequest(input))),
            MessageType::ServerHelloDone => Ok((input, Body::ServerHelloDone)),
            MessageType::ClientKeyExchange => {
                let (input, client_key_exchange) = ClientKeyExchange::parse(input)?;
                Ok((input, Body::ClientKeyExchange(client_key_exchange)))
            }
            MessageType::Finished => {
                let cipher_suite =
                    c.ok_or_else(|| Err::Failure(Error::new(input, ErrorKind::Fail)))?;
                let (input, finished) = Finished::parse(input, cipher_suite)?;
                Ok((input, Body::Finished(finished)))
            }
            MessageType::NewSessionTicket
            | MessageType::CertificateVerify
            | MessageType::Unknown(_) => Ok((&[], Body::Unknown(m.as_u8(), input))),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match self {
            Body::HelloRequest | Body::ServerHelloDone => {}
            Body::ClientHello(client_hello) => client_hello.serialize(output),
            Body::ServerHello(server_hello) => server_hello.serialize(output),
            Body::Certificate(certificate) => certificate.serialize(output),
            Body::ServerKeyExchange(data) | Body::CertificateRequest(data) => {
                output.extend_from_slice(data)
            }
            Body::ClientKeyExchange(client_key_exchange) => client_key_exchange.serialize(output),
            Body::Finished(finished) => finished.serialize(output),
            Body::Unknown(_, data) => output.extend_from_slice(data),
        }
    }
}
