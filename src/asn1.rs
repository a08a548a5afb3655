//! Minimal DER reader.
//!
//! Only what X.509 key extraction needs: definite lengths, single-byte tags
//! and a way to walk the children of constructed nodes.

use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};

use crate::Error as TlsError;

const CONSTRUCTED: u8 = 0x20;
const CLASS_MASK: u8 = 0xC0;
const CONTEXT_SPECIFIC: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Boolean,
    Integer,
    BitString,
    OctetString,
    Null,
    ObjectIdentifier,
    Utf8String,
    PrintableString,
    UtcTime,
    GeneralizedTime,
    Sequence,
    Set,
    /// `[n]` context-specific tag, primitive or constructed.
    ContextSpecific(u8),
    Unknown(u8),
}

impl Default for Tag {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl Tag {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Tag::Boolean,
            0x02 => Tag::Integer,
            0x03 => Tag::BitString,
            0x04 => Tag::OctetString,
            0x05 => Tag::Null,
            0x06 => Tag::ObjectIdentifier,
            0x0C => Tag::Utf8String,
            0x13 => Tag::PrintableString,
            0x17 => Tag::UtcTime,
            0x18 => Tag::GeneralizedTime,
            0x30 => Tag::Sequence,
            0x31 => Tag::Set,
            v if v & CLASS_MASK == CONTEXT_SPECIFIC => Tag::ContextSpecific(v & 0x1F),
            _ => Tag::Unknown(value),
        }
    }
}

/// One TLV from a DER buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node<'a> {
    pub tag: Tag,
    raw_tag: u8,
    pub content: &'a [u8],
}

impl<'a> Node<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Node<'a>> {
        let (input, raw_tag) = be_u8(input)?;
        if raw_tag & 0x1F == 0x1F {
            // High tag numbers never appear in the structures we read.
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }
        let (input, length) = parse_length(input)?;
        let (input, content) = take(length)(input)?;

        Ok((
            input,
            Node {
                tag: Tag::from_u8(raw_tag),
                raw_tag,
                content,
            },
        ))
    }

    /// Parse a node that must fill `input` completely.
    pub fn parse_exact(input: &'a [u8]) -> Result<Node<'a>, TlsError> {
        let (rest, node) = Node::parse(input)?;
        if !rest.is_empty() {
            return Err(TlsError::CertificateError(format!(
                "{} trailing bytes after DER value",
                rest.len()
            )));
        }
        Ok(node)
    }

    pub fn is_constructed(&self) -> bool {
        self.raw_tag & CONSTRUCTED != 0
    }

    /// Iterate the direct children of a constructed node.
    pub fn children(&self) -> Children<'a> {
        Children {
            input: if self.is_constructed() {
                self.content
            } else {
                &[]
            },
        }
    }

    /// Collect children, failing on the first malformed one.
    pub fn try_children(&self) -> Result<Vec<Node<'a>>, TlsError> {
        self.children().collect()
    }

    /// Unsigned big-endian magnitude of an INTEGER.
    ///
    /// The single leading zero DER adds to keep positive numbers positive
    /// is removed. Negative integers are rejected.
    pub fn as_unsigned_integer(&self) -> Result<&'a [u8], TlsError> {
        self.expect(Tag::Integer)?;
        match self.content {
            [] => Err(TlsError::CertificateError("empty INTEGER".into())),
            [first, ..] if first & 0x80 != 0 => {
                Err(TlsError::CertificateError("negative INTEGER".into()))
            }
            [0, rest @ ..] if !rest.is_empty() => Ok(rest),
            content => Ok(content),
        }
    }

    /// Payload of a BIT STRING with no unused bits.
    pub fn as_bit_string(&self) -> Result<&'a [u8], TlsError> {
        self.expect(Tag::BitString)?;
        match self.content {
            [0, rest @ ..] => Ok(rest),
            _ => Err(TlsError::CertificateError(
                "BIT STRING with unused bits".into(),
            )),
        }
    }

    pub fn expect(&self, tag: Tag) -> Result<(), TlsError> {
        if self.tag != tag {
            return Err(TlsError::CertificateError(format!(
                "expected {:?}, found {:?}",
                tag, self.tag
            )));
        }
        Ok(())
    }
}

/// Iterator over the children of a constructed [`Node`].
#[derive(Debug, Clone)]
pub struct Children<'a> {
    input: &'a [u8],
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<Node<'a>, TlsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }
        match Node::parse(self.input) {
            Ok((rest, node)) => {
                self.input = rest;
                Some(Ok(node))
            }
            Err(e) => {
                self.input = &[];
                Some(Err(e.into()))
            }
        }
    }
}

fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = be_u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as usize));
    }

    let count = (first & 0x7F) as usize;
    // 0x80 is BER indefinite length, not allowed in DER.
    if count == 0 || count > 4 {
        return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
    }

    let (input, bytes) = take(count)(input)?;
    let length = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((input, length))
}
