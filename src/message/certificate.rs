use std::ops::Deref;

use crate::util::put_u24;
use nom::error::{Error, ErrorKind};
use nom::{bytes::complete::take, number::complete::be_u24, Err, IResult};
use tinyvec::ArrayVec;

/// One DER-encoded X.509 certificate from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Asn1Cert<'a>(pub &'a [u8]);

impl<'a> Deref for Asn1Cert<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Certificate<'a> {
    pub certificate_list: ArrayVec<[Asn1Cert<'a>; 16]>,
}

impl<'a> Certificate<'a> {
    pub fn new(certificate_list: ArrayVec<[Asn1Cert<'a>; 16]>) -> Self {
        Certificate { certificate_list }
    }

    /// The server's own certificate, first in the chain.
    pub fn leaf(&self) -> Option<&Asn1Cert<'a>> {
        self.certificate_list.first()
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Certificate<'a>> {
        let (input, total_len) = be_u24(input)?;
        let (input, mut list) = take(total_len as usize)(input)?;
        let mut certificate_list = ArrayVec::new();

        while !list.is_empty() {
            let (rest, cert_len) = be_u24(list)?;
            let (rest, cert_data) = take(cert_len as usize)(rest)?;
            if certificate_list.try_push(Asn1Cert(cert_data)).is_some() {
                return Err(Err::Failure(Error::new(list, ErrorKind::TooLarge)));
            }
            list = rest;
        }

        Ok((input, Certificate { certificate_list }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let total_len: usize = self
            .certificate_list
            .iter()
            .map(|cert| 3 + cert.len())
            .sum();
        put_u24(output, total_len);

        for cert in &self.certificate_list {
            put_u24(output, cert.len());
            output.extend_from_slice(cert);
        }
    }
}
