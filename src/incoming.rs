use crate::message::{ContentType, ProtocolVersion, Record, HEADER_LEN, MAX_CIPHERTEXT};
use crate::transport::{ConnectionId, Transport};
use crate::Error;

/// Size of each read from the transport.
const READ_CHUNK: usize = 4096;

/// One complete record taken off the wire, still protected if a read
/// cipher is active.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct IncomingRecord {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub fragment: Vec<u8>,
}

/// Reassembles records from a byte stream.
///
/// Bytes beyond the record being returned stay buffered for the next call,
/// so a server flight that arrives in one read is consumed record by
/// record.
#[derive(Debug, Default)]
pub(crate) struct RecordReader {
    buffer: Vec<u8>,
}

impl RecordReader {
    pub fn new() -> Self {
        RecordReader::default()
    }

    /// Take one complete record from the buffer, if there is one.
    pub fn next_record(&mut self) -> Result<Option<IncomingRecord>, Error> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let (_, (content_type, version, length)) = Record::parse_header(&self.buffer)?;

        if let ContentType::Unknown(value) = content_type {
            return Err(Error::InvalidContentType(value));
        }
        if length > MAX_CIPHERTEXT {
            return Err(Error::TooBigLength(length, MAX_CIPHERTEXT));
        }
        if self.buffer.len() < HEADER_LEN + length {
            return Ok(None);
        }

        let fragment = self.buffer[HEADER_LEN..HEADER_LEN + length].to_vec();
        self.buffer.drain(..HEADER_LEN + length);

        trace!(
            "Record in: {:?} {:?} len {}",
            content_type,
            version,
            length
        );

        Ok(Some(IncomingRecord {
            content_type,
            version,
            fragment,
        }))
    }

    /// Read until one complete record is buffered.
    ///
    /// Polls the transport at most `poll_limit` times before giving up with
    /// [`Error::Timeout`].
    pub fn read<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        id: ConnectionId,
        poll_limit: usize,
    ) -> Result<IncomingRecord, Error> {
        let mut chunk = [0u8; READ_CHUNK];

        for _ in 0..poll_limit {
            if let Some(record) = self.next_record()? {
                return Ok(record);
            }

            let n = transport.recv(id, &mut chunk)?;
            if n > 0 {
                self.buffer.extend_from_slice(&chunk[..n]);
                continue;
            }

            if transport.is_closed(id) {
                debug!("Transport closed with {} bytes buffered", self.buffer.len());
                return Err(Error::ConnectionClosed);
            }

            transport.poll();
        }

        // Data that arrived on the last iteration still counts.
        if let Some(record) = self.next_record()? {
            return Ok(record);
        }

        debug!("No record after {} polls", poll_limit);
        Err(Error::Timeout)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
