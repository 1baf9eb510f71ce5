use std::io::{Read, Write};

use crate::error::OfpError;
use crate::ofp_header::OfpHeader;

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer level.
/// This is the codec boundary used by connections: one blocking `read_from` per
/// message, one `write_to` per message.
pub trait OfpMessage: Sized {
    /// Return a marshaled buffer containing an OpenFlow header and the message `msg`.
    fn marshal(xid: u32, msg: &Self) -> Result<Vec<u8>, OfpError>;

    /// Returns a pair `(u32, OfpMessage)` of the transaction id and OpenFlow message parsed from
    /// the given OpenFlow header `header`, and buffer `buf`.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Self), OfpError>;

    /// Block until one complete message has been read from `reader`.
    fn read_from<R: Read>(reader: &mut R) -> Result<(u32, Self), OfpError> {
        let header = OfpHeader::read_from(reader)?;
        let mut body = vec![0; header.body_length()];
        reader.read_exact(&mut body)?;
        Self::parse(&header, &body)
    }

    /// Write one message to `writer` in a single `write_all`.
    fn write_to<W: Write>(writer: &mut W, xid: u32, msg: &Self) -> Result<(), OfpError> {
        let bytes = Self::marshal(xid, msg)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}
