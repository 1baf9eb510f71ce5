use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::error::OfpError;
use crate::openflow0x01::MsgCode;

/// The only protocol version this controller speaks.
pub const OFP_VERSION: u8 = 0x01;

const HEADER_LEN: usize = 8;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub const fn size() -> usize {
        HEADER_LEN
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        let mut buf = [0; HEADER_LEN];
        buf[0] = header.version;
        buf[1] = header.typ;
        BigEndian::write_u16(&mut buf[2..4], header.length);
        BigEndian::write_u32(&mut buf[4..8], header.xid);
        bytes.extend_from_slice(&buf);
    }

    /// Takes a message buffer (sized for an `OfpHeader`) and returns an `OfpHeader`.
    pub fn parse(buf: [u8; HEADER_LEN]) -> Self {
        OfpHeader {
            version: buf[0],
            typ: buf[1],
            length: BigEndian::read_u16(&buf[2..4]),
            xid: BigEndian::read_u32(&buf[4..8]),
        }
    }

    /// Block until a full header has been read from `reader`, then validate it.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<OfpHeader, OfpError> {
        let mut buf = [0; HEADER_LEN];
        reader.read_exact(&mut buf)?;
        let header = OfpHeader::parse(buf);
        if header.version != OFP_VERSION {
            return Err(OfpError::Malformed(format!("unsupported version {:#04x}", header.version)));
        }
        if header.length() < HEADER_LEN {
            return Err(OfpError::Malformed(format!("length {} shorter than header", header.length)));
        }
        Ok(header)
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the raw message type byte of a header.
    pub fn typ(&self) -> u8 {
        self.typ
    }

    /// Return the OpenFlow message type code of a header, if it is one we know.
    pub fn type_code(&self) -> Option<MsgCode> {
        MsgCode::from_u8(self.typ)
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Length of the message body following the header.
    pub fn body_length(&self) -> usize {
        self.length().saturating_sub(HEADER_LEN)
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    ///  Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}
