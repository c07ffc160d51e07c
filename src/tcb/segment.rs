use crate::tcp_parsing::{ParseError, TcpHeader};
use bytes::Bytes;

/// An arrived or outgoing segment: a parsed header and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: TcpHeader,
    pub text: Bytes,
}

impl Segment {
    pub fn new(header: TcpHeader, text: impl Into<Bytes>) -> Self {
        Self {
            header,
            text: text.into(),
        }
    }

    /// Parses a serialized header followed by its payload
    pub fn from_bytes(packet: Bytes) -> Result<Self, ParseError> {
        let (header, len) = TcpHeader::from_bytes(&packet)?;
        Ok(Self {
            header,
            text: packet.slice(len..),
        })
    }

    /// The length of the segment data, including any control bits
    pub fn seg_len(&self) -> u32 {
        self.payload_len() + self.header.ctl.syn() as u32 + self.header.ctl.fin() as u32
    }

    /// The number of payload octets
    pub fn payload_len(&self) -> u32 {
        self.text.len() as u32
    }

    /// The serialized header followed by the payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.header.serialize();
        out.extend_from_slice(&self.text);
        out
    }
}
