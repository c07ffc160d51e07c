use thiserror::Error as ThisError;

/// The number of 32-bit words in a TCP header without optional header parts
const BASE_HEADER_WORDS: u8 = 5;
/// The number of bytes in a TCP header without optional header parts
const BASE_HEADER_OCTETS: usize = BASE_HEADER_WORDS as usize * 4;
/// The largest shift a window scale option may ask for (RFC 7323 2.3)
pub const MAX_WINDOW_SHIFT: u8 = 14;

// Option kinds
const END: u8 = 0;
const NOP: u8 = 1;
const MSS: u8 = 2;
const WINDOW_SCALE: u8 = 3;
const SACK_PERMITTED: u8 = 4;
const TIMESTAMP: u8 = 8;

/// A parsed TCP header, options included (RFC 9293 3.1)
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// SEG.SEQ. On a SYN this is the ISN and data starts at ISN+1.
    pub seq: u32,
    /// SEG.ACK, meaningful only with the ACK bit
    pub ack: u32,
    /// Header length in 32-bit words
    pub data_offset: u8,
    pub ctl: Control,
    /// SEG.WND as it appears on the wire, before any window scaling
    pub wnd: u16,
    /// Left to the layer below, which knows the pseudo header
    pub checksum: u16,
    /// Urgent pointer. Carried through but never acted on.
    pub urg: u16,
    pub options: TcpOptions,
}

impl TcpHeader {
    /// Parses a serialized TCP header into its constituent fields. Returns
    /// the header and its length in bytes, which is where the payload
    /// starts.
    pub fn from_bytes(packet: &[u8]) -> Result<(Self, usize), ParseError> {
        if packet.len() < BASE_HEADER_OCTETS {
            Err(ParseError::HeaderTooShort)?
        }

        let data_offset = packet[12] >> 4;
        if data_offset < BASE_HEADER_WORDS {
            Err(ParseError::DataOffset(data_offset))?
        }
        let header_len = data_offset as usize * 4;
        if packet.len() < header_len {
            Err(ParseError::HeaderTooShort)?
        }

        let header = TcpHeader {
            src_port: u16::from_be_bytes([packet[0], packet[1]]),
            dst_port: u16::from_be_bytes([packet[2], packet[3]]),
            seq: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            ack: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
            data_offset,
            ctl: Control::from(packet[13]),
            wnd: u16::from_be_bytes([packet[14], packet[15]]),
            checksum: u16::from_be_bytes([packet[16], packet[17]]),
            urg: u16::from_be_bytes([packet[18], packet[19]]),
            options: TcpOptions::from_bytes(&packet[BASE_HEADER_OCTETS..header_len])?,
        };
        Ok((header, header_len))
    }

    /// Header length in bytes
    pub fn bytes(&self) -> usize {
        self.data_offset as usize * 4
    }

    /// Wire format of the header, options and padding included
    pub fn serialize(&self) -> Vec<u8> {
        let options = self.options.serialize();
        let data_offset = BASE_HEADER_WORDS + (options.len() / 4) as u8;
        let mut out = Vec::with_capacity(BASE_HEADER_OCTETS + options.len());
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.ack.to_be_bytes());
        out.push(data_offset << 4);
        out.push(self.ctl.into());
        out.extend_from_slice(&self.wnd.to_be_bytes());
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&self.urg.to_be_bytes());
        out.extend_from_slice(&options);
        out
    }
}

/// A peer's timestamp option (RFC 7323 3.2)
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct Timestamp {
    /// TSval, the sender's clock
    pub val: u32,
    /// TSecr, the echoed TSval of the remote TCP
    pub ecr: u32,
}

/// The options a TCP header may carry. SACK blocks are accepted on the wire
/// but not retained.
#[derive(Debug, Default, Copy, Clone, Hash, PartialEq, Eq)]
pub struct TcpOptions {
    pub mss: Option<u16>,
    pub window_scale: Option<u8>,
    pub sack_permitted: bool,
    pub timestamp: Option<Timestamp>,
}

/// Names the options a connection negotiates
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum OptionKind {
    Mss,
    WindowScale,
    SackPermitted,
    Timestamp,
}

impl TcpOptions {
    /// Parses the option bytes following the fixed header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut options = Self::default();
        let mut i = 0;
        while i < bytes.len() {
            let kind = bytes[i];
            match kind {
                END => break,
                NOP => {
                    i += 1;
                    continue;
                }
                _ => {}
            }

            let len = *bytes.get(i + 1).ok_or(ParseError::OptionLength { kind })? as usize;
            if len < 2 || i + len > bytes.len() {
                Err(ParseError::OptionLength { kind })?
            }
            let body = &bytes[i + 2..i + len];
            let expect = |expected: usize| {
                if len == expected {
                    Ok(())
                } else {
                    Err(ParseError::OptionLength { kind })
                }
            };
            match kind {
                MSS => {
                    expect(4)?;
                    options.mss = Some(u16::from_be_bytes([body[0], body[1]]));
                }
                WINDOW_SCALE => {
                    expect(3)?;
                    options.window_scale = Some(body[0].min(MAX_WINDOW_SHIFT));
                }
                SACK_PERMITTED => {
                    expect(2)?;
                    options.sack_permitted = true;
                }
                TIMESTAMP => {
                    expect(10)?;
                    options.timestamp = Some(Timestamp {
                        val: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
                        ecr: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
                    });
                }
                // SACK blocks and anything unknown
                _ => {}
            }
            i += len;
        }
        Ok(options)
    }

    /// Serializes the options, padded to a multiple of four bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20);
        if let Some(mss) = self.mss {
            out.extend_from_slice(&[MSS, 4]);
            out.extend_from_slice(&mss.to_be_bytes());
        }
        match (self.sack_permitted, self.timestamp) {
            (sack_permitted, Some(timestamp)) => {
                if sack_permitted {
                    out.extend_from_slice(&[SACK_PERMITTED, 2]);
                } else {
                    out.extend_from_slice(&[NOP, NOP]);
                }
                out.extend_from_slice(&[TIMESTAMP, 10]);
                out.extend_from_slice(&timestamp.val.to_be_bytes());
                out.extend_from_slice(&timestamp.ecr.to_be_bytes());
            }
            (true, None) => out.extend_from_slice(&[NOP, NOP, SACK_PERMITTED, 2]),
            (false, None) => {}
        }
        if let Some(shift) = self.window_scale {
            out.extend_from_slice(&[NOP, WINDOW_SCALE, 3, shift]);
        }
        while out.len() % 4 != 0 {
            out.push(END);
        }
        out
    }

    /// Number of bytes the options take up on the wire
    pub fn len(&self) -> usize {
        self.serialize().len()
    }

    /// Whether there are no options
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Why a TCP header could not be parsed
#[derive(Debug, ThisError, PartialEq, Eq, Clone, Copy)]
pub enum ParseError {
    #[error("Packet is shorter than the TCP header it claims")]
    HeaderTooShort,
    #[error("Data offset {0} is smaller than the fixed header")]
    DataOffset(u8),
    #[error("Option of kind {kind} has an invalid length")]
    OptionLength { kind: u8 },
}

/// Assembles an outgoing header one field at a time
#[derive(Debug)]
pub struct TcpHeaderBuilder(TcpHeader);

impl TcpHeaderBuilder {
    /// A header with no flags, no options and a zero window
    pub fn new(src_port: u16, dst_port: u16, seq: u32) -> Self {
        Self(TcpHeader {
            src_port,
            dst_port,
            seq,
            ack: 0,
            // Computed by build()
            data_offset: 0,
            ctl: Control::default(),
            wnd: 0,
            checksum: 0,
            urg: 0,
            options: TcpOptions::default(),
        })
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.0.seq = seq;
        self
    }

    /// The window to advertise, already scaled down
    pub fn wnd(mut self, wnd: u16) -> Self {
        self.0.wnd = wnd;
        self
    }

    /// Acknowledge up to `ack`. Also sets the ACK bit.
    pub fn ack(mut self, ack: u32) -> Self {
        self.0.ack = ack;
        self.0.ctl.set(Control::ACK, true);
        self
    }

    pub fn psh(self) -> Self {
        self.flag(Control::PSH)
    }

    pub fn rst(self) -> Self {
        self.flag(Control::RST)
    }

    pub fn syn(self) -> Self {
        self.flag(Control::SYN)
    }

    pub fn fin(self) -> Self {
        self.flag(Control::FIN)
    }

    pub fn mss(mut self, mss: u16) -> Self {
        self.0.options.mss = Some(mss);
        self
    }

    /// Offer a window scale shift, clamped to 14
    pub fn window_scale(mut self, shift: u8) -> Self {
        self.0.options.window_scale = Some(shift.min(MAX_WINDOW_SHIFT));
        self
    }

    pub fn sack_permitted(mut self) -> Self {
        self.0.options.sack_permitted = true;
        self
    }

    pub fn timestamp(mut self, val: u32, ecr: u32) -> Self {
        self.0.options.timestamp = Some(Timestamp { val, ecr });
        self
    }

    pub fn build(self) -> TcpHeader {
        let mut header = self.0;
        header.data_offset = BASE_HEADER_WORDS + (header.options.len() / 4) as u8;
        header
    }

    fn flag(mut self, flag: u8) -> Self {
        self.0.ctl.set(flag, true);
        self
    }
}

/// The six control bits of RFC 793, in their wire positions
#[derive(Default, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Control(u8);

impl Control {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;

    const NAMES: [(u8, &'static str); 6] = [
        (Self::URG, "URG"),
        (Self::ACK, "ACK"),
        (Self::PSH, "PSH"),
        (Self::RST, "RST"),
        (Self::SYN, "SYN"),
        (Self::FIN, "FIN"),
    ];

    pub const fn new(urg: bool, ack: bool, psh: bool, rst: bool, syn: bool, fin: bool) -> Self {
        let mut bits = 0;
        if urg {
            bits |= Self::URG;
        }
        if ack {
            bits |= Self::ACK;
        }
        if psh {
            bits |= Self::PSH;
        }
        if rst {
            bits |= Self::RST;
        }
        if syn {
            bits |= Self::SYN;
        }
        if fin {
            bits |= Self::FIN;
        }
        Self(bits)
    }

    /// Whether every bit of `flags` is set
    pub const fn contains(self, flags: u8) -> bool {
        self.0 & flags == flags
    }

    pub fn set(&mut self, flags: u8, on: bool) {
        if on {
            self.0 |= flags;
        } else {
            self.0 &= !flags;
        }
    }

    pub const fn urg(self) -> bool {
        self.contains(Self::URG)
    }

    pub const fn ack(self) -> bool {
        self.contains(Self::ACK)
    }

    pub const fn psh(self) -> bool {
        self.contains(Self::PSH)
    }

    pub const fn rst(self) -> bool {
        self.contains(Self::RST)
    }

    pub const fn syn(self) -> bool {
        self.contains(Self::SYN)
    }

    pub const fn fin(self) -> bool {
        self.contains(Self::FIN)
    }

    pub fn set_syn(&mut self, on: bool) {
        self.set(Self::SYN, on);
    }
}

impl From<u8> for Control {
    fn from(bits: u8) -> Self {
        Self(bits & 0b11_1111)
    }
}

impl From<Control> for u8 {
    fn from(control: Control) -> Self {
        control.0
    }
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set: Vec<_> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Control({})", set.join(", "))
    }
}
