//      1         2          3          4
// ----------|----------|----------|----------
//        SND.UNA    SND.NXT    SND.UNA
//                             +SND.WND
//
// 1 - old sequence numbers which have been acknowledged
// 2 - sequence numbers of unacknowledged data
// 3 - sequence numbers allowed for new data transmission (send window)
// 4 - future sequence numbers which are not yet allowed
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct SendSequenceSpace {
    /// Oldest unacknowledged sequence number
    pub una: u32,
    /// Next sequence number to be sent
    pub nxt: u32,
    /// The size of the remote TCP's window, already scaled
    pub wnd: u32,
    /// Segment sequence number used for last window update
    pub wl1: u32,
    /// Segment acknowledgment number used for last window update
    pub wl2: u32,
    /// Initial send sequence number
    pub iss: u32,
    /// Maximum segment size for outgoing segments
    pub mss: u16,
    /// Shift applied to windows advertised by the remote TCP
    pub wind_shift: u8,
    /// Whether outgoing segments carry the timestamp option
    pub ts_ok: bool,
}

impl SendSequenceSpace {
    /// The number of sequence numbers sent but not yet acknowledged
    pub fn in_flight(&self) -> u32 {
        super::modular_cmp::distance(self.una, self.nxt)
    }

    /// How many more octets the remote window allows us to send
    pub fn usable_window(&self) -> u32 {
        self.wnd.saturating_sub(self.in_flight())
    }
}
