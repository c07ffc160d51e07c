//     1          2          3
// ----------|----------|----------
//        RCV.NXT    RCV.NXT
//                  +RCV.WND
//
// 1 - old sequence numbers which have been acknowledged
// 2 - sequence numbers allowed for new reception
// 3 - future sequence numbers which are not yet allowed
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct ReceiveSequenceSpace {
    /// Initial receive sequence number
    pub irs: u32,
    /// Next sequence number expected on an incoming segment, and is the
    /// left or lower edge of the receive window
    pub nxt: u32,
    /// The number of bytes we can buffer from the remote TCP
    pub wnd: u32,
    /// Shift applied to the windows we advertise
    pub wind_shift: u8,
    /// The most recent timestamp accepted from the remote TCP
    pub ts_recent: u32,
    /// Whether incoming timestamps are checked against `ts_recent`
    pub ts_ok: bool,
    /// The acknowledgment number carried by the last segment we sent
    pub last_ack_sent: u32,
}
