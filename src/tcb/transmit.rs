use super::Segment;
use std::time::Duration;

/// A segment on the retransmission queue. Records when it was last sent so
/// an RTT sample can be taken once it is acknowledged.
#[derive(Debug, Clone)]
pub struct Transmit {
    /// The segment
    pub segment: Segment,
    /// Connection clock value of the latest transmission
    pub sent_at: Duration,
    /// Whether the segment has been sent more than once. Retransmitted
    /// segments never yield RTT samples (Karn's algorithm).
    pub retransmitted: bool,
}

impl Transmit {
    pub fn new(segment: Segment, sent_at: Duration) -> Self {
        Self {
            segment,
            sent_at,
            retransmitted: false,
        }
    }

    /// The sequence number following the last one this segment occupies
    pub fn end(&self) -> u32 {
        self.segment
            .header
            .seq
            .wrapping_add(self.segment.seg_len())
    }
}
