use super::{modular_cmp::mod_leq, Transmit, TcpError};
use bytes::{Bytes, BytesMut};
use std::{collections::VecDeque, time::Duration};

/// Data bytes queued by the user but not yet segmentized
#[derive(Debug)]
pub struct WriteQueue {
    requests: VecDeque<Bytes>,
    queued: usize,
    limit: usize,
}

impl WriteQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            requests: Default::default(),
            queued: 0,
            limit,
        }
    }

    /// Queue a write request. Fails without queueing anything if the request
    /// would grow the queue past its limit.
    pub fn push(&mut self, data: Bytes) -> Result<usize, TcpError> {
        let len = data.len();
        if self.queued + len > self.limit {
            return Err(TcpError::InsufficientResources);
        }
        if len > 0 {
            self.queued += len;
            self.requests.push_back(data);
        }
        Ok(len)
    }

    /// Whether unsent application data is still queued
    pub fn has_remaining_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    /// The number of queued bytes
    pub fn queued_bytes(&self) -> usize {
        self.queued
    }

    /// Take up to `max` bytes off the front of the queue, crossing request
    /// boundaries when needed
    pub fn take(&mut self, max: usize) -> Bytes {
        let first = match self.requests.front_mut() {
            Some(first) => first,
            None => return Bytes::new(),
        };
        if first.len() >= max {
            let out = first.split_to(max);
            if first.is_empty() {
                self.requests.pop_front();
            }
            self.queued -= out.len();
            return out;
        }

        let mut out = BytesMut::with_capacity(max);
        while out.len() < max {
            let Some(front) = self.requests.front_mut() else {
                break;
            };
            let n = front.len().min(max - out.len());
            out.extend_from_slice(&front.split_to(n));
            if front.is_empty() {
                self.requests.pop_front();
            }
        }
        self.queued -= out.len();
        out.freeze()
    }

    /// Discard everything queued
    pub fn reset(&mut self) {
        self.requests.clear();
        self.queued = 0;
    }
}

/// The retransmission queue. Contains segments that may need to be
/// retransmitted, oldest first.
#[derive(Debug, Default)]
pub struct RetransmitQueue(VecDeque<Transmit>);

impl RetransmitQueue {
    pub fn push(&mut self, transmit: Transmit) {
        self.0.push_back(transmit);
    }

    /// Remove every segment fully covered by `una`. Returns the send time of
    /// the newest retired segment that was only sent once, for RTT sampling.
    pub fn retire(&mut self, una: u32) -> Option<Duration> {
        let mut sample = None;
        while let Some(front) = self.0.front() {
            if !mod_leq(front.end(), una) {
                break;
            }
            if let Some(retired) = self.0.pop_front() {
                sample = match retired.retransmitted {
                    false => Some(retired.sent_at),
                    true => None,
                };
            }
        }
        sample
    }

    /// The oldest unacknowledged segment
    pub fn front_mut(&mut self) -> Option<&mut Transmit> {
        self.0.front_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The number of payload bytes awaiting acknowledgment
    pub fn queued_bytes(&self) -> usize {
        self.0
            .iter()
            .map(|transmit| transmit.segment.text.len())
            .sum()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
