use crate::{
    config::Config,
    logging::{drop_event, timer_event, transition_event},
    tcb::{
        modular_cmp::{distance, mod_gt},
        send_fin, AdvanceTimeResult, Connection, Disconnect, DropReason, Incoming, Outcome,
        RetransmitQueue, Segment, State, Tcb, TcpError, Transmit, WriteQueue,
    },
    tcp_parsing::{OptionKind, TcpHeader, TcpHeaderBuilder},
};
use bytes::{Bytes, BytesMut};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::{
    collections::{BinaryHeap, VecDeque},
    net::SocketAddrV4,
    time::Duration,
};
use tracing::trace;

/// Bytes the timestamp option takes from every segment once negotiated
const TIMESTAMP_OPTION_BYTES: u16 = 12;

/// Something the application should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The handshake completed
    Connected,
    /// Unread data handed over as the peer closes
    Data(Bytes),
    /// The connection is going away
    Disconnected(Disconnect),
}

/// A single TCP connection. Owns the TCB, the queues and the timers, and
/// drives the state machine in [`tcb`](crate::tcb). Time is simulated:
/// nothing happens between calls, and [`advance_time`](Self::advance_time)
/// moves the clock.
#[derive(Debug)]
pub struct TcpConnection {
    local: SocketAddrV4,
    remote: Option<SocketAddrV4>,
    config: Config,
    state: State,
    prev_state: State,
    tcb: Tcb,
    writeq: WriteQueue,
    retransmit: RetransmitQueue,
    /// Out-of-order segments, lowest sequence number first
    out_of_order: BinaryHeap<Incoming>,
    read_buf: BytesMut,
    outgoing: Vec<Segment>,
    events: VecDeque<Event>,
    dropped: Vec<(TcpHeader, DropReason)>,
    clock: Duration,
    rtx_deadline: Option<Duration>,
    timewait_deadline: Option<Duration>,
    rtt: Option<Duration>,
    dup_acks: u8,
    fin_pending: bool,
    fin_sent: bool,
    iss: Option<u32>,
    rng: SmallRng,
}

impl TcpConnection {
    /// Create a closed connection. `remote` may be left out for a passive
    /// open that accepts nothing until a peer is known.
    pub fn new(local: SocketAddrV4, remote: Option<SocketAddrV4>, config: Config) -> Self {
        Self {
            local,
            remote,
            config,
            state: State::Closed,
            prev_state: State::Closed,
            tcb: Tcb::default(),
            writeq: WriteQueue::new(config.write_queue_limit),
            retransmit: Default::default(),
            out_of_order: Default::default(),
            read_buf: Default::default(),
            outgoing: vec![],
            events: Default::default(),
            dropped: vec![],
            clock: Duration::ZERO,
            rtx_deadline: None,
            timewait_deadline: None,
            rtt: None,
            dup_acks: 0,
            fin_pending: false,
            fin_sent: false,
            iss: None,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Use a fixed initial send sequence number instead of a random one
    pub fn with_iss(mut self, iss: u32) -> Self {
        self.iss = Some(iss);
        self
    }

    /// OPEN call. Opening a closed connection starts from a fresh TCB.
    pub fn open(&mut self, active: bool) -> Result<(), TcpError> {
        if self.state == State::Closed {
            self.reset();
        }
        let state = self.state;
        state.open(self, active)
    }

    /// SEND call
    pub fn send(&mut self, data: impl Into<Bytes>) -> Result<usize, TcpError> {
        let state = self.state;
        state.send(self, data.into())
    }

    /// CLOSE call
    pub fn close(&mut self) -> Result<(), TcpError> {
        let state = self.state;
        let outcome = state.close(self)?;
        self.apply(outcome);
        Ok(())
    }

    /// ABORT call
    pub fn abort(&mut self) {
        let state = self.state;
        let outcome = state.abort(self);
        self.apply(outcome);
    }

    /// SEGMENT ARRIVES event
    pub fn segment_arrives(&mut self, segment: Segment) -> Outcome {
        trace!(
            local = %self.local,
            state = %self.state,
            seq = segment.header.seq,
            ack = segment.header.ack,
            ctl = ?segment.header.ctl,
            len = segment.text.len(),
            "segment arrives"
        );
        let state = self.state;
        let outcome = state.handle(self, &segment);
        self.apply(outcome);
        outcome
    }

    /// Move the clock forward, firing any timers that run out
    pub fn advance_time(&mut self, elapsed: Duration) -> AdvanceTimeResult {
        self.clock += elapsed;

        if let Some(deadline) = self.timewait_deadline {
            if self.clock >= deadline {
                timer_event(self.local, self.state, "time-wait");
                self.apply(Outcome::Close);
            }
        }

        if let Some(deadline) = self.rtx_deadline {
            if self.clock >= deadline {
                timer_event(self.local, self.state, "retransmit");
                self.retransmit_oldest();
                self.rtx_deadline = Some(self.clock + self.config.rto);
            }
        }

        match self.state {
            State::Closed => AdvanceTimeResult::CloseConnection,
            _ => AdvanceTimeResult::Ignore,
        }
    }

    /// Take the segments waiting to go out
    pub fn segments(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.outgoing)
    }

    /// Take the data received in order so far
    pub fn receive(&mut self) -> Bytes {
        let data = self.read_buf.split().freeze();
        self.update_rcv_wnd();
        data
    }

    /// Take the events the application has not seen yet
    pub fn events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn control_block(&self) -> &Tcb {
        &self.tcb
    }

    /// Every segment discarded so far, with the reason
    pub fn dropped(&self) -> &[(TcpHeader, DropReason)] {
        &self.dropped
    }

    /// The number of out-of-order segments held for reassembly
    pub fn reassembly_len(&self) -> usize {
        self.out_of_order.len()
    }

    /// The latest round trip time sample
    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    pub fn local(&self) -> SocketAddrV4 {
        self.local
    }

    pub fn remote(&self) -> Option<SocketAddrV4> {
        self.remote
    }

    fn apply(&mut self, outcome: Outcome) {
        if outcome == Outcome::Close {
            self.set_state(State::Closed);
            self.clean_up();
        }
    }

    fn clean_up(&mut self) {
        self.rtx_deadline = None;
        self.timewait_deadline = None;
        self.retransmit.clear();
        self.writeq.reset();
        self.out_of_order.clear();
        self.fin_pending = false;
    }

    /// Forget everything left over from a previous connection
    fn reset(&mut self) {
        self.clean_up();
        self.prev_state = State::Closed;
        self.tcb = Tcb::default();
        self.read_buf.clear();
        self.rtt = None;
        self.dup_acks = 0;
        self.fin_sent = false;
    }

    fn ts_val(&self) -> u32 {
        self.clock.as_millis() as u32
    }

    fn advertised_window(&self) -> u16 {
        (self.tcb.rcv.wnd >> self.tcb.rcv.wind_shift).min(u16::MAX as u32) as u16
    }

    /// The payload size for outgoing segments
    fn effective_mss(&self) -> u32 {
        let mss = match self.tcb.snd.ts_ok {
            true => self.tcb.snd.mss.saturating_sub(TIMESTAMP_OPTION_BYTES),
            false => self.tcb.snd.mss,
        };
        mss.max(1) as u32
    }

    /// Send the oldest unacknowledged segment again
    fn retransmit_oldest(&mut self) {
        let rcv_nxt = self.tcb.rcv.nxt;
        let wnd = self.advertised_window();
        let ts = self.tcb.snd.ts_ok.then(|| (self.ts_val(), self.tcb.rcv.ts_recent));
        let clock = self.clock;
        let Some(front) = self.retransmit.front_mut() else {
            return;
        };
        front.retransmitted = true;
        front.sent_at = clock;

        let mut segment = front.segment.clone();
        let header = &mut segment.header;
        if header.ctl.ack() {
            header.ack = rcv_nxt;
        }
        if !header.ctl.syn() {
            header.wnd = wnd;
        }
        if let (Some((val, ecr)), Some(timestamp)) = (ts, header.options.timestamp.as_mut()) {
            timestamp.val = val;
            timestamp.ecr = ecr;
        }
        trace!(local = %self.local, seq = segment.header.seq, "retransmit");
        self.outgoing.push(segment);
    }
}

impl Connection for TcpConnection {
    fn tcb(&mut self) -> &mut Tcb {
        &mut self.tcb
    }

    fn state(&self) -> State {
        self.state
    }

    fn prev_state(&self) -> State {
        self.prev_state
    }

    fn set_state(&mut self, state: State) {
        if state != self.state {
            transition_event(self.local, self.remote, self.state, state);
            self.prev_state = self.state;
            self.state = state;
        }
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn generate_iss(&mut self) -> u32 {
        match self.iss {
            Some(iss) => iss,
            None => self.rng.gen(),
        }
    }

    fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn outgoing_packet(&mut self) -> TcpHeaderBuilder {
        let remote_port = self.remote.map_or(0, |remote| remote.port());
        let builder = TcpHeaderBuilder::new(self.local.port(), remote_port, self.tcb.snd.nxt)
            .wnd(self.advertised_window());
        match self.tcb.snd.ts_ok {
            true => builder.timestamp(self.ts_val(), self.tcb.rcv.ts_recent),
            false => builder,
        }
    }

    fn transmit(&mut self, mut segment: Segment) {
        let ctl = segment.header.ctl;
        if ctl.syn() {
            segment.header.wnd = self.tcb.rcv.wnd.min(u16::MAX as u32) as u16;
        }
        if ctl.ack() {
            self.tcb.rcv.last_ack_sent = segment.header.ack;
        }
        if ctl.fin() {
            self.fin_sent = true;
        }
        if segment.seg_len() > 0 && !ctl.rst() {
            self.retransmit
                .push(Transmit::new(segment.clone(), self.clock));
            if self.rtx_deadline.is_none() {
                self.rtx_deadline = Some(self.clock + self.config.rto);
            }
        }
        self.outgoing.push(segment);
    }

    fn drop_segment(&mut self, segment: &Segment, reason: DropReason) {
        drop_event(
            self.local,
            self.state,
            segment.header.seq,
            segment.header.ack,
            reason,
        );
        self.dropped.push((segment.header, reason));
    }

    fn recv_data(&mut self, segment: &Segment) {
        let seq = segment.header.seq;
        let offset = distance(self.tcb.rcv.nxt, seq);
        // Text past the right edge of the receive window is cut
        let room = self.tcb.rcv.wnd.saturating_sub(offset) as usize;
        let text = segment.text.slice(..segment.text.len().min(room));
        if text.is_empty() {
            return;
        }
        if offset != 0 {
            let held = self
                .out_of_order
                .iter()
                .any(|queued| queued.header.seq == seq && queued.text.len() >= text.len());
            // A FIN beyond a gap is left for the peer to retransmit
            if !held && !segment.header.ctl.fin() {
                let mut segment = segment.clone();
                segment.text = text;
                self.out_of_order.push(Incoming::new(segment));
            }
            return;
        }

        self.read_buf.extend_from_slice(&text);
        self.tcb.rcv.nxt = seq.wrapping_add(text.len() as u32);
        while let Some(next) = self.out_of_order.peek() {
            if mod_gt(next.header.seq, self.tcb.rcv.nxt) {
                break;
            }
            let Some(next) = self.out_of_order.pop() else {
                break;
            };
            let next = next.into_inner();
            let end = next.header.seq.wrapping_add(next.payload_len());
            if mod_gt(end, self.tcb.rcv.nxt) {
                let overlap = distance(next.header.seq, self.tcb.rcv.nxt) as usize;
                self.read_buf.extend_from_slice(&next.text[overlap..]);
                self.tcb.rcv.nxt = end;
            }
        }
        self.update_rcv_wnd();
    }

    fn receive_disconnect(&mut self) {
        if !self.read_buf.is_empty() {
            let data = self.read_buf.split().freeze();
            self.events.push_back(Event::Data(data));
        }
    }

    fn signal_connect(&mut self) {
        self.events.push_back(Event::Connected);
        self.writeq_push();
    }

    fn signal_disconnect(&mut self, reason: Disconnect) {
        self.events.push_back(Event::Disconnected(reason));
        if reason == Disconnect::Closing && self.config.close_on_fin && self.state == State::CloseWait
        {
            // Infallible in CLOSE-WAIT
            let state = self.state;
            let _ = state.close(self);
        }
    }

    fn parse_options(&mut self, segment: &Segment) {
        let options = segment.header.options;
        let config = self.config;
        let tcb = &mut self.tcb;

        tcb.snd.mss = options
            .mss
            .map_or(crate::tcb::DEFAULT_MSS, |mss| mss.min(config.mss));

        match (config.window_scale, options.window_scale) {
            (Some(ours), Some(theirs)) => {
                tcb.ws_ok = true;
                tcb.rcv.wind_shift = ours;
                tcb.snd.wind_shift = theirs;
            }
            _ => {
                tcb.ws_ok = false;
                tcb.rcv.wind_shift = 0;
                tcb.snd.wind_shift = 0;
            }
        }

        tcb.sack_permitted = config.sack && options.sack_permitted;

        match (config.timestamps, options.timestamp) {
            (true, Some(timestamp)) => {
                tcb.snd.ts_ok = true;
                tcb.rcv.ts_ok = true;
                tcb.rcv.ts_recent = timestamp.val;
            }
            _ => {
                tcb.snd.ts_ok = false;
                tcb.rcv.ts_ok = false;
            }
        }
    }

    fn add_option(&mut self, kind: OptionKind, builder: TcpHeaderBuilder) -> TcpHeaderBuilder {
        match kind {
            OptionKind::Mss => builder.mss(self.config.mss),
            OptionKind::WindowScale => match self.config.window_scale {
                Some(shift) => builder.window_scale(shift),
                None => builder,
            },
            OptionKind::SackPermitted => builder.sack_permitted(),
            OptionKind::Timestamp => builder.timestamp(self.ts_val(), self.tcb.rcv.ts_recent),
        }
    }

    fn writeq_has_remaining_requests(&self) -> bool {
        self.writeq.has_remaining_requests()
    }

    fn queue_write(&mut self, data: Bytes) -> Result<usize, TcpError> {
        self.writeq.push(data)
    }

    fn writeq_push(&mut self) {
        let sendable = matches!(
            self.state,
            State::Established | State::CloseWait | State::FinWait1 | State::LastAck
        );
        if !sendable || self.fin_sent {
            return;
        }

        while self.writeq.has_remaining_requests() {
            let room = self.tcb.snd.usable_window().min(self.effective_mss());
            if room == 0 {
                break;
            }
            let text = self.writeq.take(room as usize);
            let mut builder = self.outgoing_packet().ack(self.tcb.rcv.nxt);
            if !self.writeq.has_remaining_requests() {
                builder = builder.psh();
            }
            let len = text.len() as u32;
            self.transmit(Segment::new(builder.build(), text));
            self.tcb.snd.nxt = self.tcb.snd.nxt.wrapping_add(len);
        }

        if self.fin_pending && !self.writeq.has_remaining_requests() {
            self.fin_pending = false;
            send_fin(self);
        }
    }

    fn writeq_reset(&mut self) {
        self.writeq.reset();
    }

    fn retire_acknowledged(&mut self) {
        if let Some(sent_at) = self.retransmit.retire(self.tcb.snd.una) {
            self.rtt = Some(self.clock.saturating_sub(sent_at));
        }
        self.dup_acks = 0;
        self.rtx_deadline = match self.retransmit.is_empty() {
            true => None,
            false => Some(self.clock + self.config.rto),
        };
        self.writeq_push();
    }

    fn on_duplicate_ack(&mut self) {
        self.dup_acks = self.dup_acks.saturating_add(1);
        if self.dup_acks == 3 {
            self.retransmit_oldest();
        }
    }

    fn rtx_stop(&mut self) {
        self.rtx_deadline = None;
    }

    fn timewait_start(&mut self) {
        self.timewait_deadline = Some(self.clock + self.config.time_wait());
    }

    fn timewait_restart(&mut self) {
        self.timewait_start();
    }

    fn release_memory(&mut self) {
        self.retransmit.clear();
    }

    fn update_rcv_wnd(&mut self) {
        self.tcb.rcv.wnd = self
            .config
            .rcv_wnd
            .saturating_sub(self.read_buf.len() as u32);
    }

    fn set_fin_pending(&mut self) {
        self.fin_pending = true;
    }

    fn fin_sent(&self) -> bool {
        self.fin_sent
    }
}
