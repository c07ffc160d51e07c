use std::time::Duration;

/// Per-connection tunables. Every connection created by a [`Tcp`](crate::Tcp)
/// host gets a copy of the host's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The maximum segment size to offer the peer and to send with
    pub mss: u16,
    /// The receive window in bytes, before scaling
    pub rcv_wnd: u32,
    /// The window scale shift to offer, `None` to not offer scaling
    pub window_scale: Option<u8>,
    /// Whether to offer the timestamp option
    pub timestamps: bool,
    /// Whether to offer SACK-permitted, which enables out-of-order buffering
    pub sack: bool,
    /// Maximum segment lifetime. TIME-WAIT lasts twice this long.
    pub msl: Duration,
    /// Retransmission timeout
    pub rto: Duration,
    /// Bytes the write queue may hold before sends fail
    pub write_queue_limit: usize,
    /// Close the local side as soon as the peer's FIN arrives
    pub close_on_fin: bool,
    /// How often a session advances its connection's clock
    pub tick: Duration,
}

impl Config {
    /// A configuration that offers none of the optional TCP extensions
    pub fn plain() -> Self {
        Self {
            window_scale: None,
            timestamps: false,
            sack: false,
            ..Default::default()
        }
    }

    /// The time a connection stays in TIME-WAIT
    pub fn time_wait(&self) -> Duration {
        self.msl * 2
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: 1460,
            rcv_wnd: 65535,
            window_scale: Some(7),
            timestamps: true,
            sack: true,
            msl: Duration::from_secs(30),
            rto: Duration::from_secs(1),
            write_queue_limit: 1 << 20,
            close_on_fin: false,
            tick: Duration::from_millis(5),
        }
    }
}
