use crate::{
    config::Config,
    tcb::{Segment, State, TcpError},
    tcp_connection::{Event, TcpConnection},
};
use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use tracing::debug;

/// Identifies a connection by its endpoints, as seen from the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,
}

impl ConnectionId {
    pub const fn new(local: SocketAddrV4, remote: SocketAddrV4) -> Self {
        Self { local, remote }
    }

    /// The same connection as seen from the other end
    pub const fn reverse(self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}

/// The connections of a single host. Routes arriving segments to their
/// connection, accepts new ones on listening sockets and answers the rest
/// with a reset.
#[derive(Debug, Default)]
pub struct Tcp {
    config: Config,
    /// Sockets accepting passive opens. An unspecified address matches any
    /// local address on the port.
    listeners: FxHashSet<SocketAddrV4>,
    /// A lookup table for connections based on their endpoints
    connections: FxHashMap<ConnectionId, TcpConnection>,
    outgoing: Vec<(ConnectionId, Segment)>,
    events: Vec<(ConnectionId, Event)>,
    iss: Option<u32>,
}

impl Tcp {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Use a fixed initial send sequence number for every new connection
    pub fn with_iss(mut self, iss: u32) -> Self {
        self.iss = Some(iss);
        self
    }

    /// Accept connections on the given local socket
    pub fn listen(&mut self, local: SocketAddrV4) -> Result<(), TcpError> {
        if !self.listeners.insert(local) {
            return Err(TcpError::AddressInUse);
        }
        Ok(())
    }

    /// Stop accepting connections on the socket. Existing connections stay.
    pub fn unlisten(&mut self, local: SocketAddrV4) -> bool {
        self.listeners.remove(&local)
    }

    /// Actively open a connection to `remote`
    pub fn connect(
        &mut self,
        local: SocketAddrV4,
        remote: SocketAddrV4,
    ) -> Result<ConnectionId, TcpError> {
        let id = ConnectionId::new(local, remote);
        if self.connections.contains_key(&id) {
            return Err(TcpError::ConnectionExists);
        }
        let mut connection = self.new_connection(id);
        connection.open(true)?;
        self.connections.insert(id, connection);
        self.collect(id);
        Ok(id)
    }

    /// Hand a segment to the connection it belongs to
    pub fn segment_arrives(&mut self, id: ConnectionId, segment: Segment) {
        if !self.connections.contains_key(&id) {
            let mut connection = self.new_connection(id);
            if self.is_listening(id.local) {
                debug!(local = %id.local, remote = %id.remote, "passive open");
                // Closed connections always accept a passive open
                let _ = connection.open(false);
            }
            self.connections.insert(id, connection);
        }
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.segment_arrives(segment);
        }
        self.collect(id);
        self.reclaim();
    }

    /// SEND call on a connection
    pub fn send(&mut self, id: ConnectionId, data: impl Into<Bytes>) -> Result<usize, TcpError> {
        let sent = self.connection(id)?.send(data);
        self.collect(id);
        sent
    }

    /// CLOSE call on a connection
    pub fn close(&mut self, id: ConnectionId) -> Result<(), TcpError> {
        let closed = self.connection(id)?.close();
        self.collect(id);
        self.reclaim();
        closed
    }

    /// ABORT call on a connection
    pub fn abort(&mut self, id: ConnectionId) -> Result<(), TcpError> {
        self.connection(id)?.abort();
        self.collect(id);
        self.reclaim();
        Ok(())
    }

    /// Take the data a connection has received in order
    pub fn receive(&mut self, id: ConnectionId) -> Result<Bytes, TcpError> {
        Ok(self.connection(id)?.receive())
    }

    /// The state of a connection, `None` once it has been reclaimed
    pub fn state(&self, id: ConnectionId) -> Option<State> {
        self.connections.get(&id).map(TcpConnection::state)
    }

    /// Move every connection's clock forward
    pub fn advance_time(&mut self, elapsed: Duration) {
        let ids: Vec<_> = self.connections.keys().copied().collect();
        for id in ids {
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.advance_time(elapsed);
            }
            self.collect(id);
        }
        self.reclaim();
    }

    /// Take the segments waiting to go out, with the connection they belong
    /// to
    pub fn segments(&mut self) -> Vec<(ConnectionId, Segment)> {
        std::mem::take(&mut self.outgoing)
    }

    /// Take the application events raised so far
    pub fn events(&mut self) -> Vec<(ConnectionId, Event)> {
        std::mem::take(&mut self.events)
    }

    /// The number of connections not yet reclaimed
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn is_listening(&self, local: SocketAddrV4) -> bool {
        self.listeners.contains(&local)
            || self
                .listeners
                .contains(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local.port()))
    }

    fn new_connection(&self, id: ConnectionId) -> TcpConnection {
        let connection = TcpConnection::new(id.local, Some(id.remote), self.config);
        match self.iss {
            Some(iss) => connection.with_iss(iss),
            None => connection,
        }
    }

    fn connection(&mut self, id: ConnectionId) -> Result<&mut TcpConnection, TcpError> {
        self.connections
            .get_mut(&id)
            .ok_or(TcpError::UnknownConnection)
    }

    fn collect(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&id) {
            self.outgoing
                .extend(connection.segments().into_iter().map(|segment| (id, segment)));
            self.events
                .extend(connection.events().into_iter().map(|event| (id, event)));
        }
    }

    fn reclaim(&mut self) {
        self.connections.retain(|id, connection| {
            // A per-peer listener that did not move on saw no SYN
            let keep = !matches!(connection.state(), State::Closed | State::Listen);
            if !keep {
                debug!(local = %id.local, remote = %id.remote, "connection reclaimed");
            }
            keep
        });
    }
}
