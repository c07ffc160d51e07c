use crate::{
    tcb::{AdvanceTimeResult, Segment, State, TcpError},
    tcp_connection::{Event, TcpConnection},
};
use bytes::Bytes;
use thiserror::Error as ThisError;
use tokio::{
    sync::{
        mpsc::{channel, error::TryRecvError, Receiver, Sender},
        oneshot,
    },
    task::JoinHandle,
    time::{timeout, Instant},
};
use tracing::{debug, warn};

/// Owns one connection on its own task. Segment arrivals, user calls and
/// timer ticks for the connection are all serialized through the task's
/// channel.
#[derive(Debug)]
pub struct TcpSession {
    send: Sender<Instruction>,
    handle: JoinHandle<()>,
}

impl TcpSession {
    /// Start the task. Outgoing segments go to `downstream` and application
    /// events, received data included, go to `upstream`.
    pub fn spawn(
        connection: TcpConnection,
        downstream: Sender<Segment>,
        upstream: Sender<Event>,
    ) -> Self {
        let (send, recv) = channel(8);
        let handle = tokio::spawn(run(connection, recv, downstream, upstream));
        Self { send, handle }
    }

    /// Receive an incoming segment as part of the demux flow
    pub async fn segment_arrives(&self, segment: Segment) -> Result<(), SessionError> {
        self.instruct(Instruction::Incoming(segment)).await
    }

    /// SEND call
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<usize, SessionError> {
        let (reply, response) = oneshot::channel();
        self.instruct(Instruction::Send(data.into(), reply)).await?;
        Ok(response.await.map_err(|_| SessionError::Stopped)??)
    }

    /// CLOSE call
    pub async fn close(&self) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.instruct(Instruction::Close(reply)).await?;
        Ok(response.await.map_err(|_| SessionError::Stopped)??)
    }

    /// ABORT call
    pub async fn abort(&self) -> Result<(), SessionError> {
        self.instruct(Instruction::Abort).await
    }

    /// The connection's current state
    pub async fn state(&self) -> Result<State, SessionError> {
        let (reply, response) = oneshot::channel();
        self.instruct(Instruction::State(reply)).await?;
        response.await.map_err(|_| SessionError::Stopped)
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to exit
    pub async fn join(self) -> Result<(), SessionError> {
        self.handle.await.map_err(|_| SessionError::Stopped)
    }

    async fn instruct(&self, instruction: Instruction) -> Result<(), SessionError> {
        self.send
            .send(instruction)
            .await
            .map_err(|_| SessionError::Stopped)
    }
}

async fn run(
    mut connection: TcpConnection,
    mut recv: Receiver<Instruction>,
    downstream: Sender<Segment>,
    upstream: Sender<Event>,
) {
    let tick = connection.config().tick;
    let mut last_tick = Instant::now();
    'outer: loop {
        // Tokio spends a lot of time getting the current time for timeouts,
        // so first process any ready instructions without setting up a
        // timeout and only wait if there were none.
        let mut needs_timeout = true;
        loop {
            match recv.try_recv() {
                Ok(instruction) => {
                    handle_instruction(instruction, &mut connection);
                    needs_timeout = false;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        if needs_timeout {
            match timeout(tick, recv.recv()).await {
                Ok(Some(instruction)) => handle_instruction(instruction, &mut connection),
                Ok(None) => break,
                Err(_) => {}
            }
        }

        let now = Instant::now();
        let result = connection.advance_time(now - last_tick);
        last_tick = now;

        flush(&mut connection, &downstream, &upstream).await;
        if result == AdvanceTimeResult::CloseConnection {
            break;
        }
    }
    debug!(local = %connection.local(), "session closing");
}

fn handle_instruction(instruction: Instruction, connection: &mut TcpConnection) {
    match instruction {
        Instruction::Incoming(segment) => {
            connection.segment_arrives(segment);
        }
        Instruction::Send(data, reply) => {
            let _ = reply.send(connection.send(data));
        }
        Instruction::Close(reply) => {
            let _ = reply.send(connection.close());
        }
        Instruction::Abort => connection.abort(),
        Instruction::State(reply) => {
            let _ = reply.send(connection.state());
        }
    }
}

async fn flush(connection: &mut TcpConnection, downstream: &Sender<Segment>, upstream: &Sender<Event>) {
    for segment in connection.segments() {
        if let Err(e) = downstream.send(segment).await {
            warn!("downstream closed: {}", e);
        }
    }

    let received = connection.receive();
    if !received.is_empty() {
        if let Err(e) = upstream.send(Event::Data(received)).await {
            warn!("upstream closed: {}", e);
        }
    }
    for event in connection.events() {
        if let Err(e) = upstream.send(event).await {
            warn!("upstream closed: {}", e);
        }
    }
}

/// An error that occurred while talking to a session
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum SessionError {
    #[error("The session has stopped")]
    Stopped,
    #[error("{0}")]
    Tcp(#[from] TcpError),
}

#[derive(Debug)]
enum Instruction {
    Incoming(Segment),
    Send(Bytes, oneshot::Sender<Result<usize, TcpError>>),
    Close(oneshot::Sender<Result<(), TcpError>>),
    Abort,
    State(oneshot::Sender<State>),
}
