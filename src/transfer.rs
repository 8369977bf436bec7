//! The per-file transfer engine (spec §3 "Transfer", §4.5).
//!
//! Each `Transfer` is born at a `Query`/`Push` handshake and dies at a
//! terminal state, firing its completion callback exactly once. Transfers
//! run as spawned tokio tasks reporting back through an `mpsc` channel —
//! the async analogue of the teacher's `TransferEvent` pattern in
//! `transfer.rs` — so they never block the dispatcher's event loop.

use crate::endpoint::Endpoint;
use crate::error::TransferError;
use crate::storage::Storage;
use std::collections::HashSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Recv,
}

/// Reported back to the dispatcher exactly once per transfer (spec §4.5,
/// "fired exactly once... removed from the active-transfers set before its
/// resources are released").
#[derive(Debug)]
pub struct TransferEvent {
    pub name: Vec<u8>,
    pub direction: Direction,
    pub result: Result<(), TransferError>,
}

/// One in-flight send or receive (spec §3 "Transfer").
///
/// `created`/`listening`/`connecting`/`transferring` are folded into the
/// lifetime of the spawned task; only the terminal outcome is externally
/// observable, via the `TransferEvent` it sends on completion.
struct Transfer {
    name: Vec<u8>,
    direction: Direction,
}

/// Tracks active transfers, keyed by `(name, direction)` so a send and a
/// receive for the same name can coexist but two receives cannot (spec §3
/// invariant: "at most one active receive-Transfer exists for its file
/// name"; spec §5: "No two concurrent receive-Transfers for the same file
/// name may coexist").
pub struct TransferManager {
    storage: Storage,
    active: HashSet<(Vec<u8>, Direction)>,
    events_tx: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferManager {
    pub fn new(storage: Storage) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (TransferManager { storage, active: HashSet::new(), events_tx }, events_rx)
    }

    pub fn is_active(&self, name: &[u8], direction: Direction) -> bool {
        self.active.contains(&(name.to_vec(), direction))
    }

    /// Call when a `TransferEvent` has been received and processed —
    /// removes the bookkeeping entry for the transfer that just finished.
    pub fn retire(&mut self, name: &[u8], direction: Direction) {
        self.active.remove(&(name.to_vec(), direction));
    }

    /// Binds `local.bulk_port()`, accepts exactly one connection, streams
    /// the named file, then closes (spec §4.5 `start_send`).
    pub fn start_send(&mut self, local: Endpoint, name: Vec<u8>) -> Result<(), TransferError> {
        if self.active.contains(&(name.clone(), Direction::Send)) {
            return Err(TransferError::AlreadyActive(String::from_utf8_lossy(&name).into_owned()));
        }
        self.active.insert((name.clone(), Direction::Send));
        let storage = self.storage.clone();
        let events_tx = self.events_tx.clone();
        let bind_addr = local.with_port(local.bulk_port()).socket_addr();
        tokio::spawn(async move {
            let result = run_send(bind_addr, &storage, &name).await;
            let _ = events_tx.send(TransferEvent { name, direction: Direction::Send, result });
        });
        Ok(())
    }

    /// Connects to `peer.bulk_port()` and streams the incoming bytes into
    /// storage under `name` (spec §4.5 `start_recv`).
    pub fn start_recv(&mut self, peer: Endpoint, name: Vec<u8>) -> Result<(), TransferError> {
        if self.active.contains(&(name.clone(), Direction::Recv)) {
            return Err(TransferError::AlreadyActive(String::from_utf8_lossy(&name).into_owned()));
        }
        self.active.insert((name.clone(), Direction::Recv));
        let storage = self.storage.clone();
        let events_tx = self.events_tx.clone();
        let connect_addr = peer.with_port(peer.bulk_port()).socket_addr();
        tokio::spawn(async move {
            let result = run_recv(connect_addr, &storage, &name).await;
            let _ = events_tx.send(TransferEvent { name, direction: Direction::Recv, result });
        });
        Ok(())
    }
}

async fn run_send(
    bind_addr: std::net::SocketAddrV6,
    storage: &Storage,
    name: &[u8],
) -> Result<(), TransferError> {
    let listener = TcpListener::bind(bind_addr).await?;
    let (mut stream, _peer) = listener.accept().await?;
    let mut file = storage.open_read(name).await?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await.map_err(|_| TransferError::PeerClosed)?;
    }
    stream.shutdown().await.ok();
    Ok(())
}

async fn run_recv(
    connect_addr: std::net::SocketAddrV6,
    storage: &Storage,
    name: &[u8],
) -> Result<(), TransferError> {
    let mut stream = TcpStream::connect(connect_addr).await.map_err(TransferError::PeerIo)?;
    let mut file = storage.create_temp(name).await?;
    let mut buf = [0u8; 8192];

    // Read failures are attributed to the peer, write failures to local
    // storage, so the dispatcher can bucket the completion event correctly.
    let outcome: Result<(), TransferError> = loop {
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => break Err(TransferError::PeerIo(e)),
        };
        if n == 0 {
            break match file.flush().await {
                Ok(()) => Ok(()),
                Err(e) => Err(TransferError::LocalIo(e)),
            };
        }
        if let Err(e) = file.write_all(&buf[..n]).await {
            break Err(TransferError::LocalIo(e));
        }
    };

    match outcome {
        Ok(()) => {
            storage.finalize(name).await?;
            Ok(())
        }
        Err(e) => {
            storage.discard_temp(name).await;
            Err(e)
        }
    }
}
