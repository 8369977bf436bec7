//! Node startup: binds the overlay and control sockets, builds the
//! collaborators, and hands off to the dispatcher event loop (spec §4.3,
//! §7 taxonomy item 6 "configuration error at startup... fatal, exit").

use crate::chord::RingTable;
use crate::config::NodeConfig;
use crate::dispatcher::{self, NodeHandle};
use crate::endpoint::{Endpoint, Node as OverlayNode};
use crate::error::StartupError;
use crate::metrics::Counters;
use crate::storage::Storage;
use crate::ticket::{ProcessSecret, TicketAuthenticator};
use anyhow::Context;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};

/// Binding failures are the only startup errors worth a typed variant
/// (§7 item 6); once the dispatcher is running, a socket error is reported
/// via plain `anyhow` context instead since it is no longer a configuration
/// problem, just a fatal I/O one.
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let local = Endpoint::new(config.overlay_addr, config.overlay_port);
    let overlay_socket_addr = local.socket_addr();
    let overlay_socket = UdpSocket::bind(overlay_socket_addr)
        .await
        .map_err(|source| StartupError::OverlayBind { addr: overlay_socket_addr.to_string(), source })?;

    let control_socket_addr = std::net::SocketAddrV6::new(config.control_addr, config.control_port, 0, 0);
    let control_listener = TcpListener::bind(control_socket_addr)
        .await
        .map_err(|source| StartupError::ControlBind { addr: control_socket_addr.to_string(), source })?;

    let local_node = OverlayNode::new(local);
    tracing::info!(id = %local_node.id, %local, "node starting");

    let chord: Arc<dyn crate::chord::ChordTable> = Arc::new(RingTable::new(local_node));
    let storage = Storage::new(config.files_path.clone());
    let ticket_auth =
        Arc::new(TicketAuthenticator::new(ProcessSecret::generate()).with_timeout(config.ticket_timeout_secs));
    let counters = Arc::new(Counters::new());

    let handle = NodeHandle { chord, storage, ticket_auth, counters, local };

    dispatcher::run(handle, overlay_socket, control_listener).await.context("dispatcher event loop exited")
}
