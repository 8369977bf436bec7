//! The DHT query/push state machine (spec §4.4).
//!
//! Handlers are plain async functions rather than a dispatch table entry
//! type — each message kind to consume/forward/drop is just a function call
//! from the dispatcher's `match` on decoded `Message` kind (`dispatcher.rs`).
//! Storage lookups suspend at `.await` the way spec §5 allows ("suspension
//! only at the event-loop boundary"); nothing here blocks a worker thread.

use crate::chord::ChordTable;
use crate::control::ControlMessage;
use crate::endpoint::Endpoint;
use crate::id::Id;
use crate::message::Message;
use crate::metrics::Counters;
use crate::storage::Storage;
use crate::transfer::{Direction as TransferDirection, TransferManager};
use std::net::Ipv6Addr;

/// What the dispatcher should do with the routing packet that produced this
/// outcome (spec §4.3, "handler return values {consume, forward, drop}").
#[derive(Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    Consume,
    Forward { toward: Id },
    Drop,
}

/// Sends a message directly to a known endpoint (as opposed to routing it
/// through the Chord forwarding fabric). Implemented by the dispatcher over
/// the overlay UDP socket; handlers only ever enqueue, never block on I/O.
pub trait OverlaySend {
    fn send_to(&self, endpoint: Endpoint, message: Message);
}

/// Delivers a reply to whichever control-channel client originated the
/// request for `name`, if one is still connected.
pub trait ControlSend {
    fn reply(&self, name: &[u8], message: ControlMessage);
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_query(
    chord: &impl ChordTable,
    storage: &Storage,
    transfers: &mut TransferManager,
    counters: &Counters,
    local: Endpoint,
    overlay: &impl OverlaySend,
    reply_addr: Ipv6Addr,
    reply_port: u16,
    name: Vec<u8>,
) -> HandlerOutcome {
    if name.is_empty() {
        tracing::debug!("dropping Query with empty name");
        return HandlerOutcome::Drop;
    }
    let reply_to = Endpoint::new(reply_addr, reply_port);

    if storage.exists(&name).await {
        tracing::debug!(name = %String::from_utf8_lossy(&name), "have file, replying success");
        let file_size = storage.size(&name).await.unwrap_or(0);
        overlay.send_to(reply_to, Message::QueryReplySuccess { file_size, name: name.clone() });
        if let Err(e) = transfers.start_send(local, name) {
            tracing::warn!(error = %e, "failed to start send-transfer for query hit");
        }
        HandlerOutcome::Consume
    } else {
        let id = Id::from_sha1(&name);
        if chord.is_local(&id) {
            tracing::debug!(name = %String::from_utf8_lossy(&name), "don't have file, but it's ours, replying failure");
            counters.inc_routing_error();
            overlay.send_to(reply_to, Message::QueryReplyFailure { name });
            HandlerOutcome::Consume
        } else {
            tracing::debug!(name = %String::from_utf8_lossy(&name), "forwarding query");
            HandlerOutcome::Forward { toward: id }
        }
    }
}

/// Starts the receive-Transfer for a successful lookup. The client-visible
/// outcome (`ClientReplySuccess`/`Failure`, optimistic `Push`) is decided
/// later, when the transfer itself completes — see
/// [`on_receive_transfer_complete`].
pub fn handle_query_reply_success(
    transfers: &mut TransferManager,
    from: Endpoint,
    name: Vec<u8>,
) -> HandlerOutcome {
    if let Err(e) = transfers.start_recv(from, name) {
        tracing::warn!(error = %e, "failed to start receive-transfer for query reply success");
    }
    HandlerOutcome::Consume
}

pub fn handle_query_reply_failure(control: &impl ControlSend, name: Vec<u8>) -> HandlerOutcome {
    control.reply(&name, ControlMessage::ClientReplyFailure { name });
    HandlerOutcome::Consume
}

pub async fn handle_push(
    storage: &Storage,
    transfers: &mut TransferManager,
    overlay: &impl OverlaySend,
    reply_addr: Ipv6Addr,
    reply_port: u16,
    name: Vec<u8>,
) -> HandlerOutcome {
    if storage.exists(&name).await {
        tracing::debug!(name = %String::from_utf8_lossy(&name), "already have pushed file, dropping");
        return HandlerOutcome::Drop;
    }
    let reply_to = Endpoint::new(reply_addr, reply_port);
    overlay.send_to(reply_to, Message::PushReply { name: name.clone() });
    if let Err(e) = transfers.start_recv(reply_to, name) {
        tracing::warn!(error = %e, "failed to start receive-transfer for push");
    }
    HandlerOutcome::Consume
}

pub fn handle_push_reply(transfers: &mut TransferManager, local: Endpoint, name: Vec<u8>) -> HandlerOutcome {
    if let Err(e) = transfers.start_send(local, name) {
        tracing::warn!(error = %e, "failed to start send-transfer for push reply");
    }
    HandlerOutcome::Consume
}

/// `ClientRequest(name)` from the control channel (spec §4.4 table, last
/// row): satisfy locally if possible, else originate a `Query` toward
/// `SHA-1(name)`.
pub async fn client_request(
    storage: &Storage,
    control: &impl ControlSend,
    local: Endpoint,
    name: Vec<u8>,
) -> Option<(Message, Id)> {
    if storage.exists(&name).await {
        control.reply(&name, ControlMessage::ClientReplyLocal { name });
        None
    } else {
        let id = Id::from_sha1(&name);
        let query = Message::Query { reply_addr: local.addr, reply_port: local.port, name };
        Some((query, id))
    }
}

/// Runs when a receive-Transfer finishes — the "on success"/"on failure"
/// continuations spec §4.4 attaches to `QueryReplySuccess` handling.
pub fn on_receive_transfer_complete(
    control: &impl ControlSend,
    local: Endpoint,
    name: Vec<u8>,
    file_size: u64,
    succeeded: bool,
) -> Option<(Message, Id)> {
    if succeeded {
        control.reply(&name, ControlMessage::ClientReplySuccess { name: name.clone() });
        let id = Id::from_sha1(&name);
        // The push is routed toward its owner through the forwarding fabric
        // (`ChordTable::forward`), not addressed directly — same as an
        // originated `Query`.
        let push = Message::Push { reply_addr: local.addr, reply_port: local.port, name, file_size };
        Some((push, id))
    } else {
        control.reply(&name, ControlMessage::ClientReplyFailure { name });
        None
    }
}

/// Direction-agnostic completion bookkeeping shared by all transfer kinds:
/// only receive-direction completions trigger further DHT action.
pub fn is_actionable_completion(direction: TransferDirection) -> bool {
    matches!(direction, TransferDirection::Recv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Node;
    use std::cell::RefCell;
    use std::net::Ipv6Addr;
    use std::sync::Mutex;

    struct FakeChord {
        local: Node,
        local_ids: Vec<Id>,
    }
    impl ChordTable for FakeChord {
        fn is_local(&self, id: &Id) -> bool {
            self.local_ids.contains(id)
        }
        fn forward(&self, _payload: bytes::Bytes, _toward: Id) {}
        fn local_node(&self) -> Node {
            self.local
        }
        fn fingers_snapshot(&self) -> Vec<Node> {
            vec![]
        }
    }

    struct RecordingOverlay {
        sent: Mutex<Vec<(Endpoint, Message)>>,
    }
    impl OverlaySend for RecordingOverlay {
        fn send_to(&self, endpoint: Endpoint, message: Message) {
            self.sent.lock().unwrap().push((endpoint, message));
        }
    }

    struct RecordingControl {
        replies: RefCell<Vec<(Vec<u8>, ControlMessage)>>,
    }
    impl ControlSend for RecordingControl {
        fn reply(&self, name: &[u8], message: ControlMessage) {
            self.replies.borrow_mut().push((name.to_vec(), message));
        }
    }

    fn storage() -> (Storage, std::path::PathBuf) {
        let mut p = std::env::temp_dir();
        p.push(format!("dhash-node-dht-test-{}-{}", std::process::id(), rand_suffix()));
        std::fs::create_dir_all(&p).unwrap();
        (Storage::new(p.clone()), p)
    }

    fn rand_suffix() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static N: AtomicU64 = AtomicU64::new(0);
        N.fetch_add(1, Ordering::Relaxed)
    }

    #[test]
    fn empty_query_name_is_dropped() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (storage, dir) = storage();
            let local = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
            let chord = FakeChord { local: Node::new(local), local_ids: vec![] };
            let overlay = RecordingOverlay { sent: Mutex::new(vec![]) };
            let (mut transfers, _rx) = TransferManager::new(storage.clone());
            let counters = Counters::new();
            let outcome = handle_query(
                &chord,
                &storage,
                &mut transfers,
                &counters,
                local,
                &overlay,
                Ipv6Addr::LOCALHOST,
                9001,
                vec![],
            )
            .await;
            assert_eq!(outcome, HandlerOutcome::Drop);
            assert!(overlay.sent.lock().unwrap().is_empty());
            std::fs::remove_dir_all(dir).ok();
        });
    }

    #[test]
    fn query_for_non_local_missing_file_is_forwarded() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (storage, dir) = storage();
            let local = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
            // No id considered local, so a missing file must be forwarded.
            let chord = FakeChord { local: Node::new(local), local_ids: vec![] };
            let overlay = RecordingOverlay { sent: Mutex::new(vec![]) };
            let (mut transfers, _rx) = TransferManager::new(storage.clone());
            let counters = Counters::new();
            let outcome = handle_query(
                &chord,
                &storage,
                &mut transfers,
                &counters,
                local,
                &overlay,
                Ipv6Addr::LOCALHOST,
                9001,
                b"missing.bin".to_vec(),
            )
            .await;
            assert!(matches!(outcome, HandlerOutcome::Forward { .. }));
            assert!(overlay.sent.lock().unwrap().is_empty());
            std::fs::remove_dir_all(dir).ok();
        });
    }

    #[test]
    fn query_for_local_missing_file_replies_failure() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (storage, dir) = storage();
            let local = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
            let id = Id::from_sha1(b"missing.bin");
            let chord = FakeChord { local: Node::new(local), local_ids: vec![id] };
            let overlay = RecordingOverlay { sent: Mutex::new(vec![]) };
            let (mut transfers, _rx) = TransferManager::new(storage.clone());
            let counters = Counters::new();
            let outcome = handle_query(
                &chord,
                &storage,
                &mut transfers,
                &counters,
                local,
                &overlay,
                Ipv6Addr::LOCALHOST,
                9001,
                b"missing.bin".to_vec(),
            )
            .await;
            assert_eq!(outcome, HandlerOutcome::Consume);
            assert_eq!(counters.routing_errors.load(std::sync::atomic::Ordering::Relaxed), 1);
            let sent = overlay.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert!(matches!(sent[0].1, Message::QueryReplyFailure { .. }));
            std::fs::remove_dir_all(dir).ok();
        });
    }

    #[test]
    fn push_for_already_local_file_is_dropped() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (storage, dir) = storage();
            {
                use tokio::io::AsyncWriteExt;
                let mut f = storage.create_temp(b"have.bin").await.unwrap();
                f.write_all(b"x").await.unwrap();
                storage.finalize(b"have.bin").await.unwrap();
            }
            let overlay = RecordingOverlay { sent: Mutex::new(vec![]) };
            let (mut transfers, _rx) = TransferManager::new(storage.clone());
            let outcome = handle_push(
                &storage,
                &mut transfers,
                &overlay,
                Ipv6Addr::LOCALHOST,
                9001,
                b"have.bin".to_vec(),
            )
            .await;
            assert_eq!(outcome, HandlerOutcome::Drop);
            assert!(overlay.sent.lock().unwrap().is_empty());
            std::fs::remove_dir_all(dir).ok();
        });
    }

    #[test]
    fn receive_success_emits_client_reply_success_and_push() {
        let local = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
        let control = RecordingControl { replies: RefCell::new(vec![]) };
        let outcome = on_receive_transfer_complete(&control, local, b"f.bin".to_vec(), 10, true);
        assert!(matches!(outcome, Some((Message::Push { .. }, _))));
        let replies = control.replies.borrow();
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0].1, ControlMessage::ClientReplySuccess { .. }));
    }

    #[test]
    fn receive_failure_emits_client_reply_failure_and_no_push() {
        let local = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
        let control = RecordingControl { replies: RefCell::new(vec![]) };
        let outcome = on_receive_transfer_complete(&control, local, b"f.bin".to_vec(), 0, false);
        assert!(outcome.is_none());
        let replies = control.replies.borrow();
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0].1, ControlMessage::ClientReplyFailure { .. }));
    }
}
