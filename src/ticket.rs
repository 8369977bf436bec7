//! Capability tickets: short-lived, context-bound tags that authenticate a
//! request/reply pair without any per-peer session state (spec §4.2).
//!
//! Grounded on `pack_ticket`/`verify_ticket` in `original_source/src/crypt.c`:
//! `tag = SHA1(time || context-bytes || process-secret)[..HASH_LEN]`, checked
//! for length match and `now - time <= TICKET_TIMEOUT` before a constant-time
//! tag comparison.

use crate::codec::{self, Reader};
use crate::endpoint::Endpoint;
use crate::error::{CodecError, TicketError};
use crate::id::Id;
use bytes::BytesMut;
use rand::RngCore;
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Truncation length applied to the SHA-1 tag (spec §4.2 design default,
/// and §8 REDESIGN FLAGS: "pick one length and use it consistently").
pub const HASH_LEN: usize = 20;

/// Replay window, in seconds (spec §4.1 design default).
pub const TICKET_TIMEOUT: u64 = 60;

/// The process-wide secret tickets are salted with. Generated once from a
/// CSPRNG at startup, never rotated, zeroed on drop (spec §4.2 lifecycle).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ProcessSecret([u8; 32]);

impl ProcessSecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        ProcessSecret(bytes)
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ProcessSecret(bytes)
    }
}

/// A packed ticket: `{time: u32, tag: HASH_LEN bytes}` (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub time: u32,
    pub tag: Vec<u8>,
}

impl Ticket {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(4 + self.tag.len());
        codec::write_u32(&mut buf, self.time);
        buf.extend_from_slice(&self.tag);
        buf
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Ticket, CodecError> {
        let time = r.read_u32()?;
        if r.remaining() < HASH_LEN {
            return Err(CodecError::Truncated { needed: HASH_LEN - r.remaining() });
        }
        let mut tag = vec![0u8; HASH_LEN];
        for byte in tag.iter_mut() {
            *byte = r.read_u8()?;
        }
        Ok(Ticket { time, tag })
    }
}

/// The context fields a ticket binds to, per message kind (spec §6, "Ticket
/// binding context per kind"). Each variant serializes to exactly the bytes
/// the corresponding handler can independently recompute on the reply path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketContext {
    /// Bare kind byte only — no additional binding (e.g. a fresh `AddrDiscover`).
    Kind(u8),
    /// `(kind, addr)` — binds `AddrDiscoverReply`.
    KindAddr(u8, std::net::Ipv6Addr),
    /// `(kind, addr, port)` — binds `FindSuccessorReply`.
    KindAddrPort(u8, std::net::Ipv6Addr, u16),
    /// `(kind, time)` — binds `Pong`.
    KindTime(u8, u64),
    /// `(kind, id)` — used for query/push reply binding in the core DHT path.
    KindId(u8, Id),
}

impl TicketContext {
    fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        match self {
            TicketContext::Kind(k) => codec::write_u8(&mut buf, *k),
            TicketContext::KindAddr(k, addr) => {
                codec::write_u8(&mut buf, *k);
                codec::write_addr(&mut buf, addr);
            }
            TicketContext::KindAddrPort(k, addr, port) => {
                codec::write_u8(&mut buf, *k);
                codec::write_addr(&mut buf, addr);
                codec::write_u16(&mut buf, *port);
            }
            TicketContext::KindTime(k, time) => {
                codec::write_u8(&mut buf, *k);
                codec::write_u64(&mut buf, *time);
            }
            TicketContext::KindId(k, id) => {
                codec::write_u8(&mut buf, *k);
                codec::write_id(&mut buf, id);
            }
        }
        buf
    }
}

pub fn context_for_endpoint(kind: u8, endpoint: &Endpoint) -> TicketContext {
    TicketContext::KindAddrPort(kind, endpoint.addr, endpoint.port)
}

/// Issues and validates tickets against the process secret. `now` is an
/// explicit parameter rather than an internal clock read, so callers (and
/// tests) control time deterministically (SPEC_FULL §A.9).
pub struct TicketAuthenticator {
    secret: ProcessSecret,
    timeout_secs: u64,
}

impl TicketAuthenticator {
    pub fn new(secret: ProcessSecret) -> Self {
        TicketAuthenticator { secret, timeout_secs: TICKET_TIMEOUT }
    }

    /// Overrides the default replay window (spec §4.1 "design default...
    /// configurable").
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn hash(time: u32, context: &TicketContext, secret: &[u8; 32]) -> Vec<u8> {
        let mut hasher = Sha1::new();
        hasher.update(time.to_be_bytes());
        hasher.update(context.to_bytes());
        hasher.update(secret);
        let digest = hasher.finalize();
        digest[..HASH_LEN].to_vec()
    }

    pub fn pack(&self, now: u32, context: &TicketContext) -> Ticket {
        let tag = Self::hash(now, context, &self.secret.0);
        Ticket { time: now, tag }
    }

    /// Verifies `ticket` was issued for exactly `context`, within the replay
    /// window measured from `now` (spec §4.2, §4.1 testable properties 1-2).
    pub fn verify(
        &self,
        ticket: &Ticket,
        context: &TicketContext,
        now: u32,
    ) -> Result<(), TicketError> {
        if ticket.tag.len() != HASH_LEN {
            return Err(TicketError::HashLenMismatch { expected: HASH_LEN, found: ticket.tag.len() });
        }
        let elapsed = now.wrapping_sub(ticket.time) as u64;
        if elapsed > self.timeout_secs {
            return Err(TicketError::Expired { issued: ticket.time, now, timeout: self.timeout_secs });
        }
        let expected = Self::hash(ticket.time, context, &self.secret.0);
        if constant_time_eq(&expected, &ticket.tag) {
            Ok(())
        } else {
            Err(TicketError::TagMismatch)
        }
    }
}

/// Compares two byte slices in time independent of where they first differ,
/// per spec §4.2 "compare in constant time".
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn auth() -> TicketAuthenticator {
        TicketAuthenticator::new(ProcessSecret::from_bytes([7u8; 32]))
    }

    #[test]
    fn roundtrip_succeeds_for_matching_context() {
        let a = auth();
        let ctx = TicketContext::Kind(4);
        let ticket = a.pack(1000, &ctx);
        assert!(a.verify(&ticket, &ctx, 1000).is_ok());
    }

    #[test]
    fn roundtrip_fails_for_mismatched_context() {
        let a = auth();
        let ctx = context_for_endpoint(1, &Endpoint::new(Ipv6Addr::LOCALHOST, 9000));
        let ticket = a.pack(1000, &ctx);
        let wrong = context_for_endpoint(1, &Endpoint::new(Ipv6Addr::LOCALHOST, 9001));
        match a.verify(&ticket, &wrong, 1000) {
            Err(TicketError::TagMismatch) => {}
            other => panic!("expected TagMismatch, got {other:?}"),
        }
    }

    #[test]
    fn verifies_within_replay_window_and_fails_after() {
        let a = auth();
        let ctx = TicketContext::Kind(9);
        let ticket = a.pack(1000, &ctx);
        assert!(a.verify(&ticket, &ctx, 1000 + TICKET_TIMEOUT as u32).is_ok());
        match a.verify(&ticket, &ctx, 1000 + TICKET_TIMEOUT as u32 + 1) {
            Err(TicketError::Expired { .. }) => {}
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn forged_ticket_with_current_time_but_wrong_binding_is_rejected() {
        // Scenario 4: attacker crafts a ticket for the current time but over
        // a context they don't control the binding for.
        let a = auth();
        let real_ctx = TicketContext::KindAddrPort(4, Ipv6Addr::LOCALHOST, 9000);
        let forged_ctx = TicketContext::KindAddrPort(4, Ipv6Addr::LOCALHOST, 31337);
        let ticket = a.pack(500, &real_ctx);
        assert!(a.verify(&ticket, &forged_ctx, 500).is_err());
    }

    #[test]
    fn wrong_hash_len_is_rejected() {
        let a = auth();
        let ctx = TicketContext::Kind(0);
        let mut ticket = a.pack(10, &ctx);
        ticket.tag.pop();
        match a.verify(&ticket, &ctx, 10) {
            Err(TicketError::HashLenMismatch { .. }) => {}
            other => panic!("expected HashLenMismatch, got {other:?}"),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let a = auth();
        let ticket = a.pack(42, &TicketContext::Kind(1));
        let bytes = ticket.encode();
        let mut r = Reader::new(&bytes);
        let decoded = Ticket::decode(&mut r).unwrap();
        assert_eq!(decoded, ticket);
    }
}
