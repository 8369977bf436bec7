//! Network-level peer identity (spec §3, "Endpoint" and "Node").

use crate::id::Id;
use std::net::Ipv6Addr;

/// `{addr, port}` — the stable identity of a peer at the network layer.
///
/// IPv4 peers are represented as IPv4-mapped IPv6 addresses
/// (`::ffff:a.b.c.d`), matching the 128-bit address field on the wire (spec
/// §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: Ipv6Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: Ipv6Addr, port: u16) -> Self {
        Endpoint { addr, port }
    }

    /// `SHA-1(addr || htons(port))` (spec §3).
    pub fn id(&self) -> Id {
        let mut buf = [0u8; 18];
        buf[..16].copy_from_slice(&self.addr.octets());
        buf[16..].copy_from_slice(&self.port.to_be_bytes());
        Id::from_sha1(&buf)
    }

    /// Confirms a claimed identifier actually matches this endpoint's
    /// derived id, rather than trusting it blindly (SPEC_FULL §B,
    /// `verify_address_id` in the original `crypt.c`).
    pub fn verify_id(&self, claimed: &Id) -> bool {
        &self.id() == claimed
    }

    /// The bulk-transfer sibling port for this endpoint (spec §4.4,
    /// "port convention").
    pub fn bulk_port(&self) -> u16 {
        self.port.wrapping_add(1)
    }

    pub fn with_port(&self, port: u16) -> Endpoint {
        Endpoint { addr: self.addr, port }
    }

    pub fn socket_addr(&self) -> std::net::SocketAddrV6 {
        std::net::SocketAddrV6::new(self.addr, self.port, 0, 0)
    }
}

/// A peer in the overlay: its identifier plus its network endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub id: Id,
    pub endpoint: Endpoint,
}

impl Node {
    pub fn new(endpoint: Endpoint) -> Self {
        Node { id: endpoint.id(), endpoint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressing_matches_sha1_of_addr_and_port() {
        let ep = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
        let mut expected = [0u8; 18];
        expected[..16].copy_from_slice(&Ipv6Addr::LOCALHOST.octets());
        expected[16..].copy_from_slice(&9000u16.to_be_bytes());
        assert_eq!(ep.id(), Id::from_sha1(&expected));
    }

    #[test]
    fn verify_id_accepts_correct_and_rejects_wrong() {
        let ep = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
        assert!(ep.verify_id(&ep.id()));
        let other = Endpoint::new(Ipv6Addr::LOCALHOST, 9001);
        assert!(!ep.verify_id(&other.id()));
    }

    #[test]
    fn bulk_port_is_port_plus_one() {
        let ep = Endpoint::new(Ipv6Addr::LOCALHOST, 9000);
        assert_eq!(ep.bulk_port(), 9001);
    }

    #[test]
    fn node_id_derived_from_endpoint() {
        let ep = Endpoint::new(Ipv6Addr::LOCALHOST, 1234);
        let node = Node::new(ep);
        assert_eq!(node.id, ep.id());
    }
}
