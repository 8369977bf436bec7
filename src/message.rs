//! The overlay wire protocol: 15 message kinds carried inside a [`Header`]
//! (spec §6). Kinds 0-9 belong to the Chord collaborator's own routing
//! protocol (out of scope for DHT processing logic per spec §1, but still
//! framed and authenticated uniformly here); kinds 10-14 are the core
//! query/push state machine this crate implements in full (`dht.rs`).

use crate::codec::{self, Reader, Header, WIRE_VERSION};
use crate::error::CodecError;
use crate::ticket::Ticket;
use bytes::BytesMut;
use std::net::Ipv6Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    AddrDiscover { ticket: Ticket },
    AddrDiscoverReply { ticket: Ticket, addr: Ipv6Addr },
    Data { id: crate::id::Id, ttl: u8, last: bool, data: Vec<u8> },
    FindSuccessor { ticket: Ticket, ttl: u8, addr: Ipv6Addr, port: u16 },
    FindSuccessorReply { ticket: Ticket, addr: Ipv6Addr, port: u16 },
    Stabilize { addr: Ipv6Addr, port: u16 },
    StabilizeReply { addr: Ipv6Addr, port: u16 },
    Notify,
    Ping { ticket: Ticket, time: u64 },
    Pong { ticket: Ticket, time: u64 },

    Query { reply_addr: Ipv6Addr, reply_port: u16, name: Vec<u8> },
    QueryReplySuccess { file_size: u64, name: Vec<u8> },
    QueryReplyFailure { name: Vec<u8> },
    Push { reply_addr: Ipv6Addr, reply_port: u16, name: Vec<u8>, file_size: u64 },
    PushReply { name: Vec<u8> },
}

impl Message {
    pub fn kind(&self) -> u32 {
        match self {
            Message::AddrDiscover { .. } => 0,
            Message::AddrDiscoverReply { .. } => 1,
            Message::Data { .. } => 2,
            Message::FindSuccessor { .. } => 3,
            Message::FindSuccessorReply { .. } => 4,
            Message::Stabilize { .. } => 5,
            Message::StabilizeReply { .. } => 6,
            Message::Notify => 7,
            Message::Ping { .. } => 8,
            Message::Pong { .. } => 9,
            Message::Query { .. } => 10,
            Message::QueryReplySuccess { .. } => 11,
            Message::QueryReplyFailure { .. } => 12,
            Message::Push { .. } => 13,
            Message::PushReply { .. } => 14,
        }
    }

    fn encode_payload(&self) -> Result<BytesMut, CodecError> {
        let mut buf = BytesMut::new();
        match self {
            Message::AddrDiscover { ticket } => {
                buf.extend_from_slice(&ticket.encode());
            }
            Message::AddrDiscoverReply { ticket, addr } => {
                buf.extend_from_slice(&ticket.encode());
                codec::write_addr(&mut buf, addr);
            }
            Message::Data { id, ttl, last, data } => {
                codec::write_id(&mut buf, id);
                codec::write_u8(&mut buf, *ttl);
                codec::write_bool(&mut buf, *last);
                codec::write_bytes(&mut buf, data)?;
            }
            Message::FindSuccessor { ticket, ttl, addr, port } => {
                buf.extend_from_slice(&ticket.encode());
                codec::write_u8(&mut buf, *ttl);
                codec::write_addr(&mut buf, addr);
                codec::write_u16(&mut buf, *port);
            }
            Message::FindSuccessorReply { ticket, addr, port } => {
                buf.extend_from_slice(&ticket.encode());
                codec::write_addr(&mut buf, addr);
                codec::write_u16(&mut buf, *port);
            }
            Message::Stabilize { addr, port } | Message::StabilizeReply { addr, port } => {
                codec::write_addr(&mut buf, addr);
                codec::write_u16(&mut buf, *port);
            }
            Message::Notify => {}
            Message::Ping { ticket, time } | Message::Pong { ticket, time } => {
                buf.extend_from_slice(&ticket.encode());
                codec::write_u64(&mut buf, *time);
            }
            Message::Query { reply_addr, reply_port, name } => {
                codec::write_addr(&mut buf, reply_addr);
                codec::write_u16(&mut buf, *reply_port);
                codec::write_bytes(&mut buf, name)?;
            }
            Message::QueryReplySuccess { file_size, name } => {
                codec::write_u64(&mut buf, *file_size);
                codec::write_bytes(&mut buf, name)?;
            }
            Message::QueryReplyFailure { name } => {
                codec::write_bytes(&mut buf, name)?;
            }
            Message::Push { reply_addr, reply_port, name, file_size } => {
                codec::write_addr(&mut buf, reply_addr);
                codec::write_u16(&mut buf, *reply_port);
                codec::write_bytes(&mut buf, name)?;
                codec::write_u64(&mut buf, *file_size);
            }
            Message::PushReply { name } => {
                codec::write_bytes(&mut buf, name)?;
            }
        }
        Ok(buf)
    }

    pub fn encode(&self) -> Result<BytesMut, CodecError> {
        let payload = self.encode_payload()?;
        Header { version: WIRE_VERSION, msg_type: self.kind(), payload: payload.to_vec() }.encode()
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
        let header = Header::decode(bytes)?;
        let mut r = Reader::new(&header.payload);
        let msg = match header.msg_type {
            0 => Message::AddrDiscover { ticket: Ticket::decode(&mut r)? },
            1 => {
                let ticket = Ticket::decode(&mut r)?;
                let addr = r.read_addr()?;
                Message::AddrDiscoverReply { ticket, addr }
            }
            2 => {
                let id = r.read_id()?;
                let ttl = r.read_u8()?;
                let last = r.read_bool()?;
                let data = r.read_bytes()?;
                Message::Data { id, ttl, last, data }
            }
            3 => {
                let ticket = Ticket::decode(&mut r)?;
                let ttl = r.read_u8()?;
                let addr = r.read_addr()?;
                let port = r.read_u16()?;
                Message::FindSuccessor { ticket, ttl, addr, port }
            }
            4 => {
                let ticket = Ticket::decode(&mut r)?;
                let addr = r.read_addr()?;
                let port = r.read_u16()?;
                Message::FindSuccessorReply { ticket, addr, port }
            }
            5 => {
                let addr = r.read_addr()?;
                let port = r.read_u16()?;
                Message::Stabilize { addr, port }
            }
            6 => {
                let addr = r.read_addr()?;
                let port = r.read_u16()?;
                Message::StabilizeReply { addr, port }
            }
            7 => Message::Notify,
            8 => {
                let ticket = Ticket::decode(&mut r)?;
                let time = r.read_u64()?;
                Message::Ping { ticket, time }
            }
            9 => {
                let ticket = Ticket::decode(&mut r)?;
                let time = r.read_u64()?;
                Message::Pong { ticket, time }
            }
            10 => {
                let reply_addr = r.read_addr()?;
                let reply_port = r.read_u16()?;
                let name = r.read_bytes()?;
                Message::Query { reply_addr, reply_port, name }
            }
            11 => {
                let file_size = r.read_u64()?;
                let name = r.read_bytes()?;
                Message::QueryReplySuccess { file_size, name }
            }
            12 => Message::QueryReplyFailure { name: r.read_bytes()? },
            13 => {
                let reply_addr = r.read_addr()?;
                let reply_port = r.read_u16()?;
                let name = r.read_bytes()?;
                let file_size = r.read_u64()?;
                Message::Push { reply_addr, reply_port, name, file_size }
            }
            14 => Message::PushReply { name: r.read_bytes()? },
            other => return Err(CodecError::UnknownKind(other)),
        };
        Ok(msg)
    }
}
