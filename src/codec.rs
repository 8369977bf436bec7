//! Primitive packers and a strict, cursor-based unpacker (spec §4.1).
//!
//! Packing is total: given a valid value it always produces the same bytes.
//! Unpacking is strict: it distinguishes a truncated buffer from a malformed
//! field from (at the message layer, not here) an unknown message kind, per
//! [`CodecError`].
//!
//! Multi-byte integers are big-endian — `bytes::Buf`/`BufMut`'s default
//! `get_u16`/`put_u16` etc. are already big-endian, which is why this module
//! leans on `bytes` rather than hand-rolling shifts.

use crate::endpoint::Endpoint;
use crate::error::CodecError;
use crate::id::{Id, ID_LEN};
use bytes::{Buf, BufMut, BytesMut};
use std::net::Ipv6Addr;

/// Size ceiling per packet (spec §4.1).
pub const BUFSIZE: usize = 65_535;

/// A cursor over an immutable byte slice that fails closed: every read checks
/// remaining length first and returns [`CodecError::Truncated`] rather than
/// panicking.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining_slice(&self) -> &'a [u8] {
        self.buf
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.buf.len() < n {
            Err(CodecError::Truncated { needed: n - self.buf.len() })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::Malformed(format!("expected 0/1 bool, got {other}"))),
        }
    }

    /// A 160-bit identifier (20 raw bytes, spec §3).
    pub fn read_id(&mut self) -> Result<Id, CodecError> {
        self.need(ID_LEN)?;
        let mut bytes = [0u8; ID_LEN];
        self.buf.copy_to_slice(&mut bytes);
        Ok(Id::from_bytes(bytes))
    }

    /// A 128-bit address (16 raw bytes, IPv6 or IPv4-mapped, spec §3).
    pub fn read_addr(&mut self) -> Result<Ipv6Addr, CodecError> {
        self.need(16)?;
        let mut bytes = [0u8; 16];
        self.buf.copy_to_slice(&mut bytes);
        Ok(Ipv6Addr::from(bytes))
    }

    /// A length-prefixed byte string: a `u16` length followed by that many
    /// raw bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u16()? as usize;
        self.need(len)?;
        let mut out = vec![0u8; len];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Fails unless every byte of the buffer has been consumed — used by
    /// callers that want to reject trailing garbage instead of silently
    /// ignoring it (the codec contract permits retaining trailing bytes only
    /// for diagnostic print, never for structured decoding).
    pub fn expect_exhausted(&self) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Malformed(format!("{} trailing byte(s)", self.buf.len())))
        }
    }
}

pub fn write_u8(buf: &mut BytesMut, v: u8) {
    buf.put_u8(v);
}

pub fn write_u16(buf: &mut BytesMut, v: u16) {
    buf.put_u16(v);
}

pub fn write_u32(buf: &mut BytesMut, v: u32) {
    buf.put_u32(v);
}

pub fn write_u64(buf: &mut BytesMut, v: u64) {
    buf.put_u64(v);
}

pub fn write_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(v as u8);
}

pub fn write_id(buf: &mut BytesMut, id: &Id) {
    buf.extend_from_slice(id.as_bytes());
}

pub fn write_addr(buf: &mut BytesMut, addr: &Ipv6Addr) {
    buf.extend_from_slice(&addr.octets());
}

/// Writes a length-prefixed byte string. Per the `BUFSIZE` ceiling a `u16`
/// length is always sufficient for a single field.
pub fn write_bytes(buf: &mut BytesMut, data: &[u8]) -> Result<(), CodecError> {
    if data.len() > u16::MAX as usize {
        return Err(CodecError::Malformed(format!(
            "byte string of {} bytes exceeds u16 length prefix",
            data.len()
        )));
    }
    buf.put_u16(data.len() as u16);
    buf.extend_from_slice(data);
    Ok(())
}

/// Header-wrapped framing: `{version: u32, type: u32, payload: bytes}`
/// (spec §6).
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u32,
    pub msg_type: u32,
    pub payload: Vec<u8>,
}

pub const WIRE_VERSION: u32 = 1;

impl Header {
    pub fn encode(&self) -> Result<BytesMut, CodecError> {
        let mut buf = BytesMut::with_capacity(8 + self.payload.len());
        write_u32(&mut buf, self.version);
        write_u32(&mut buf, self.msg_type);
        write_bytes(&mut buf, &self.payload)?;
        if buf.len() > BUFSIZE {
            return Err(CodecError::Malformed(format!(
                "packet of {} bytes exceeds BUFSIZE {BUFSIZE}",
                buf.len()
            )));
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Header, CodecError> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32()?;
        let msg_type = r.read_u32()?;
        let payload = r.read_bytes()?;
        Ok(Header { version, msg_type, payload })
    }
}
