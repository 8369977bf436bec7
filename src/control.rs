//! The control channel: a local stream socket clients use to submit file
//! requests and receive replies (spec §6 "Control channel").
//!
//! Each message is length-prefixed and carries a one-byte code plus a
//! file-name byte string. Code 0 is overloaded by direction — a
//! client-to-node message is always `ClientRequest`, a node-to-client
//! message with code 0 is always `ClientReplyLocal` — so decoding takes an
//! explicit `Direction` rather than guessing from the code alone.

use crate::codec::{self, Reader};
use crate::error::CodecError;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToNode,
    NodeToClient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// code 0, client → node.
    ClientRequest { name: Vec<u8> },
    /// code 0, node → client: the file was already present locally.
    ClientReplyLocal { name: Vec<u8> },
    /// code 1, node → client: resolved across the ring.
    ClientReplySuccess { name: Vec<u8> },
    /// code 2, node → client: no owner could produce the file.
    ClientReplyFailure { name: Vec<u8> },
}

impl ControlMessage {
    fn code(&self) -> u8 {
        match self {
            ControlMessage::ClientRequest { .. } | ControlMessage::ClientReplyLocal { .. } => 0,
            ControlMessage::ClientReplySuccess { .. } => 1,
            ControlMessage::ClientReplyFailure { .. } => 2,
        }
    }

    fn name(&self) -> &[u8] {
        match self {
            ControlMessage::ClientRequest { name }
            | ControlMessage::ClientReplyLocal { name }
            | ControlMessage::ClientReplySuccess { name }
            | ControlMessage::ClientReplyFailure { name } => name,
        }
    }

    fn encode_frame(&self) -> Result<BytesMut, CodecError> {
        let mut body = BytesMut::new();
        codec::write_u8(&mut body, self.code());
        codec::write_bytes(&mut body, self.name())?;
        let mut framed = BytesMut::with_capacity(2 + body.len());
        codec::write_u16(&mut framed, body.len() as u16);
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    fn decode_body(body: &[u8], direction: Direction) -> Result<ControlMessage, CodecError> {
        let mut r = Reader::new(body);
        let code = r.read_u8()?;
        let name = r.read_bytes()?;
        let msg = match (code, direction) {
            (0, Direction::ClientToNode) => ControlMessage::ClientRequest { name },
            (0, Direction::NodeToClient) => ControlMessage::ClientReplyLocal { name },
            (1, _) => ControlMessage::ClientReplySuccess { name },
            (2, _) => ControlMessage::ClientReplyFailure { name },
            (other, _) => return Err(CodecError::UnknownKind(other as u32)),
        };
        Ok(msg)
    }

    pub async fn write(&self, stream: &mut TcpStream) -> std::io::Result<()> {
        let frame = self.encode_frame().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        stream.write_all(&frame).await
    }

    pub async fn read(stream: &mut TcpStream, direction: Direction) -> std::io::Result<Option<ControlMessage>> {
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;
        Self::decode_body(&body, direction)
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_request_roundtrips_body() {
        let msg = ControlMessage::ClientRequest { name: b"file.txt".to_vec() };
        let frame = msg.encode_frame().unwrap();
        let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        let decoded = ControlMessage::decode_body(&frame[2..2 + len], Direction::ClientToNode).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn code_zero_disambiguates_by_direction() {
        let frame_body = {
            let mut b = BytesMut::new();
            codec::write_u8(&mut b, 0);
            codec::write_bytes(&mut b, b"x").unwrap();
            b
        };
        assert_eq!(
            ControlMessage::decode_body(&frame_body, Direction::ClientToNode).unwrap(),
            ControlMessage::ClientRequest { name: b"x".to_vec() }
        );
        assert_eq!(
            ControlMessage::decode_body(&frame_body, Direction::NodeToClient).unwrap(),
            ControlMessage::ClientReplyLocal { name: b"x".to_vec() }
        );
    }

    #[test]
    fn unknown_code_is_rejected() {
        let mut b = BytesMut::new();
        codec::write_u8(&mut b, 9);
        codec::write_bytes(&mut b, b"x").unwrap();
        assert!(matches!(
            ControlMessage::decode_body(&b, Direction::NodeToClient),
            Err(CodecError::UnknownKind(9))
        ));
    }
}
