//! RCON wire framing
//!
//! ```text
//! | length: i32 LE | id: i32 LE | type: i32 LE | payload | 0x00 0x00 |
//! ```
//!
//! `length` counts everything after itself.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Login request carrying the password
pub const PACKET_TYPE_AUTH: i32 = 3;

/// Command request carrying the command text
pub const PACKET_TYPE_COMMAND: i32 = 2;

/// Id the server answers with when the password is wrong
pub const AUTH_FAILURE_ID: i32 = -1;

/// id + type + two trailing NULs
const MIN_LENGTH: i32 = 10;

const MAX_LENGTH: i32 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(id: i32, kind: i32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            kind,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let length = 4 + 4 + self.payload.len() + 2;
        let mut buf = Vec::with_capacity(4 + length);
        buf.extend_from_slice(&(length as i32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await
    }

    /// Read one packet. The payload keeps its NUL padding.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Self> {
        let length = reader.read_i32_le().await?;
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid RCON packet length {}", length),
            ));
        }
        let id = reader.read_i32_le().await?;
        let kind = reader.read_i32_le().await?;

        let mut payload = vec![0u8; (length - 8) as usize];
        reader.read_exact(&mut payload).await?;

        Ok(Self { id, kind, payload })
    }

    /// Payload as text with trailing NUL padding removed
    pub fn text(&self) -> String {
        let end = self
            .payload
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let bytes = Packet::new(7, PACKET_TYPE_COMMAND, "list").encode();

        assert_eq!(&bytes[0..4], &14i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..16], b"list");
        assert_eq!(&bytes[16..], &[0, 0]);
    }

    #[tokio::test]
    async fn test_read_strips_padding_in_text() {
        let bytes = Packet::new(1, 0, "There are 0 players").encode();
        let packet = Packet::read_from(&mut bytes.as_slice()).await.unwrap();

        assert_eq!(packet.id, 1);
        assert_eq!(packet.payload.len(), "There are 0 players".len() + 2);
        assert_eq!(packet.text(), "There are 0 players");
    }

    #[tokio::test]
    async fn test_read_rejects_bad_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4i32.to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);

        let err = Packet::read_from(&mut bytes.as_slice()).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_read_truncated() {
        let bytes = Packet::new(1, 0, "hello").encode();
        let err = Packet::read_from(&mut &bytes[..bytes.len() - 3])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
