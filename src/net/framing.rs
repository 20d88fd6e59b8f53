//! Length-prefixed bincode frames
//!
//! Every message on the wire is a little-endian `u32` byte count followed by the
//! bincode body. A frame that arrives whole but does not decode leaves the stream
//! in sync, so it is reported as [`FramingError::Malformed`] and reading can go on.

use std::io;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::events::Event;
use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::protocol::{decode, encode, ClientMessage, DecodeError, EncodeError};

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("peer closed the stream")]
    ConnectionClosed,
    #[error("frame of {0} bytes is over the {max} byte limit", max = MAX_MESSAGE_SIZE)]
    Oversized(usize),
    #[error("{0}")]
    Malformed(#[from] DecodeError),
    #[error("{0}")]
    Encode(#[from] EncodeError),
    #[error("stream: {0}")]
    Io(io::Error),
}

impl From<io::Error> for FramingError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FramingError::ConnectionClosed
        } else {
            FramingError::Io(e)
        }
    }
}

impl FramingError {
    /// Whether the next frame can still be read after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FramingError::Malformed(_))
    }
}

async fn read_frame<R, T>(reader: &mut R) -> Result<T, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32_le().await? as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::Oversized(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(decode(&body)?)
}

async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<usize, FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = encode(message)?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::Oversized(body.len()));
    }

    writer.write_u32_le(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(body.len())
}

/// Next message from a client
pub async fn read_client_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ClientMessage, FramingError> {
    read_frame(reader).await
}

/// Send a message to the server. Returns the body size.
pub async fn write_client_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &ClientMessage,
) -> Result<usize, FramingError> {
    write_frame(writer, message).await
}

/// Next event from the server
pub async fn read_event<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Event, FramingError> {
    read_frame(reader).await
}

/// Send an event to a client. Returns the body size.
pub async fn write_event<W: AsyncWrite + Unpin>(
    writer: &mut W,
    event: &Event,
) -> Result<usize, FramingError> {
    write_frame(writer, event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackConfig;
    use crate::game::state::{Input, PlayerSnapshot};
    use crate::game::track::Track;
    use std::io::Cursor;
    use std::sync::Arc;

    fn hello(name: &str) -> ClientMessage {
        ClientMessage::Hello {
            name: name.to_string(),
        }
    }

    /// A frame whose body is not a valid client message
    fn garbage_frame() -> Vec<u8> {
        let mut frame = 4u32.to_le_bytes().to_vec();
        frame.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        frame
    }

    #[tokio::test]
    async fn test_client_messages_keep_order() {
        let steer = ClientMessage::Input(Input {
            up: true,
            left: true,
            ..Input::default()
        });

        let mut wire = Vec::new();
        write_client_message(&mut wire, &hello("Emerson")).await.unwrap();
        write_client_message(&mut wire, &steer).await.unwrap();

        let mut reader = Cursor::new(wire);
        assert_eq!(read_client_message(&mut reader).await.unwrap(), hello("Emerson"));
        assert_eq!(read_client_message(&mut reader).await.unwrap(), steer);
        assert!(matches!(
            read_client_message(&mut reader).await,
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_prefix_counts_body_bytes() {
        let mut wire = Vec::new();
        let written = write_event(&mut wire, &Event::Countdown(17)).await.unwrap();

        assert_eq!(wire.len(), 4 + written);
        assert_eq!(u32::from_le_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize, written);
    }

    #[tokio::test]
    async fn test_event_with_track() {
        let track = Arc::new(Track::generate_seeded(&TrackConfig::default(), 9).unwrap());
        let event = Event::Init {
            players: vec![PlayerSnapshot {
                id: 0,
                name: "Juan".to_string(),
                x: 10.0,
                y: 20.0,
                rotation: 90.0,
                progress: 0.0,
                finish_time_ms: None,
            }],
            id: 0,
            track,
        };

        let mut wire = Vec::new();
        write_event(&mut wire, &event).await.unwrap();
        assert_eq!(read_event(&mut Cursor::new(wire)).await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_recoverable() {
        let mut wire = garbage_frame();
        write_client_message(&mut wire, &hello("Jim")).await.unwrap();

        let mut reader = Cursor::new(wire);
        let err = read_client_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::Malformed(_)));
        assert!(err.is_recoverable());

        assert_eq!(read_client_message(&mut reader).await.unwrap(), hello("Jim"));
    }

    #[tokio::test]
    async fn test_oversized_prefix_is_fatal() {
        let wire = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();

        let err = read_client_message(&mut Cursor::new(wire)).await.unwrap_err();
        assert!(matches!(err, FramingError::Oversized(n) if n == MAX_MESSAGE_SIZE + 1));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_oversized_event_is_not_written() {
        let crowd: Vec<PlayerSnapshot> = (0..40_000)
            .map(|id| PlayerSnapshot {
                id,
                name: "x".repeat(24),
                x: 0.0,
                y: 0.0,
                rotation: 0.0,
                progress: 0.0,
                finish_time_ms: None,
            })
            .collect();

        let mut wire = Vec::new();
        let result = write_event(&mut wire, &Event::Update(crowd)).await;
        assert!(matches!(result, Err(FramingError::Oversized(_))));
        assert!(wire.is_empty());
    }

    #[tokio::test]
    async fn test_cut_off_frames_read_as_closed() {
        // Half a length prefix
        let err = read_event(&mut Cursor::new(vec![3u8, 0])).await.unwrap_err();
        assert!(matches!(err, FramingError::ConnectionClosed));

        // Full prefix, short body
        let mut wire = Vec::new();
        write_event(&mut wire, &Event::Leave(3)).await.unwrap();
        wire.truncate(wire.len() - 1);
        let err = read_event(&mut Cursor::new(wire)).await.unwrap_err();
        assert!(matches!(err, FramingError::ConnectionClosed));
    }
}
