//! Wire protocol for p2pshare.
//!
//! Two independent formats live here.
//!
//! ## Discovery datagrams
//!
//! Discovery uses bare ASCII tags, one per UDP datagram:
//!
//! - `DISCOVER_PEER` - probe, broadcast by a searching instance
//! - `PEER_RESPONSE` - unicast reply to a probe
//!
//! Anything else is not a discovery message and is dropped by the caller.
//!
//! ## Transfer frames
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │  Length (u32 BE) │   Payload (Length bytes)     │
//! │     4 bytes      │                              │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! A transfer is: one header frame (JSON [`TransferHeader`]), any number of
//! data frames, then a zero-length frame marking end-of-stream. A stream
//! that closes before the end-of-stream frame is truncated.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Probe tag broadcast by a searching instance.
pub const PROBE_TAG: &[u8] = b"DISCOVER_PEER";

/// Response tag sent back to the prober.
pub const RESPONSE_TAG: &[u8] = b"PEER_RESPONSE";

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum payload size of a single frame (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A decoded discovery datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMessage {
    /// "Is anyone there?"
    Probe,
    /// "I am here."
    Response,
}

impl DiscoveryMessage {
    /// Wire bytes for this message.
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Probe => PROBE_TAG,
            Self::Response => RESPONSE_TAG,
        }
    }
}

/// Wire bytes of a probe.
#[must_use]
pub const fn encode_probe() -> &'static [u8] {
    PROBE_TAG
}

/// Wire bytes of a response.
#[must_use]
pub const fn encode_response() -> &'static [u8] {
    RESPONSE_TAG
}

/// Decode a discovery datagram.
///
/// Only an exact tag match is accepted; trailing bytes, prefixes and
/// arbitrary noise yield [`Error::InvalidMessage`].
pub fn decode(bytes: &[u8]) -> Result<DiscoveryMessage> {
    if bytes == PROBE_TAG {
        Ok(DiscoveryMessage::Probe)
    } else if bytes == RESPONSE_TAG {
        Ok(DiscoveryMessage::Response)
    } else {
        Err(Error::InvalidMessage)
    }
}

/// A frame read from a transfer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A non-empty payload.
    Payload(Vec<u8>),
    /// The zero-length end-of-stream marker.
    EndOfStream,
}

/// First frame of every transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    /// File name offered by the sender (no directory components)
    pub file_name: String,
    /// Total size in bytes, when the sender knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl TransferHeader {
    /// Create a header for a file of known size.
    #[must_use]
    pub fn new(file_name: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            size: Some(size),
        }
    }
}

/// Encode a message payload to JSON bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a message payload from JSON bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a transfer header.
pub fn encode_header(header: &TransferHeader) -> Result<Vec<u8>> {
    encode_payload(header)
}

/// Decode a transfer header.
///
/// A payload that is not a valid header is a protocol error.
pub fn decode_header(data: &[u8]) -> Result<TransferHeader> {
    decode_payload(data).map_err(|e| Error::ProtocolError(format!("bad transfer header: {e}")))
}

/// Prepend the length prefix to a payload.
///
/// # Errors
///
/// Returns [`Error::FrameTooLarge`] if the payload exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let length = frame_length(payload)?;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

fn frame_length(payload: &[u8]) -> Result<u32> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge(payload.len()))
}

/// Read a complete frame from a stream.
///
/// # Errors
///
/// - [`Error::Truncated`] if the stream closes before the frame is complete,
///   including a close exactly at a frame boundary
/// - [`Error::ConnectionReset`] if the peer resets the connection
/// - [`Error::FrameTooLarge`] if the declared length is above [`MAX_FRAME_SIZE`]
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let got = read_full(reader, &mut prefix).await?;
    if got < LENGTH_PREFIX_SIZE {
        return Err(Error::Truncated {
            expected: LENGTH_PREFIX_SIZE as u64,
            received: got as u64,
        });
    }

    let length = u32::from_be_bytes(prefix) as usize;
    if length == 0 {
        return Ok(Frame::EndOfStream);
    }
    if length > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    let got = read_full(reader, &mut payload).await?;
    if got < length {
        return Err(Error::Truncated {
            expected: length as u64,
            received: got as u64,
        });
    }

    Ok(Frame::Payload(payload))
}

/// Fill `buf` until it is full or the stream reaches EOF.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::from_socket_io(e)),
        }
    }
    Ok(filled)
}

/// Write a data frame to a stream.
///
/// # Errors
///
/// Returns an error if writing fails or the payload is too large.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let length = frame_length(payload)?;

    writer
        .write_all(&length.to_be_bytes())
        .await
        .map_err(Error::from_socket_io)?;
    if !payload.is_empty() {
        writer
            .write_all(payload)
            .await
            .map_err(Error::from_socket_io)?;
    }
    writer.flush().await.map_err(Error::from_socket_io)?;

    Ok(())
}

/// Write the zero-length end-of-stream frame.
///
/// # Errors
///
/// Returns an error if writing fails.
pub async fn write_end_of_stream<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &[]).await
}

/// Read a complete frame from a stream with a timeout.
///
/// # Errors
///
/// Returns `Error::Timeout` if the operation exceeds the specified duration.
/// Returns an error if reading fails or the frame is invalid.
pub async fn read_frame_with_timeout<R>(reader: &mut R, duration: Duration) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    timeout(duration, read_frame(reader))
        .await
        .map_err(|_| Error::Timeout(duration.as_secs()))?
}

/// Write a frame to a stream with a timeout.
///
/// # Errors
///
/// Returns `Error::Timeout` if the operation exceeds the specified duration.
/// Returns an error if writing fails.
pub async fn write_frame_with_timeout<W>(
    writer: &mut W,
    payload: &[u8],
    duration: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    timeout(duration, write_frame(writer, payload))
        .await
        .map_err(|_| Error::Timeout(duration.as_secs()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tags() {
        assert_eq!(decode(b"DISCOVER_PEER").unwrap(), DiscoveryMessage::Probe);
        assert_eq!(decode(b"PEER_RESPONSE").unwrap(), DiscoveryMessage::Response);
        assert_eq!(decode(encode_probe()).unwrap(), DiscoveryMessage::Probe);
        assert_eq!(
            DiscoveryMessage::Response.as_bytes(),
            encode_response()
        );
    }

    #[test]
    fn test_decode_rejects_noise() {
        assert!(matches!(decode(b""), Err(Error::InvalidMessage)));
        assert!(matches!(decode(b"DISCOVER"), Err(Error::InvalidMessage)));
        assert!(matches!(
            decode(b"DISCOVER_PEER\n"),
            Err(Error::InvalidMessage)
        ));
        assert!(matches!(
            decode(b"peer_response"),
            Err(Error::InvalidMessage)
        ));
        assert!(matches!(decode(&[0xff; 64]), Err(Error::InvalidMessage)));
    }

    #[test]
    fn test_encode_frame_prefix() {
        let encoded = encode_frame(b"hello").expect("encode");
        assert_eq!(&encoded[..4], &[0, 0, 0, 5]);
        assert_eq!(&encoded[4..], b"hello");

        let eos = encode_frame(&[]).expect("encode");
        assert_eq!(eos, vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_read_write_frame() {
        let mut buffer = Vec::new();

        let payload = b"test payload";
        write_frame(&mut buffer, payload).await.expect("write frame");
        write_end_of_stream(&mut buffer).await.expect("write eos");

        let mut cursor = std::io::Cursor::new(buffer);
        let frame = read_frame(&mut cursor).await.expect("read frame");
        assert_eq!(frame, Frame::Payload(payload.to_vec()));

        let frame = read_frame(&mut cursor).await.expect("read eos");
        assert_eq!(frame, Frame::EndOfStream);
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let mut encoded = encode_frame(&[7u8; 100]).expect("encode");
        encoded.truncate(4 + 40);

        let mut cursor = std::io::Cursor::new(encoded);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                expected: 100,
                received: 40
            }
        ));
    }

    #[tokio::test]
    async fn test_truncated_prefix() {
        let mut cursor = std::io::Cursor::new(vec![0u8, 0]);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                expected: 4,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_close_at_frame_boundary_is_truncation() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::Truncated { received: 0, .. }));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let length = u32::try_from(MAX_FRAME_SIZE + 1).unwrap();
        let mut cursor = std::io::Cursor::new(length.to_be_bytes().to_vec());
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(_)));
    }

    #[test]
    fn test_header_roundtrip() {
        let header = TransferHeader::new("report.pdf", 1024);
        let bytes = encode_header(&header).expect("encode");
        let decoded = decode_header(&bytes).expect("decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_without_size() {
        let decoded = decode_header(br#"{"file_name":"a.txt"}"#).expect("decode");
        assert_eq!(decoded.file_name, "a.txt");
        assert_eq!(decoded.size, None);
    }

    #[test]
    fn test_bad_header_is_protocol_error() {
        let err = decode_header(b"not json").unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    #[tokio::test]
    async fn test_read_frame_timeout() {
        let (mut client, _server) = tokio::io::duplex(64);
        let err = read_frame_with_timeout(&mut client, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
