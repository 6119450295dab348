use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use syncgate_core::{ClientId, InboundMessage, OutboundRequest, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest frame accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Frames sent from the client TO the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ClientFrame {
    /// First frame on a new connection.
    Hello { client_id: ClientId },
    /// A broker request.
    Request { request: OutboundRequest },
}

/// Frames received FROM the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake answer.
    Hello { server_version: i32 },
    /// Handshake refused (duplicate client id and the like).
    Rejected { reason: String },
    /// A broker push.
    Push { message: InboundMessage },
}

/// Frame a message with a 4-byte length prefix (big-endian).
pub fn frame_message(msg: &[u8]) -> Vec<u8> {
    let len = msg.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(msg);
    framed
}

/// Serialize and frame a value, refusing bodies over `max_bytes`.
pub fn encode_frame<T: Serialize>(frame: &T, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(frame).map_err(|e| TransportError::Encoding(e.to_string()))?;
    if json.len() > max_bytes {
        return Err(TransportError::FrameTooLarge(json.len()));
    }
    Ok(frame_message(&json))
}

pub fn decode_frame<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(body).map_err(|e| TransportError::Encoding(e.to_string()))
}

/// Read one frame body. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_bytes: usize) -> Result<Option<Vec<u8>>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::ConnectionFailed(format!("Read error: {}", e))),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_bytes {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("Read error: {}", e)))?;
    Ok(Some(body))
}
