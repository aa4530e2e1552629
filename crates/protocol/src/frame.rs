use tokio::io::{AsyncRead, AsyncReadExt};

/// Advertised payload lengths beyond this are treated as protocol errors.
const MAX_PAYLOAD: u64 = 1 << 31;

/// RFC 6455 caps control frame payloads at 125 bytes.
const MAX_CONTROL_PAYLOAD: usize = 125;

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            // Continuation frames are not reassembled; the connection is
            // failed rather than risking a corrupted stream.
            0x0 => Err(FrameError::Fragmented),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// A decoded inbound frame. The payload is an owned buffer the dispatcher
/// consumes exactly once.
#[derive(Debug)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload length {0} exceeds limit")]
    Oversize(u64),
    #[error("fragmented frames are not supported")]
    Fragmented,
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    #[error("control payload exceeds {MAX_CONTROL_PAYLOAD} bytes")]
    ControlTooLong,
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Read and decode one frame: 2 header bytes, extended 16/64-bit length,
/// optional 4-byte masking key, payload (unmasked in place).
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Frame, FrameError> {
    let mut hdr = [0u8; 2];
    r.read_exact(&mut hdr).await?;

    let fin = hdr[0] & 0x80 != 0;
    let opcode = Opcode::from_bits(hdr[0] & 0x0F)?;
    if !fin {
        return Err(FrameError::Fragmented);
    }

    let masked = hdr[1] & 0x80 != 0;
    let mut len = u64::from(hdr[1] & 0x7F);
    if len == 126 {
        let mut ext = [0u8; 2];
        r.read_exact(&mut ext).await?;
        len = u64::from(u16::from_be_bytes(ext));
    } else if len == 127 {
        let mut ext = [0u8; 8];
        r.read_exact(&mut ext).await?;
        len = u64::from_be_bytes(ext);
    }
    // Same cap as control_frame applies on the way in, before allocating.
    if opcode.is_control() && len > MAX_CONTROL_PAYLOAD as u64 {
        return Err(FrameError::ControlTooLong);
    }
    if len > MAX_PAYLOAD {
        return Err(FrameError::Oversize(len));
    }

    let mask = if masked {
        let mut key = [0u8; 4];
        r.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;
    if let Some(key) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i & 3];
        }
    }

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

// ── Building ─────────────────────────────────────────────────────────────────

/// Encode a single unmasked text frame (server frames are never masked).
pub fn text_frame(payload: &[u8]) -> Vec<u8> {
    encode(Opcode::Text, payload)
}

/// Encode a close/ping/pong frame. Control payloads are capped at 125 bytes.
pub fn control_frame(opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_CONTROL_PAYLOAD {
        return Err(FrameError::ControlTooLong);
    }
    Ok(encode(opcode, payload))
}

fn encode(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 10);

    frame.push(0x80 | opcode.bits());
    if len < 126 {
        frame.push(len as u8);
    } else if len <= 0xFFFF {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(bytes: &[u8]) -> Result<Frame, FrameError> {
        read_frame(&mut &bytes[..]).await
    }

    #[tokio::test]
    async fn round_trips_text_payloads() {
        for size in [0usize, 1, 125, 126, 127, 0xFFFF, 0x10000, 1 << 20] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let frame = parse(&text_frame(&payload)).await.unwrap();
            assert!(frame.fin);
            assert_eq!(frame.opcode, Opcode::Text);
            assert_eq!(frame.payload, payload, "size {size}");
        }
    }

    #[test]
    fn length_encoding_boundaries() {
        // 125 bytes: 7-bit length, 2-byte header.
        let f = text_frame(&[0u8; 125]);
        assert_eq!(f.len(), 2 + 125);
        assert_eq!(f[1], 125);

        // 126 bytes: marker 126 + 16-bit big-endian length.
        let f = text_frame(&[0u8; 126]);
        assert_eq!(f.len(), 4 + 126);
        assert_eq!(f[1], 126);
        assert_eq!(u16::from_be_bytes([f[2], f[3]]), 126);

        // 65536 bytes: marker 127 + 64-bit big-endian length.
        let f = text_frame(&[0u8; 65536]);
        assert_eq!(f.len(), 10 + 65536);
        assert_eq!(f[1], 127);
        let len = u64::from_be_bytes([f[2], f[3], f[4], f[5], f[6], f[7], f[8], f[9]]);
        assert_eq!(len, 65536);
    }

    #[tokio::test]
    async fn unmasks_client_frames() {
        let payload = b"hello gateway";
        let key = [0x12u8, 0x34, 0x56, 0x78];
        let mut frame = vec![0x80 | 0x1, 0x80 | payload.len() as u8];
        frame.extend_from_slice(&key);
        frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i & 3]));

        let decoded = parse(&frame).await.unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[tokio::test]
    async fn rejects_continuation_frames() {
        // FIN=0 text frame.
        assert!(matches!(
            parse(&[0x01, 0x00]).await,
            Err(FrameError::Fragmented)
        ));
        // Continuation opcode.
        assert!(matches!(
            parse(&[0x80, 0x00]).await,
            Err(FrameError::Fragmented)
        ));
    }

    #[tokio::test]
    async fn rejects_oversize_length() {
        let mut frame = vec![0x81, 127];
        frame.extend_from_slice(&(u64::MAX).to_be_bytes());
        assert!(matches!(parse(&frame).await, Err(FrameError::Oversize(_))));
    }

    #[tokio::test]
    async fn short_read_is_an_error() {
        // Header advertises 10 bytes, stream carries 3.
        let frame = [0x81u8, 10, b'a', b'b', b'c'];
        assert!(matches!(parse(&frame).await, Err(FrameError::Io(_))));
    }

    #[tokio::test]
    async fn control_frames_round_trip() {
        for opcode in [Opcode::Close, Opcode::Ping, Opcode::Pong] {
            let frame = control_frame(opcode, b"bye").unwrap();
            let decoded = parse(&frame).await.unwrap();
            assert_eq!(decoded.opcode, opcode);
            assert_eq!(decoded.payload, b"bye");
        }
    }

    #[test]
    fn control_payload_is_capped() {
        assert!(control_frame(Opcode::Ping, &[0u8; 125]).is_ok());
        assert!(matches!(
            control_frame(Opcode::Ping, &[0u8; 126]),
            Err(FrameError::ControlTooLong)
        ));
    }

    #[tokio::test]
    async fn rejects_oversize_inbound_control_frames() {
        // Ping with a 16-bit extended length of 1000 bytes.
        let mut frame = vec![0x89, 126];
        frame.extend_from_slice(&1000u16.to_be_bytes());
        frame.extend_from_slice(&[0u8; 1000]);
        assert!(matches!(
            parse(&frame).await,
            Err(FrameError::ControlTooLong)
        ));
    }
}
