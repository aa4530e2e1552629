use {
    base64::Engine,
    sha1::{Digest, Sha1},
    tokio::io::{AsyncRead, AsyncReadExt},
};

/// Fixed GUID from RFC 6455 §4.2.2.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upgrade requests larger than this are rejected outright.
const MAX_REQUEST: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("upgrade request exceeds {MAX_REQUEST} bytes")]
    RequestTooLarge,
    #[error("connection closed before header terminator")]
    Truncated,
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

/// Read the HTTP upgrade request up to and including the `\r\n\r\n`
/// terminator. Single-byte reads so no frame bytes past the terminator are
/// consumed.
pub async fn read_request<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, HandshakeError> {
    let mut buf = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    loop {
        if buf.len() >= MAX_REQUEST {
            return Err(HandshakeError::RequestTooLarge);
        }
        if r.read(&mut byte).await? == 0 {
            return Err(HandshakeError::Truncated);
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extract the `Sec-WebSocket-Key` value, case-insensitive on the header name.
pub fn websocket_key(request: &str) -> Option<&str> {
    request.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("sec-websocket-key")
            .then_some(value.trim())
    })
}

/// `base64(SHA1(key || GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.as_bytes());
    sha.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(sha.finalize())
}

/// The `101 Switching Protocols` response for a computed accept key.
pub fn upgrade_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}
