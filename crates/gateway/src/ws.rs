use std::{net::SocketAddr, sync::Arc};

use {
    bytes::Bytes,
    tokio::{
        io::{AsyncRead, AsyncWriteExt},
        net::TcpStream,
        sync::mpsc,
    },
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use loquat_protocol::{
    frame::{self, Opcode},
    handshake,
};

use crate::{
    dispatch::{self, Stores},
    state::{ConnectedClient, GatewayState},
};

/// Drive one client connection from accept to teardown.
///
/// Teardown order is fixed: deregister from the registry, cancel the reader,
/// let the writer drain and shut the socket down. All steps are idempotent,
/// so the keep-alive eviction path and this function can race safely.
pub async fn handle_connection(
    stream: TcpStream,
    state: Arc<GatewayState>,
    stores: Arc<Stores>,
    addr: SocketAddr,
) {
    let conn_id = state.next_conn_id();
    let (mut rd, mut wr) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let cancel = CancellationToken::new();

    // Writer task: the only path bytes take to this socket, so writes are
    // serialized and leave in issue order. A write failure cancels the reader.
    let write_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            if wr.write_all(&buf).await.is_err() {
                write_cancel.cancel();
                break;
            }
        }
        let _ = wr.shutdown().await;
    });

    let client = Arc::new(ConnectedClient::new(conn_id, addr, tx, cancel));
    state.register(Arc::clone(&client)).await;
    debug!(conn_id, %addr, "connection accepted");

    run_client(&state, &stores, &client, &mut rd).await;

    state.close_client(conn_id).await;
    // The registry entry and this frame held the last senders; once they are
    // gone the writer drains the queue and closes the socket.
    drop(client);
    let _ = writer.await;
    debug!(conn_id, "connection closed");
}

async fn run_client(
    state: &Arc<GatewayState>,
    stores: &Arc<Stores>,
    client: &Arc<ConnectedClient>,
    rd: &mut (impl AsyncRead + Unpin),
) {
    // Nothing is readable as a frame until the upgrade completes.
    match perform_handshake(client, rd).await {
        Ok(()) => {
            client.set_handshaked();
            client.touch();
        },
        Err(e) => {
            debug!(conn_id = client.conn_id, error = %e, "handshake failed");
            return;
        },
    }

    loop {
        let frame = tokio::select! {
            _ = client.cancel.cancelled() => return,
            res = frame::read_frame(rd) => match res {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(conn_id = client.conn_id, error = %e, "frame read failed");
                    return;
                },
            },
        };

        match frame.opcode {
            Opcode::Close => {
                debug!(conn_id = client.conn_id, "close frame received");
                return;
            },
            Opcode::Ping => {
                client.touch();
                // read_frame already capped the payload at 125 bytes.
                if let Ok(pong) = frame::control_frame(Opcode::Pong, &frame.payload) {
                    client.send(Bytes::from(pong));
                }
            },
            Opcode::Pong => client.touch(),
            Opcode::Text => {
                if !dispatch::handle_text(state, stores, client, &frame.payload).await {
                    // Not JSON: echo the text back.
                    client.send(Bytes::from(frame::text_frame(&frame.payload)));
                }
            },
            Opcode::Binary => {
                debug!(conn_id = client.conn_id, "ignoring binary frame");
            },
        }
    }
}

async fn perform_handshake(
    client: &ConnectedClient,
    rd: &mut (impl AsyncRead + Unpin),
) -> Result<(), handshake::HandshakeError> {
    let request = handshake::read_request(rd).await?;
    let key = handshake::websocket_key(&request).ok_or(handshake::HandshakeError::MissingKey)?;
    let accept = handshake::accept_key(key);
    client.send(Bytes::from(handshake::upgrade_response(&accept).into_bytes()));
    Ok(())
}
