use std::{net::SocketAddr, sync::Arc};

use {
    tokio::net::TcpListener,
    tracing::{info, warn},
};

use {
    loquat_config::{DbConfig, GatewayConfig},
    loquat_store::{memory::MemoryStore, mysql::MySqlStore},
};

use crate::{dispatch::Stores, keepalive, state::GatewayState, ws::handle_connection};

/// Build the store pair. `memory` swaps MySQL for the in-memory store
/// (development only); otherwise DB credentials are resolved from the
/// environment and missing ones abort startup.
pub async fn connect_stores(memory: bool) -> anyhow::Result<Arc<Stores>> {
    if memory {
        warn!("using in-memory store; all chat state is lost on exit");
        let store = Arc::new(MemoryStore::default());
        return Ok(Arc::new(Stores {
            sessions: store.clone(),
            chat: store,
        }));
    }
    let db = DbConfig::from_env()?;
    info!(host = %db.host, port = db.port, name = %db.name, "connecting to database");
    let store = Arc::new(MySqlStore::connect(&db.url()).await?);
    Ok(Arc::new(Stores {
        sessions: store.clone(),
        chat: store,
    }))
}

/// Start the gateway: bind the listener, spawn the keep-alive loop, accept
/// forever. Runtime errors never propagate out of the accept loop.
pub async fn start_gateway(cfg: &GatewayConfig, stores: Arc<Stores>) -> anyhow::Result<()> {
    let state = GatewayState::new();
    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        "loquat gateway listening"
    );

    tokio::spawn(keepalive::run(Arc::clone(&state)));

    serve(listener, state, stores).await
}

/// Accept loop, factored out so tests can drive it on an ephemeral port.
pub async fn serve(
    listener: TcpListener,
    state: Arc<GatewayState>,
    stores: Arc<Stores>,
) -> anyhow::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(
                    stream,
                    Arc::clone(&state),
                    Arc::clone(&stores),
                    peer,
                ));
            },
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}
