use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    loquat_gateway::server,
    loquat_store::{ChatStore, mysql::MySqlStore},
};

#[derive(Parser)]
#[command(name = "loquat", about = "Loquat — realtime chat gateway", version)]
struct Cli {
    /// Log filter, e.g. "info" or "loquat_gateway=debug".
    #[arg(long, env = "LOQUAT_LOG", default_value = "info", global = true)]
    log: String,

    /// Emit logs as JSON lines (for log shippers).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat gateway server.
    Gateway {
        /// Bind address; overrides the config file.
        #[arg(long)]
        bind: Option<String>,
        /// Listen port; overrides the config file.
        #[arg(long)]
        port: Option<u16>,
        /// Use the in-memory store instead of MySQL (development only).
        #[arg(long, default_value_t = false)]
        memory_store: bool,
    },
    /// List public chat rooms.
    Rooms,
}

fn init_tracing(cli: &Cli) {
    // Bad directives fall back to plain info rather than aborting startup.
    let filter = EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(fmt::layer().json().flatten_event(true)).init();
    } else {
        registry
            .with(fmt::layer().compact().with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Commands::Gateway {
            bind,
            port,
            memory_store,
        } => {
            let mut config = loquat_config::discover_and_load().gateway;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            info!(version = env!("CARGO_PKG_VERSION"), "loquat starting");
            let stores = server::connect_stores(memory_store).await?;
            server::start_gateway(&config, stores).await
        },
        Commands::Rooms => {
            let db = loquat_config::DbConfig::from_env()?;
            let store = MySqlStore::connect(&db.url()).await?;
            for room in store.find_public_rooms().await? {
                println!(
                    "{:>6}  {:<40}  {} members",
                    room.room_id, room.title, room.member_cnt
                );
            }
            Ok(())
        },
    }
}
