//! Binary entrypoint for the graph REST server.

use clap::Parser;

use reqgraph_server::{GraphServer, ServerConfig};

/// Requirements graph REST server.
#[derive(Parser)]
#[command(name = "reqgraph-server", about = "Requirements graph REST server")]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Listen address (use 0.0.0.0 to listen on all interfaces).
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    /// SQLite database file path.
    #[arg(long, default_value = "reqgraph.db")]
    db: String,

    /// Threads for the HTTP endpoint runtime.
    #[arg(long, default_value_t = 2)]
    endpoint_threads: usize,

    /// Threads for the load/save worker pool.
    #[arg(long, default_value_t = 2)]
    pool_threads: usize,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = ServerConfig {
        address: cli.address,
        port: cli.port,
        endpoint_threads: cli.endpoint_threads,
        pool_threads: cli.pool_threads,
        db_path: cli.db,
    };

    match GraphServer::start(config) {
        Ok(mut server) => {
            server.join();
        }
        Err(e) => {
            eprintln!("failed to start server: {e}");
            std::process::exit(1);
        }
    }
}
