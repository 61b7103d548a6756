use std::env;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use trunk_store::records::{DocStore, Persistence, Router, USERS};

/// Serves per-identity selection records over TCP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    data_dir: Option<String>,

    #[arg(short, long)]
    port: Option<String>,

    /// Maximum concurrent client connections.
    #[arg(long, default_value_t = 100)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data_dir = args
        .data_dir
        .or_else(|| env::var("TRUNK_RECORD_DATA_DIR").ok())
        .unwrap_or_else(|| "records".to_string());

    let port = args
        .port
        .or_else(|| env::var("TRUNK_RECORD_PORT").ok())
        .unwrap_or_else(|| "7101".to_string());

    let persistence = Arc::new(Persistence::new(&data_dir)?);
    let initial_data = persistence.load_all()?;
    let store = Arc::new(DocStore::new(initial_data, Some(persistence)));

    let router = Router::with_max_connections(store.clone(), args.max_connections);

    println!("Starting Trunk record daemon...");
    println!("Loaded {} identity records from {}.", store.list(USERS).await?.len(), data_dir);
    println!("Listening on :{} (TCP)", port);

    tokio::select! {
        res = router.listen(&port) => {
            if let Err(e) = res {
                eprintln!("TCP server failed: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            println!("\nShutdown signal received. Finalizing disk writes...");
            store.wait().await;
            println!("Persistence complete. Exiting.");
        }
    }

    Ok(())
}
