//! Signaling relay server example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR] [MEDIA_ROOT]
//!
//! Examples:
//!   cargo run --example relay_server                      # binds to 0.0.0.0:3000
//!   cargo run --example relay_server 127.0.0.1:3001       # custom address
//!   cargo run --example relay_server 0.0.0.0:3000 /tmp/m  # custom media root
//!
//! ## Endpoints
//!
//! - `ws://<addr>/ws` — signaling websocket; the server assigns an id,
//!   `join` announces readiness, offers/answers/candidates are relayed
//!   by `targetId` with `senderId` stamped on delivery
//! - `POST /upload-video/{session_id}` — fallback segment upload
//!   (`video/webm` or `video/mp4` body)
//! - `GET /media/...` — published fallback manifests and segments

use std::net::SocketAddr;

use peerlink_rs::{RelayServer, ServerConfig};

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR] [MEDIA_ROOT]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:3000)");
    eprintln!("  MEDIA_ROOT   Directory for fallback media (default: ./media)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr: SocketAddr = match args.get(1) {
        Some(addr_str) => match addr_str.parse() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: invalid bind address '{}': {}", addr_str, e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:3000".parse().unwrap(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peerlink_rs=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let mut config = ServerConfig::default().bind(bind_addr);
    if let Some(root) = args.get(2) {
        config = config.media_root(root);
    }

    println!("Starting signaling relay on {}", config.bind_addr);
    println!();
    println!("  ws://{}/ws                         signaling", config.bind_addr);
    println!("  POST http://{}/upload-video/{{id}}   fallback upload", config.bind_addr);
    println!("  GET  http://{}/media/...            published media", config.bind_addr);
    println!();

    let server = RelayServer::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
