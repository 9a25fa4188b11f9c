//! Hiroba chat relay server.
//!
//! Serves one chat room over TCP or UDP. Lines typed on stdin are broadcast to
//! the room as `Server: <text>`.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server
//! cargo run --bin hiroba-server -- --transport udp --port 9050 --room Lobby
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use hiroba_server::{ChatServer, ServerConfig, signal::shutdown_signal};
use hiroba_shared::{
    EventPublisher, MainThreadQueue, Transport,
    console::ConsoleListener,
    logger::setup_logger,
    protocol::DEFAULT_PORT,
    ticker::{DEFAULT_TICK, PresentationTicker},
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "Chat room relay server over TCP or UDP", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Name of the room
    #[arg(short = 'r', long, default_value = "Hiroba Room")]
    room: String,

    /// Transport to serve (tcp or udp)
    #[arg(short = 't', long, default_value = "tcp")]
    transport: Transport,

    /// UDP only: seconds of silence before a client is evicted (0 disables)
    #[arg(long, default_value_t = 60)]
    idle_timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            room_name: self.room,
            transport: self.transport,
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let config = Args::parse().into_config();

    let queue = Arc::new(MainThreadQueue::new());
    let ticker = match PresentationTicker::spawn(queue.clone(), DEFAULT_TICK) {
        Ok(ticker) => ticker,
        Err(e) => {
            tracing::error!("Failed to start the presentation thread: {}", e);
            std::process::exit(1);
        }
    };
    let listener = Arc::new(ConsoleListener::new("Server"));
    let server = ChatServer::new(EventPublisher::new(queue, listener));

    if let Err(e) = server.start_server(&config).await {
        tracing::error!("Server error: {}", e);
        ticker.stop();
        std::process::exit(1);
    }
    tracing::info!("Type a line to speak as the server; press Ctrl+C to shut down");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(e) = server.send_chat(&line).await {
                        tracing::warn!("Could not send: {}", e);
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    server.stop_server().await;
    ticker.stop();
    tracing::info!("Server shutdown complete");
}
