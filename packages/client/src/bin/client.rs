//! Hiroba chat client.
//!
//! Joins a chat room relay over TCP or UDP and sends lines typed at the
//! prompt. `/ping` probes the server, `/history` shows the recent lines and
//! `/quit` (or Ctrl+C / Ctrl+D) leaves.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-client -- --username alice
//! cargo run --bin hiroba-client -- -u bob --transport udp --port 9050
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use hiroba_client::{ClientSession, SessionConfig};
use hiroba_shared::{
    EventPublisher, MainThreadQueue, Transport,
    console::ConsoleListener,
    logger::setup_logger,
    protocol::DEFAULT_PORT,
    ticker::{DEFAULT_TICK, PresentationTicker},
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "hiroba-client")]
#[command(about = "Chat room client over TCP or UDP", long_about = None)]
struct Args {
    /// Username shown to the other members
    #[arg(short = 'u', long)]
    username: String,

    /// Server host address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port number
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Transport to use (tcp or udp)
    #[arg(short = 't', long, default_value = "tcp")]
    transport: Transport,

    /// Seconds between keepalive pings (0 disables)
    #[arg(long, default_value_t = 15)]
    keepalive_secs: u64,
}

/// A line typed at the prompt.
enum Input {
    Chat(String),
    Ping,
    History,
    Quit,
}

impl Input {
    fn parse(line: &str) -> Self {
        match line {
            "/ping" => Self::Ping,
            "/history" => Self::History,
            "/quit" => Self::Quit,
            text => Self::Chat(text.to_string()),
        }
    }
}

/// Spawns a blocking thread for rustyline (synchronous readline).
///
/// The channel closes when the user presses Ctrl+C or Ctrl+D.
fn spawn_readline(prompt: String) -> mpsc::UnboundedReceiver<Input> {
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    let input = Input::parse(line);
                    let quit = matches!(input, Input::Quit);
                    if input_tx.send(input).is_err() || quit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::error!("Readline error: {}", e);
                    break;
                }
            }
        }
    });

    input_rx
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();
    let prompt = format!("{}> ", args.username);

    let queue = Arc::new(MainThreadQueue::new());
    let ticker = match PresentationTicker::spawn(queue.clone(), DEFAULT_TICK) {
        Ok(ticker) => ticker,
        Err(e) => {
            tracing::error!("Failed to start the presentation thread: {}", e);
            std::process::exit(1);
        }
    };
    let listener = Arc::new(ConsoleListener::new(args.username.clone()).with_prompt(prompt.clone()));
    let config = SessionConfig {
        keepalive: (args.keepalive_secs > 0).then(|| Duration::from_secs(args.keepalive_secs)),
    };
    let session = ClientSession::with_config(
        args.transport,
        config,
        EventPublisher::new(queue, listener),
    );

    if let Err(e) = session.connect(&args.host, args.port, &args.username).await {
        tracing::error!("Client error: {}", e);
        ticker.stop();
        std::process::exit(1);
    }

    let mut inputs = spawn_readline(prompt);
    while let Some(input) = inputs.recv().await {
        let sent = match input {
            Input::Chat(text) => session.send_chat(&text).await,
            Input::Ping => session.send_ping().await,
            Input::History => {
                for line in session.history() {
                    println!("{}", line.display());
                }
                Ok(())
            }
            Input::Quit => break,
        };
        if let Err(e) = sent {
            tracing::warn!("Could not send: {}", e);
            if !session.is_connected().await {
                break;
            }
        }
    }

    session.disconnect().await;
    ticker.stop();
}
