//! Centli Terminal Client
//!
//! Line-oriented UI adapter over the client core. Type to chat; slash
//! commands drive the catalog, transactions and image upload.

use anyhow::Context;
use centli_client::config::MessageEnvelope;
use centli_client::connection::WsConnector;
use centli_client::events::{ClientEvent, ToastLevel};
use centli_client::features::{self, format_currency, ImageUpload, UnavailableAudio};
use centli_client::state::{AppState, MessageId, SessionFile, Sender, View};
use centli_client::{App, Config};
use clap::Parser;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "centli-client", version, about = "Terminal client for the Centli assistant")]
struct Cli {
    /// Log in as this user instead of restoring the saved session
    #[arg(long)]
    user: Option<String>,

    /// Session id to resume (a new one is generated otherwise)
    #[arg(long)]
    session: Option<String>,

    /// WebSocket endpoint (overrides CENTLI_WS_URL)
    #[arg(long)]
    url: Option<String>,

    /// Outbound envelope: `wrapped` or `flat`
    #[arg(long)]
    envelope: Option<MessageEnvelope>,
}

const HELP: &str = "\
commands:
  /products        list the product catalog
  /select <id>     pick a product
  /confirm         confirm the pending transaction
  /cancel          dismiss the pending transaction
  /image <path>    send a JPEG or PNG image
  /status          show the connection state
  /logout          forget the session and exit
  /quit            exit";

/// Prints chat output as the state changes
#[derive(Default)]
struct Printer {
    printed: HashSet<MessageId>,
    live: Option<(MessageId, usize)>,
    pending_transaction: Option<String>,
}

impl Printer {
    fn render(&mut self, state: &AppState) {
        let mut out = std::io::stdout().lock();

        if let Some(preview) = &state.streaming {
            let already = match self.live {
                Some((id, len)) if id == preview.message_id => len,
                _ => {
                    let _ = write!(out, "agent> ");
                    0
                }
            };
            let _ = write!(out, "{}", preview.text.get(already..).unwrap_or(""));
            self.live = Some((preview.message_id, preview.text.len()));
        }

        for message in &state.messages {
            if !self.printed.insert(message.id) {
                continue;
            }
            match self.live {
                Some((id, len)) if id == message.id => {
                    match message.content.get(len..) {
                        Some(rest) => {
                            let _ = writeln!(out, "{}", rest);
                        }
                        None => {
                            let _ = writeln!(out, "\nagent> {}", message.content);
                        }
                    }
                    self.live = None;
                }
                _ if message.sender == Sender::Agent => {
                    let prefix = if message.is_error { "agent!" } else { "agent>" };
                    let _ = writeln!(out, "{} {}", prefix, message.content);
                }
                _ => {}
            }
        }
        self.printed
            .retain(|id| state.messages.iter().any(|message| message.id == *id));

        if state.streaming.is_none() && self.live.take().is_some() {
            let _ = writeln!(out);
        }

        let transaction = state
            .current_transaction
            .as_ref()
            .map(features::transaction::describe);
        if transaction != self.pending_transaction {
            if let Some(text) = &transaction {
                let _ = writeln!(out, "confirm {}? (/confirm or /cancel)", text);
            }
            self.pending_transaction = transaction;
        }
        let _ = out.flush();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout belongs to the chat
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(url) = cli.url {
        config.connection.endpoint_url = url;
    }
    if let Some(envelope) = cli.envelope {
        config.connection.envelope = envelope;
    }
    info!(url = %config.connection.endpoint_url, envelope = ?config.connection.envelope, "Configuration loaded");

    let session_file = SessionFile::new(config.session_file_path());
    let app = App::new(
        config,
        Arc::new(WsConnector),
        Arc::new(UnavailableAudio),
        session_file,
    );
    let _router = app.spawn_event_router();

    let printer = Arc::new(Mutex::new(Printer::default()));
    let _render = app.store().subscribe(move |state| {
        if let Ok(mut printer) = printer.lock() {
            printer.render(state);
        }
    });

    let mut events = app.events().stream();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let ClientEvent::Toast(toast) = event {
                let tag = match toast.level {
                    ToastLevel::Info => "info",
                    ToastLevel::Success => "ok",
                    ToastLevel::Warning => "warn",
                    ToastLevel::Error => "error",
                };
                eprintln!("[{}] {}", tag, toast.message);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    match cli.user {
        Some(user) => app.login(&user, cli.session).await?,
        None => app.init().await?,
    }
    while app.store().get().current_view == View::Login {
        print!("user id: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        // Rejected ids are reported through a toast
        let _ = app.login(&line, None).await;
    }
    println!("{}", HELP);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();

        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };
        match command {
            "" => {}
            "/help" => println!("{}", HELP),
            "/products" => {
                let products = app.catalog.products();
                if products.is_empty() {
                    println!("no products yet");
                }
                for product in products {
                    println!(
                        "  [{}] {} {}",
                        product.id,
                        product.name,
                        format_currency(product.price.unwrap_or(0.0))
                    );
                }
            }
            "/select" => {
                if let Err(e) = app.catalog.select(argument) {
                    debug!(error = %e, "Selection rejected");
                }
            }
            "/confirm" => {
                if let Err(e) = app.transactions.confirm() {
                    debug!(error = %e, "Confirmation rejected");
                }
            }
            "/cancel" => app.transactions.cancel(),
            "/image" => match ImageUpload::from_path(argument).await {
                Ok(upload) => {
                    let _ = app.images.upload(upload).await;
                }
                Err(e) => eprintln!("[error] {}", e),
            },
            "/status" => println!("{}", app.connection().state()),
            "/logout" => {
                app.logout().await;
                return Ok(());
            }
            "/quit" => break,
            _ => {
                app.chat.send_text(line);
            }
        }
    }

    app.connection().disconnect().await;
    info!("Bye");
    Ok(())
}
