//! CLI for pubsub-relay
//!
//! Subcommands:
//! - `serve`: run the relay, e.g. `pubsub-relay serve 8080 /chat/1 /chat/2`
//! - `client`: connect to a topic, send one message and print what comes back

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pubsub_relay::broker::{Dispatcher, TopicRegistry};
use pubsub_relay::config::{Settings, load_config_from};
use pubsub_relay::transport::{Router, run};
use pubsub_relay::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pubsub-relay", version)]
enum Command {
    /// Start the relay server
    Serve {
        /// Port to listen on (overrides configuration)
        port: Option<u16>,
        /// Absolute topic paths to bring online
        paths: Vec<String>,
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Extra configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Do not relay a message back to its sender
        #[arg(long)]
        no_echo: bool,
        /// Serve any absolute path, creating topics on first connect
        #[arg(long)]
        dynamic: bool,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Connect to a topic, send one text message and print the first reply
    Client {
        /// Topic URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080/chat")]
        url: String,
        #[arg(long, default_value = "hello")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    match cmd {
        Command::Serve {
            port,
            paths,
            host,
            config,
            no_echo,
            dynamic,
            log_level,
        } => {
            logging::init(&log_level);
            let settings = load_config_from(config.as_deref()).inspect_err(|e| {
                error!("Failed to load configuration: {e}");
            })?;
            let settings = apply_overrides(settings, port, paths, host, no_echo, dynamic);
            run_server(settings)
                .await
                .inspect_err(|e| error!("Server failed: {e}"))
        }
        Command::Client { url, message } => {
            logging::init("info");
            run_client(&url, &message)
                .await
                .inspect_err(|e| error!("Client failed: {e}"))
        }
    }
}

fn apply_overrides(
    mut settings: Settings,
    port: Option<u16>,
    paths: Vec<String>,
    host: Option<String>,
    no_echo: bool,
    dynamic: bool,
) -> Settings {
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(host) = host {
        settings.server.host = host;
    }
    settings.relay.topics.extend(paths);
    if no_echo {
        settings.relay.echo_to_sender = false;
    }
    if dynamic {
        settings.relay.dynamic_topics = true;
    }
    settings
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(TopicRegistry::new(
        settings.relay.policy(),
        settings.relay.retention(),
        Dispatcher::current(settings.relay.send_timeout()),
    ));
    let router = Arc::new(Router::from_paths(
        registry.clone(),
        &settings.relay.topics,
        settings.relay.dynamic_topics,
    )?);

    if registry.is_empty() && !router.is_dynamic() {
        return Err("no topics to serve: pass topic paths or --dynamic".into());
    }

    tokio::select! {
        res = run(router, settings) => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    let closed = registry.shutdown();
    info!("closed {closed} connection(s)");
    Ok(())
}

async fn run_client(url: &str, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;
    ws_stream.send(WsMessage::text(message)).await?;

    match tokio::time::timeout(Duration::from_secs(5), ws_stream.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => println!("Incoming: {}", text.as_str()),
        Ok(Some(Ok(WsMessage::Binary(data)))) => println!("Incoming: {} binary bytes", data.len()),
        Ok(Some(Ok(other))) => println!("Incoming: {other:?}"),
        Ok(Some(Err(e))) => return Err(e.into()),
        Ok(None) => println!("Connection closed by server"),
        Err(_) => println!("No message within 5s"),
    }

    ws_stream.close(None).await?;
    Ok(())
}
