//! pawlink CLI
//!
//! Small operator tool for the gateway link: liveness checks, one-shot
//! messages, listings, and a live event tail. Intended for debugging a
//! local gateway, not as the primary client surface.

use clap::{Parser, Subcommand};
use pawlink::config::validate_config;
use pawlink::{GatewayClient, GatewayConfig, LifecycleEvent, Result, VERSION};
use secrecy::SecretString;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "pawlink",
    version = VERSION,
    about = "Gateway link tool for the Paw desktop client",
    long_about = None
)]
struct Cli {
    /// Gateway endpoint (loopback only)
    #[arg(long, env = "PAW_GATEWAY_URL")]
    endpoint: Option<String>,

    /// Bearer token for the handshake
    #[arg(long, env = "PAW_GATEWAY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, ping once, and report round-trip health
    Ping,

    /// Send a message to the agent and print the reply
    Send {
        /// Message text
        message: String,
        /// Target session id (a new session is created when omitted)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// List active sessions
    Sessions,

    /// List channel bridges and their status
    Channels,

    /// Tail gateway events until interrupted
    Watch {
        /// Event names to follow
        #[arg(default_values_t = [
            "message.received".to_string(),
            "session.updated".to_string(),
            "channel.status".to_string(),
        ])]
        events: Vec<String>,
    },

    /// Validate the effective configuration without connecting
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pawlink=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = GatewayConfig::default();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(token) = cli.token {
        config.token = Some(SecretString::from(token));
    }

    match cli.command {
        Commands::Ping => {
            let client = connect(config).await?;
            let started = std::time::Instant::now();
            client.ping().await?;
            println!("gateway ok ({} ms)", started.elapsed().as_millis());
            client.disconnect().await;
        }
        Commands::Send { message, session } => {
            let client = connect(config).await?;
            let response = client
                .send_agent_message(pawlink::protocol::types::AgentSendRequest {
                    session_id: session,
                    message,
                    stream: false,
                })
                .await?;
            println!("[{}] {}", response.session_id, response.content);
            client.disconnect().await;
        }
        Commands::Sessions => {
            let client = connect(config).await?;
            let sessions = client.list_sessions().await?;
            if sessions.is_empty() {
                println!("no active sessions");
            }
            for session in sessions {
                println!(
                    "{}  channel={}  model={}",
                    session.id,
                    session.channel_id.as_deref().unwrap_or("-"),
                    session.model.as_deref().unwrap_or("-"),
                );
            }
            client.disconnect().await;
        }
        Commands::Channels => {
            let client = connect(config).await?;
            let channels = client.list_channels().await?;
            if channels.is_empty() {
                println!("no channels configured");
            }
            for channel in channels {
                let state = if channel.running { "running" } else { "stopped" };
                match channel.last_error {
                    Some(error) => println!("{}  {}  {}  last error: {}", channel.id, channel.label, state, error),
                    None => println!("{}  {}  {}", channel.id, channel.label, state),
                }
            }
            client.disconnect().await;
        }
        Commands::Watch { events } => {
            let client = connect(config).await?;
            watch(&client, events).await;
            client.disconnect().await;
        }
        Commands::Validate => {
            let result = validate_config(&config);
            if result.valid {
                println!("configuration ok");
            }
            for issue in &result.errors {
                println!("error: {}: {}", issue.path, issue.message);
                if let Some(suggestion) = &issue.suggestion {
                    println!("  hint: {}", suggestion);
                }
            }
            for issue in &result.warnings {
                println!("warning: {}: {}", issue.path, issue.message);
                if let Some(suggestion) = &issue.suggestion {
                    println!("  hint: {}", suggestion);
                }
            }
            if !result.valid {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn connect(config: GatewayConfig) -> Result<GatewayClient> {
    let client = GatewayClient::new(config)?;
    let hello = client.connect().await?;
    eprintln!(
        "connected (protocol {}{})",
        hello.protocol,
        hello
            .server
            .map(|server| format!(", gateway {}", server))
            .unwrap_or_default(),
    );
    Ok(client)
}

async fn watch(client: &GatewayClient, events: Vec<String>) {
    let mut lifecycle = client.subscribe_lifecycle();
    tokio::spawn(async move {
        while let Ok(event) = lifecycle.recv().await {
            match event {
                LifecycleEvent::Connected => eprintln!("-- reconnected"),
                LifecycleEvent::Disconnected { reason } => eprintln!("-- disconnected: {}", reason),
                LifecycleEvent::ReconnectExhausted => eprintln!("-- gave up reconnecting"),
            }
        }
    });

    let mut tasks = Vec::new();
    for name in events {
        let mut subscription = client.subscribe(&name).await;
        tasks.push(tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                let seq = envelope
                    .seq
                    .map(|seq| format!(" #{}", seq))
                    .unwrap_or_default();
                println!("{}{}  {}", envelope.event, seq, envelope.payload);
            }
        }));
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "signal handler failed");
    }
    for task in tasks {
        task.abort();
    }
}
