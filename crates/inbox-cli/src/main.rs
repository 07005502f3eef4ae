use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use inbox_core::{
    BusEvent, ChannelConfig, Inbox, InboxConfig, LifecycleEvent, Notification, Topic,
    WebhookConfig,
};

#[derive(Parser)]
#[command(name = "nostr-inbox")]
#[command(about = "Unified notification inbox over nostr relays")]
struct Cli {
    /// Watcher public key (hex or npub). Falls back to $NOSTR_PUBKEY.
    #[arg(long, global = true)]
    pubkey: Option<String>,

    /// Relay URLs, comma separated. Falls back to $NOSTR_RELAYS.
    #[arg(long, global = true, value_delimiter = ',')]
    relays: Vec<String>,

    /// Lower time bound, unix seconds.
    #[arg(long, global = true)]
    since: Option<u64>,

    /// Look back this many seconds from now (alternative to --since).
    #[arg(long, global = true)]
    since_ago: Option<u64>,

    /// Enabled channels, comma separated (mentions, dms, work_requests,
    /// work_results, zaps, reactions, trust, marketplace). Default: all.
    #[arg(long, global = true, value_delimiter = ',')]
    channels: Option<Vec<String>>,

    /// Print notifications as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress connection chatter.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream notifications until interrupted
    Watch {
        /// Forward notifications to this HTTP endpoint.
        #[arg(long)]
        webhook_url: Option<String>,

        /// HMAC-SHA256 signing secret for webhook payloads.
        #[arg(long)]
        webhook_secret: Option<String>,

        /// Forward only high-priority notifications.
        #[arg(long)]
        urgent_only: bool,

        /// Webhook batch window in milliseconds (0 = immediate).
        #[arg(long, default_value_t = 0)]
        batch_ms: u64,
    },

    /// One-shot query of stored notifications
    Poll,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are not failures; anything else
            // (including an unknown command) exits 1.
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let _ = e.print();
                return ExitCode::SUCCESS;
            }
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let command = match cli.command {
        Some(command) => command,
        None => {
            eprintln!("No command specified. Use --help for usage.");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        Commands::Watch {
            webhook_url,
            webhook_secret,
            urgent_only,
            batch_ms,
        } => runtime.block_on(run_watch(
            config,
            cli.json,
            cli.quiet,
            webhook_url,
            webhook_secret,
            urgent_only,
            batch_ms,
        )),
        Commands::Poll => runtime.block_on(run_poll(config, cli.json)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Resolve flags and environment fallbacks into an inbox config.
fn build_config(cli: &Cli) -> Result<InboxConfig> {
    let pubkey = cli
        .pubkey
        .clone()
        .or_else(|| std::env::var("NOSTR_PUBKEY").ok())
        .unwrap_or_default();
    if pubkey.trim().is_empty() {
        anyhow::bail!("watcher pubkey is required (--pubkey or $NOSTR_PUBKEY)");
    }

    let mut config = InboxConfig::new(pubkey);

    let relays: Vec<String> = if cli.relays.is_empty() {
        std::env::var("NOSTR_RELAYS")
            .map(|v| split_list(&v))
            .unwrap_or_default()
    } else {
        cli.relays.clone()
    };
    if !relays.is_empty() {
        config.relays = relays;
    }

    config.since = resolve_since(cli.since, cli.since_ago, unix_now());

    if let Some(names) = &cli.channels {
        config.channels = parse_channels(names);
    }

    Ok(config)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `--since` wins over `--since-ago`; neither means the default lookback.
fn resolve_since(since: Option<u64>, since_ago: Option<u64>, now: u64) -> Option<u64> {
    since.or_else(|| since_ago.map(|ago| now.saturating_sub(ago)))
}

/// Enable only the named channels; unknown names are ignored.
fn parse_channels(names: &[String]) -> ChannelConfig {
    let mut channels = ChannelConfig::none();
    for name in names {
        channels.enable(name.trim());
    }
    channels
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[allow(clippy::too_many_arguments)]
async fn run_watch(
    config: InboxConfig,
    json: bool,
    quiet: bool,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    urgent_only: bool,
    batch_ms: u64,
) -> Result<()> {
    let inbox = Inbox::new(config)?;
    let mut sub = inbox.subscribe(Topic::All);

    let sink = webhook_url.map(|url| {
        let mut webhook = WebhookConfig::new(url);
        webhook.secret = webhook_secret;
        webhook.urgent_only = urgent_only;
        webhook.batch_ms = batch_ms;
        inbox.attach_webhook(webhook)
    });

    inbox.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = sub.recv() => match event {
                Some(BusEvent::Notification(n)) => print_notification(&n, json)?,
                Some(BusEvent::Lifecycle(lifecycle)) => {
                    if !quiet {
                        print_lifecycle(&lifecycle);
                    }
                }
                None => break,
            },
        }
    }

    inbox.stop().await;
    if let Some(sink) = sink {
        sink.close().await;
    }
    Ok(())
}

async fn run_poll(config: InboxConfig, json: bool) -> Result<()> {
    let notifications = inbox_core::poll::poll(&config).await?;
    for n in &notifications {
        print_notification(n, json)?;
    }
    Ok(())
}

fn print_notification(n: &Notification, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(n)?);
    } else {
        let mut content: String = n.content.chars().take(80).collect();
        if content.len() < n.content.len() {
            content.push('…');
        }
        println!(
            "[{}] {} from {}: {} (kind {})",
            n.priority,
            n.notification_type,
            &n.from[..n.from.len().min(8)],
            content,
            n.kind
        );
    }
    Ok(())
}

fn print_lifecycle(lifecycle: &LifecycleEvent) {
    match lifecycle {
        LifecycleEvent::Connecting { relay } => eprintln!("connecting to {relay}..."),
        LifecycleEvent::Connected { relay } => eprintln!("connected to {relay}"),
        LifecycleEvent::Started => eprintln!("watching for notifications (ctrl-c to stop)"),
        LifecycleEvent::Stopped => eprintln!("stopped"),
        LifecycleEvent::Synced { relay } => eprintln!("synced with {relay}"),
        LifecycleEvent::Error { relay, message } => eprintln!("relay {relay} error: {message}"),
    }
}
