use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use roomwarden::transport::{ConsoleEvent, ConsoleTransport};
use roomwarden::{
    Bot, BotContext, BotError, Config, DatabaseBackend, FeedPoller, HttpFeedSource, PollerConfig,
    Result, SettingsStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = match Config::load_with_env(&path).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = roomwarden::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        roomwarden::logging::init_console_only(&config.logging.level);
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> Result<()> {
    let backend = config.database_backend()?;
    info!("roomwarden starting as {}", config.bot.user_id);
    let max_connections = config.database.max_connections;

    match backend {
        #[cfg(feature = "sqlite")]
        DatabaseBackend::Sqlite(path) => {
            let store = match path {
                Some(path) => roomwarden::SqliteStore::open(path, max_connections).await?,
                None => roomwarden::SqliteStore::open_in_memory().await?,
            };
            serve(config, store).await
        }
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres(url) => {
            let store = roomwarden::PostgresStore::connect(&url, max_connections).await?;
            serve(config, store).await
        }
        #[allow(unreachable_patterns)]
        other => Err(BotError::Config(format!(
            "{} support is not compiled in",
            other.name()
        ))),
    }
}

async fn serve<S: SettingsStore>(config: &Config, store: S) -> Result<()> {
    let ctx = Arc::new(BotContext::from_config(config));
    info!(
        backend = store.backend_name(),
        super_admins = ?ctx.authorizer.super_admins().collect::<Vec<_>>(),
        "Settings store ready"
    );
    let transport = ConsoleTransport::stdout(ctx.user_id.as_str());
    let feeds = HttpFeedSource::new(&config.rss)?;

    let poller = FeedPoller::new(
        store.clone(),
        feeds.clone(),
        transport.clone(),
        PollerConfig::from(&config.rss),
    )
    .spawn();
    let bot = Bot::new(ctx, store, transport.clone(), feeds, transport.clone());

    info!("Reading events from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&bot, &transport, &line).await,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        }
    }

    info!("Shutting down");
    bot.shutdown().await;
    poller.shutdown().await;
    Ok(())
}

async fn handle_line<S: SettingsStore>(
    bot: &Bot<S, ConsoleTransport, HttpFeedSource, ConsoleTransport>,
    transport: &ConsoleTransport,
    line: &str,
) {
    let Some(mut event) = ConsoleEvent::parse(line) else {
        if !line.trim().is_empty() {
            warn!("Ignoring malformed line");
        }
        return;
    };
    transport.observe(&mut event);

    match event {
        ConsoleEvent::Message(message) => match bot.on_message(&message).await {
            Ok(Some(request)) => info!(
                room_id = %request.room_id,
                personality_len = request.personality.len(),
                "Completion requested"
            ),
            Ok(None) => {}
            Err(e) => error!(room_id = %message.room_id, "Failed to handle message: {}", e),
        },
        ConsoleEvent::Invite {
            room_id,
            inviter,
            creator,
        } => {
            if let Err(e) = bot.on_invite(&room_id, &inviter, creator.as_deref()).await {
                error!(room_id = %room_id, "Failed to handle invite: {}", e);
            }
        }
    }
}
