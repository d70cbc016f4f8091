mod commands;
mod gateway;
mod license;
mod matchers;
mod memory;
mod onboarding;
mod timeparse;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use companion_channels::WhatsAppChannel;
use companion_core::{
    config::{self, Config},
    context::Context,
    service::Service,
    traits::{Channel, KeySource},
};
use companion_providers::{default_chain, GeminiImageProvider};
use companion_store::Store;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "companion",
    version,
    about = "WhatsApp AI companion bot"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "COMPANION_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot.
    Start,
    /// Show configuration, channel and key pool status.
    Status,
    /// Send a one-shot message through the provider chain.
    Ask {
        /// The message to send.
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// List the masked keys configured for a service.
    Keys {
        /// openrouter, gemini or gemini_flash.
        service: String,
    },
}

/// Environment variables that seed the key pool.
const KEY_ENV: [(Service, &str); 3] = [
    (Service::OpenRouter, "OPENROUTER_API_KEYS"),
    (Service::Gemini, "GEMINI_API_KEYS"),
    (Service::GeminiFlash, "GEMINI_FLASH_API_KEYS"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load(&cli.config)?;
    apply_env_overrides(&mut cfg);

    let _log_guard = init_logging(&cfg)?;

    match cli.command {
        Commands::Start => {
            let store = Store::new(cfg.bot.data_path()).await?;
            seed_keys_from_env(&store).await;

            let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
            if let Some(ref wa) = cfg.channel.whatsapp {
                if wa.enabled {
                    if wa.access_token.is_empty() || wa.phone_number_id.is_empty() {
                        anyhow::bail!(
                            "WhatsApp is enabled but access_token or phone_number_id is empty. \
                             Set them in config.toml or via WHATSAPP_ACCESS_TOKEN."
                        );
                    }
                    let channel = WhatsAppChannel::new(wa.clone());
                    info!("whatsapp webhook will listen on {}", channel.bind_addr());
                    channels.insert("whatsapp".to_string(), Arc::new(channel));
                }
            }

            if channels.is_empty() {
                anyhow::bail!("No channels enabled. Enable [channel.whatsapp] in config.toml.");
            }

            let keys: Arc<dyn KeySource> = Arc::new(store.clone());
            for service in Service::ALL {
                if !keys.has_keys(service).await {
                    warn!("no API keys configured for {service}");
                }
            }
            let chain = default_chain(keys.clone(), &cfg.provider);
            let images = Arc::new(GeminiImageProvider::from_config(keys, &cfg.provider));
            let license =
                license::LicenseGate::new(cfg.license.clone(), &cfg.bot.bot_number, store.clone());

            println!("{} starting...", cfg.bot.name);
            let gw = Arc::new(gateway::Gateway::new(
                cfg, store, chain, images, channels, license,
            ));
            gw.run().await?;
        }
        Commands::Status => {
            println!("{} status\n", cfg.bot.name);
            println!("Config: {}", cli.config);
            println!("Data dir: {}", cfg.bot.data_path().display());
            println!(
                "Owner: {}",
                if cfg.bot.owner.is_empty() {
                    "not set"
                } else {
                    cfg.bot.owner.as_str()
                }
            );
            println!();

            match &cfg.channel.whatsapp {
                Some(wa) => println!(
                    "  whatsapp: {}",
                    if wa.enabled && !wa.access_token.is_empty() {
                        "configured"
                    } else if wa.enabled {
                        "enabled but missing access_token"
                    } else {
                        "disabled"
                    }
                ),
                None => println!("  whatsapp: not configured"),
            }

            let store = Store::new(cfg.bot.data_path()).await?;
            let pool = store.key_pool().await?;
            for service in Service::ALL {
                println!("  {service}: {} key(s)", pool.keys(service).len());
            }
            println!(
                "  license gate: {}",
                if cfg.license.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }
        Commands::Ask { message } => {
            if message.is_empty() {
                anyhow::bail!("no message provided. Usage: companion ask <message>");
            }

            let prompt = message.join(" ");
            let store = Store::new(cfg.bot.data_path()).await?;
            seed_keys_from_env(&store).await;
            let chain = default_chain(Arc::new(store), &cfg.provider);

            let response = chain.try_complete(&Context::new(&prompt)).await?;
            println!("{}", response.text);
        }
        Commands::Keys { service } => {
            let service = Service::from_str(&service).map_err(|e| anyhow::anyhow!(e))?;
            let store = Store::new(cfg.bot.data_path()).await?;
            let pool = store.key_pool().await?;
            let masked = pool.masked(service);
            if masked.is_empty() {
                println!("No keys configured for {service}.");
            }
            for key in masked {
                println!(
                    "{}{}",
                    key.masked,
                    if key.current { "  (current)" } else { "" }
                );
            }
        }
    }

    Ok(())
}

/// Environment variables win over config values.
fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(owner) = std::env::var("BOT_OWNER") {
        cfg.bot.owner = owner;
    }
    if let Ok(number) = std::env::var("BOT_NUMBER") {
        cfg.bot.bot_number = number;
    }
    if let Ok(token) = std::env::var("WHATSAPP_ACCESS_TOKEN") {
        if let Some(wa) = cfg.channel.whatsapp.as_mut() {
            wa.access_token = token;
        }
    }
}

/// Stdout plus a daily rolling file under `{data_dir}/logs`.
fn init_logging(cfg: &Config) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = cfg.bot.data_path().join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let appender = tracing_appender::rolling::daily(&log_dir, "companion.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.bot.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(guard)
}

/// Add keys listed in `*_API_KEYS` (comma-separated) that the pool lacks.
async fn seed_keys_from_env(store: &Store) {
    for (service, var) in KEY_ENV {
        let Ok(csv) = std::env::var(var) else {
            continue;
        };
        match store.seed_keys(service, &csv).await {
            Ok(0) => {}
            Ok(n) => info!("seeded {n} {service} key(s) from {var}"),
            Err(e) => warn!("failed to seed {service} keys from {var}: {e}"),
        }
    }
}
