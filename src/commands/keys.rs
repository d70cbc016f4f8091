//! API key pool administration: /addkey, /delkey, /listkeys.

use companion_core::service::Service;
use companion_store::keys::KeyPoolError;
use tracing::{error, info};

use super::{format_date, CommandContext, Reply, OWNER_ONLY};

fn heading(service: Service) -> &'static str {
    match service {
        Service::OpenRouter => "OpenRouter",
        Service::Gemini => "Gemini",
        Service::GeminiFlash => "Gemini Flash",
    }
}

/// Handle `/addkey <service> <key>`.
pub(super) async fn handle_addkey(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let args = ctx.args();
    if args.len() < 2 {
        return Reply::text(format!(
            "Please provide a service and key. Usage: /addkey [service] [key]\n\nAvailable services: {}",
            Service::available()
        ));
    }
    let service: Service = match args[0].parse() {
        Ok(s) => s,
        Err(e) => return Reply::text(format!("{e}")),
    };

    match ctx.store.add_key(service, args[1]).await {
        Ok(Ok(())) => {
            info!("keys: added {service} key");
            Reply::text(format!("Added new key for {service}"))
        }
        Ok(Err(e)) => Reply::text(e.to_string()),
        Err(e) => {
            error!("keys: failed to add {service} key: {e}");
            Reply::text("Error saving API key. Please try again later.")
        }
    }
}

/// Handle `/delkey <service> <key>`.
pub(super) async fn handle_delkey(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let args = ctx.args();
    if args.len() < 2 {
        return Reply::text(format!(
            "Usage: /delkey [service] [key]\nServices: {}",
            Service::available()
        ));
    }
    let service: Service = match args[0].parse() {
        Ok(s) => s,
        Err(e) => return Reply::text(format!("{e}")),
    };

    match ctx.store.remove_key(service, args[1]).await {
        Ok(Ok(())) => {
            info!("keys: removed {service} key");
            Reply::text(format!("✅ Successfully removed {service} API key"))
        }
        Ok(Err(KeyPoolError::NotFound(_))) => {
            Reply::text(format!("⚠️ This {service} API key doesn't exist"))
        }
        Ok(Err(e)) => Reply::text(e.to_string()),
        Err(e) => {
            error!("keys: failed to remove {service} key: {e}");
            Reply::text("Error removing API key. Please try again later.")
        }
    }
}

/// Handle /listkeys.
pub(super) async fn handle_listkeys(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let pool = match ctx.store.key_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            error!("keys: failed to load pool: {e}");
            return Reply::text("Error retrieving API keys. Please try again later.");
        }
    };

    let mut text = String::from("*API Keys*\n\n");
    for service in Service::ALL {
        let keys = pool.masked(service);
        text.push_str(&format!("*{}:* {} keys\n", heading(service), keys.len()));
        for (i, key) in keys.iter().enumerate() {
            let marker = if key.current { " 🔄" } else { "" };
            text.push_str(&format!("{}. {}{marker}\n", i + 1, key.masked));
        }
        text.push('\n');
    }

    text.push_str("*Current Index:*\n");
    for service in Service::ALL {
        text.push_str(&format!("{}: {}\n", heading(service), pool.index(service)));
    }

    text.push_str("\n*Last Rotation:*\n");
    for service in Service::ALL {
        let when = pool
            .last_rotation(service)
            .map(format_date)
            .unwrap_or_else(|| "Never".to_string());
        text.push_str(&format!("{}: {when}\n", heading(service)));
    }
    Reply::text(text.trim_end().to_string())
}
