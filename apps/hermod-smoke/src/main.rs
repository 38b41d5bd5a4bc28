//! Environment-driven smoke binary: log in, then optionally send a message.
//!
//! `HERMOD_HOMESERVER`, `HERMOD_USER` and `HERMOD_PASSWORD` drive the login.
//! Add `HERMOD_RECIPIENT`, `HERMOD_RECOVERY_KEY` and `HERMOD_PICKLE_KEY` to
//! exercise a full encrypted send.

use std::{env, process};

use hermod_core::SendRequest;
use hermod_matrix::default_messenger;
use tracing::info;
use url::Url;

mod logging;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(message) = run().await {
        eprintln!("{message}");
        process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let homeserver = normalize_homeserver(require_env("HERMOD_HOMESERVER")?)?;
    let user = require_env("HERMOD_USER")?;
    let password = require_env("HERMOD_PASSWORD")?;

    let messenger = default_messenger();
    let credentials = messenger
        .login(&homeserver, &user, &password)
        .await
        .map_err(|err| format!("login failed: {err}"))?;
    info!(user_id = %credentials.user_id, "logged in");

    let Ok(recipient) = env::var("HERMOD_RECIPIENT") else {
        println!("Logged in as {}.", credentials.user_id);
        println!(
            "Set HERMOD_RECIPIENT, HERMOD_RECOVERY_KEY and HERMOD_PICKLE_KEY to send a message."
        );
        return Ok(());
    };
    let recovery_key = require_env("HERMOD_RECOVERY_KEY")?;
    let pickle_key = require_env("HERMOD_PICKLE_KEY")?;
    let store_descriptor = env::var("HERMOD_STORE")
        .unwrap_or_else(|_| env::temp_dir().join("hermod-smoke-store").display().to_string());
    let body = env::var("HERMOD_MESSAGE").unwrap_or_else(|_| "Hermod smoke test".to_owned());

    let receipt = messenger
        .send_message(SendRequest {
            message_kind: "m.text".to_owned(),
            rendering_kind: "markdown".to_owned(),
            body,
            recipient,
            store_descriptor,
            access_token: credentials.access_token,
            recovery_key,
            pickle_key: pickle_key.into_bytes(),
            homeserver_url: credentials.homeserver_url,
            device_id: credentials.device_id,
        })
        .await
        .map_err(|err| format!("send failed: {err}"))?;

    println!("Delivered as {}.", receipt.event_id);
    Ok(())
}

fn require_env(name: &str) -> Result<String, String> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| format!("{name} must be set"))
}

fn normalize_homeserver(raw: String) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("homeserver is required".to_owned());
    }

    let candidate = if let Some(rest) = raw.strip_prefix("https://") {
        format!("https://{}", rest.trim())
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("https://{}", rest.trim())
    } else if raw.contains("://") {
        return Err("only https homeservers are supported".to_owned());
    } else {
        format!("https://{raw}")
    };

    let parsed = Url::parse(&candidate).map_err(|err| format!("invalid homeserver URL: {err}"))?;
    if parsed.scheme() != "https" {
        return Err("only https homeservers are supported".to_owned());
    }
    if parsed.host_str().is_none() {
        return Err("homeserver must include a host, for example matrix.example.org".to_owned());
    }

    Ok(parsed.as_str().trim_end_matches('/').to_owned())
}
