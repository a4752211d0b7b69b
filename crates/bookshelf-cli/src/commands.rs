use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use bookshelf_core::auth::LocalIdentityProvider;
use bookshelf_core::{
    BearerCredential, Config, CredentialExchange, CredentialSlot, FileSlot, KeyringSlot,
    Principal, Session, SessionManager, SessionStatus, SlotBackend,
};

fn open_slot(config: &Config) -> Result<Arc<dyn CredentialSlot>> {
    let slot: Arc<dyn CredentialSlot> = match config.slot_backend {
        SlotBackend::File => {
            let path = config.slot_path()?;
            Arc::new(
                FileSlot::open(&path)
                    .with_context(|| format!("Failed to open credential file: {}", path.display()))?,
            )
        }
        SlotBackend::Keyring => Arc::new(KeyringSlot::default()),
    };
    Ok(slot)
}

fn describe(session: &Session) -> String {
    let who = session
        .principal
        .as_ref()
        .map(|p| p.label().to_string())
        .unwrap_or_else(|| "-".to_string());
    match (&session.status, &session.credential) {
        (SessionStatus::Authenticated, Some(cred)) => format!(
            "authenticated as {} (expires {}, {}s left)",
            who,
            cred.expires_at().format("%Y-%m-%d %H:%M:%S UTC"),
            cred.seconds_until_expiry(Utc::now())
        ),
        (SessionStatus::Loading, _) => format!("loading ({})", who),
        _ => "signed out".to_string(),
    }
}

/// Run the lifecycle until the session ends or Ctrl-C.
pub async fn watch(config: &Config) -> Result<()> {
    let slot = open_slot(config)?;
    let identity = Arc::new(match &config.last_principal {
        Some(principal) => LocalIdentityProvider::signed_in(principal.clone()),
        None => LocalIdentityProvider::signed_out(),
    });

    let handle = SessionManager::new(config.lifecycle, slot, identity).start();
    let _printer = handle.on_change(|session| println!("{}", describe(session)));
    let mut state = handle.subscribe();

    let mut was_authenticated = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    warn!("Session lifecycle stopped unexpectedly");
                    break;
                }
                let status = state.borrow_and_update().status;
                match status {
                    SessionStatus::Authenticated => was_authenticated = true,
                    SessionStatus::Unauthenticated => {
                        if !was_authenticated {
                            eprintln!("No valid session. Run `bookshelf login` first.");
                        }
                        break;
                    }
                    SessionStatus::Loading => {}
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Exchange an identity token for a backend credential.
pub async fn login(mut config: Config, email: &str, id_token: &str) -> Result<()> {
    let slot = open_slot(&config)?;
    let principal = Principal::new(email).with_email(email);
    let identity = LocalIdentityProvider::signed_in(principal.clone());
    let exchange = CredentialExchange::new(config.backend_url(), config.access_policy())?;

    let credential = exchange
        .sign_in(&principal, id_token, slot.as_ref(), &identity)
        .await
        .context("Login failed")?;

    config.last_principal = Some(principal);
    config.save()?;
    println!(
        "Login successful, credential expires {}",
        credential.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

/// Store an already issued bearer credential.
pub fn store(mut config: Config, token: &str) -> Result<()> {
    let credential = BearerCredential::decode(token).context("Not a usable credential")?;
    if !credential.is_valid_at(Utc::now()) {
        anyhow::bail!("Credential expired at {}", credential.expires_at());
    }

    open_slot(&config)?.set(credential.as_str())?;

    if config.last_principal.is_none() {
        if let Some(uid) = credential.subject().or(credential.email()) {
            let mut principal = Principal::new(uid);
            principal.email = credential.email().map(str::to_string);
            config.last_principal = Some(principal);
            config.save()?;
        }
    }
    println!("Credential stored");
    Ok(())
}

pub fn logout(mut config: Config) -> Result<()> {
    open_slot(&config)?.clear()?;
    config.last_principal = None;
    config.save()?;
    println!("Logged out");
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    present: bool,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    seconds_remaining: i64,
    subject: Option<String>,
    email: Option<String>,
    principal: Option<Principal>,
}

pub fn status(config: &Config) -> Result<()> {
    let stored = open_slot(config)?.get()?;
    let now = Utc::now();

    let mut report = StatusReport {
        present: stored.is_some(),
        valid: false,
        error: None,
        expires_at: None,
        seconds_remaining: 0,
        subject: None,
        email: None,
        principal: config.last_principal.clone(),
    };

    if let Some(token) = stored {
        match BearerCredential::decode(&token) {
            Ok(cred) => {
                report.valid = cred.is_valid_at(now);
                report.expires_at = Some(cred.expires_at().to_rfc3339());
                report.seconds_remaining = cred.seconds_until_expiry(now);
                report.subject = cred.subject().map(str::to_string);
                report.email = cred.email().map(str::to_string);
            }
            Err(e) => report.error = Some(e.to_string()),
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
