//! folio - command-line front end for the folio session core.
//!
//! Signs in against the folio backend, shows the session state, makes
//! authenticated requests, and can watch the session for expiry.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use folio_core::auth::{LoginRequest, ReauthPrompt, SessionEvent};
use folio_core::{ApiRequest, Config, LifecycleState, Session};
use prompt::StdinPrompt;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// How often `folio watch` re-checks the token
const WATCH_INTERVAL_SECS: u64 = 30;

const USAGE: &str = "usage: folio <login [email] | logout | status | get <path> | watch>";

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr and to a daily file in the cache directory.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "folio.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    let _guard = init_tracing(&config);
    info!(api = %config.api_base_url, "folio starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let session = Session::open(config.clone())?;

    match command.as_str() {
        "login" => login(&session, &mut config, args.get(1).cloned()).await,
        "logout" => {
            if session.logout() {
                println!("Signed out.");
            } else {
                println!("No active session.");
            }
            Ok(())
        }
        "status" => {
            status(&session);
            Ok(())
        }
        "get" => {
            let path = args.get(1).context("get needs a path")?;
            get(&session, path).await
        }
        "watch" => watch(&session).await,
        _ => {
            eprintln!("{}", USAGE);
            Ok(())
        }
    }
}

async fn login(session: &Session, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_email()?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    println!("\nAuthenticating...");
    let principal = session.login(&LoginRequest::new(email.clone(), password)).await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {}.", principal.subject);
    Ok(())
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

fn status(session: &Session) {
    let state = session.state();
    match state {
        LifecycleState::Absent => println!("Not signed in."),
        LifecycleState::Expired => println!("Session expired."),
        LifecycleState::Valid | LifecycleState::ExpiringSoon => {
            let minutes = session.minutes_until_expiry().unwrap_or(0);
            println!("Session {:?}, {} minute(s) left.", state, minutes);
        }
    }
    if let Some(principal) = session.principal() {
        println!("Subject: {}", principal.subject);
        if let Some(role) = principal.role {
            println!("Role: {}", role);
        }
        let capabilities: Vec<_> = principal.capabilities.iter().map(|c| c.as_str()).collect();
        println!("Capabilities: {}", capabilities.join(", "));
    }
}

async fn get(session: &Session, path: &str) -> Result<()> {
    let response = session
        .api_client()
        .send(ApiRequest::get(path))
        .await?;
    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.body),
    }
    Ok(())
}

async fn watch(session: &Session) -> Result<()> {
    let prompt: Arc<dyn ReauthPrompt> = Arc::new(StdinPrompt);
    let monitor = session.monitor(prompt);
    let mut events = session.subscribe();

    println!("Watching session (Ctrl+C to stop)...");
    tokio::select! {
        _ = monitor.run(Duration::from_secs(WATCH_INTERVAL_SECS)) => {}
        event = events.recv() => {
            if let Ok(SessionEvent::Terminated { reason }) = event {
                println!("Session ended ({:?}). Run `folio login` to sign in again.", reason);
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}

mod prompt {
    use std::io::{self, Write};

    use folio_core::auth::ReauthPrompt;
    use futures::future::{BoxFuture, FutureExt};

    /// Asks on the terminal whether to stay signed in
    pub struct StdinPrompt;

    impl ReauthPrompt for StdinPrompt {
        fn confirm(&self, minutes_left: i64) -> BoxFuture<'_, bool> {
            async move {
                let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
                    print!("Session expires in {} minute(s). Stay signed in? [Y/n]: ", minutes_left);
                    io::stdout().flush()?;
                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;
                    Ok(input)
                })
                .await;
                match answer {
                    Ok(Ok(input)) => input.trim().to_lowercase() != "n",
                    _ => false,
                }
            }
            .boxed()
        }
    }
}
