//! ArticuLink CLI - sign in to the ArticuLink API and manage the stored
//! session from the terminal.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Result};
use articulink_core::auth::SessionError;
use articulink_core::{Config, ProfileUpdate, RegisterRequest, SessionManager, UserProfile};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: articulink <command> [options]

Commands:
  status                      Show whether a session is stored
  login [email]               Sign in (password from ARTICULINK_PASSWORD or prompt)
  register --email <e> --first-name <f> --last-name <l> [--birthdate <d>] [--gender <g>]
  logout [--all]              Sign out (--all signs out every device)
  whoami                      Fetch the current profile from the server
  refresh                     Exchange the refresh token for a new access token
  update-profile [--first-name <f>] [--last-name <l>] [--birthdate <d>] [--gender <g>]
  delete-picture              Remove the profile picture
";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("status");
    let rest = args.get(2..).unwrap_or_default();

    if matches!(command, "help" | "--help" | "-h") {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    info!(api = %config.api_base_url, storage = ?config.storage, "ArticuLink CLI starting");

    let session = SessionManager::from_config(&config)?;
    let mut changes = session.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let state = changes.borrow_and_update().clone();
            debug!(
                authenticated = state.is_authenticated(),
                initializing = state.is_initializing,
                "Session state changed"
            );
        }
    });
    session.initialize().await;

    let result = match command {
        "status" => status(&session).await,
        "login" => login(&session, &mut config, rest).await,
        "register" => register(&session, rest).await,
        "logout" => {
            session.logout(rest.iter().any(|a| a == "--all")).await;
            println!("Logged out.");
            Ok(())
        }
        "whoami" => whoami(&session).await,
        "refresh" => refresh(&session).await,
        "update-profile" => update_profile(&session, rest).await,
        "delete-picture" => delete_picture(&session).await,
        other => {
            eprint!("{}", USAGE);
            Err(anyhow!("Unknown command: {}", other))
        }
    };

    info!("ArticuLink CLI shutting down");
    result
}

// ============================================================================
// Commands
// ============================================================================

async fn status(session: &SessionManager) -> Result<()> {
    match session.current_user() {
        Some(user) => {
            println!("Signed in as {} <{}>", user.display_name(), user.email);
        }
        None if session.check_authenticated().await => {
            println!("A token is stored but no profile is cached.");
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

async fn login(session: &SessionManager, config: &mut Config, args: &[String]) -> Result<()> {
    let email = match args.first() {
        Some(email) => email.clone(),
        None => match std::env::var("ARTICULINK_EMAIL") {
            Ok(email) => email,
            Err(_) => prompt_line("Email", config.last_email.as_deref())?,
        },
    };
    let password = match std::env::var("ARTICULINK_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    if email.trim().is_empty() || password.trim().is_empty() {
        return Err(anyhow!("Email and password required"));
    }

    let user = session.login(&email, &password).await.map_err(report)?;

    config.last_email = Some(user.email.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Welcome, {}!", user.display_name());
    Ok(())
}

async fn register(session: &SessionManager, args: &[String]) -> Result<()> {
    let email = flag(args, "--email").ok_or_else(|| anyhow!("--email is required"))?;
    let first_name = flag(args, "--first-name").ok_or_else(|| anyhow!("--first-name is required"))?;
    let last_name = flag(args, "--last-name").ok_or_else(|| anyhow!("--last-name is required"))?;
    let password = match std::env::var("ARTICULINK_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Choose a password: ")?,
    };

    let fields = RegisterRequest {
        email,
        password,
        first_name,
        last_name,
        birthdate: flag(args, "--birthdate"),
        gender: flag(args, "--gender"),
    };
    session.register(fields).await.map_err(report)?;

    println!("Account created. Run `articulink login` to sign in.");
    Ok(())
}

async fn whoami(session: &SessionManager) -> Result<()> {
    let user = session.fetch_user_profile().await.map_err(report)?;
    print_profile(&user);
    Ok(())
}

async fn refresh(session: &SessionManager) -> Result<()> {
    session.refresh_access_token().await.map_err(report)?;
    println!("Access token refreshed.");
    Ok(())
}

async fn update_profile(session: &SessionManager, args: &[String]) -> Result<()> {
    let update = ProfileUpdate {
        first_name: flag(args, "--first-name"),
        last_name: flag(args, "--last-name"),
        birthdate: flag(args, "--birthdate"),
        gender: flag(args, "--gender"),
    };
    if update.is_empty() {
        return Err(anyhow!("Please make at least one change to update your profile."));
    }

    let user = session.update_profile(&update).await.map_err(report)?;
    println!("Profile updated.");
    print_profile(&user);
    Ok(())
}

async fn delete_picture(session: &SessionManager) -> Result<()> {
    session.delete_profile_picture().await.map_err(report)?;
    println!("Profile picture removed.");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Turn a session error into the message a user should see.
fn report(err: SessionError) -> anyhow::Error {
    match err {
        SessionError::AccountDeactivated(notice) => {
            anyhow!("{}\n\n{}", notice.title(), notice.message())
        }
        SessionError::SessionExpired | SessionError::NoRefreshToken => {
            anyhow!("Session expired. Please log in again.")
        }
        other => anyhow!(other.detail()),
    }
}

fn print_profile(user: &UserProfile) {
    println!("Name:     {}", user.display_name());
    println!("Email:    {}", user.email);
    println!("Role:     {}", user.role);
    println!("Birthday: {}", user.birthdate.as_deref().unwrap_or("Not set"));
    println!("Gender:   {}", user.gender.as_deref().unwrap_or("Not set"));
    if let Some(ref url) = user.profile_picture_url {
        println!("Picture:  {}", url);
    }
}

/// Value following `name` in the argument list.
fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn prompt_line(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(line.to_string())
    }
}
