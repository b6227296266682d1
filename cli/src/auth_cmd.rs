//! `login`, `logout` and `profile` subcommands.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use successfuel_core::RequestCoordinator;
use successfuel_core::api_client::create_client;
use successfuel_core::auth::{AuthService, FileTokenStore, LoginCredentials, UserProfile};
use successfuel_core::config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Account login.
    #[arg(long = "login", short = 'l')]
    pub login: String,

    /// Read the password from stdin without prompting.
    #[arg(long = "password-stdin")]
    pub password_stdin: bool,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Bypass the profile cache.
    #[arg(long = "refresh")]
    pub refresh: bool,

    /// Print the profile as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

fn auth_service(config: &AppConfig) -> anyhow::Result<AuthService> {
    let http = create_client(config.api.request_timeout())?;
    let coordinator = RequestCoordinator::from_app_config(http.clone(), config);
    let store = Arc::new(FileTokenStore::new(&config.auth.resolved_data_dir()));
    tracing::debug!(path = %store.path().display(), "using token store");

    Ok(AuthService::new(http, config, store).with_coordinator(coordinator))
}

pub async fn run_login(config: &AppConfig, args: &LoginArgs) -> anyhow::Result<()> {
    if !args.password_stdin {
        eprint!("Password for {}: ", args.login);
        std::io::stderr().flush()?;
    }
    let password = read_password().await?;

    let service = auth_service(config)?;
    let profile = service
        .login(&LoginCredentials::new(args.login.clone(), password))
        .await
        .context("login failed")?;

    println!("Logged in as {}", profile.display_name());
    Ok(())
}

pub async fn run_logout(config: &AppConfig) -> anyhow::Result<()> {
    let service = auth_service(config)?;
    if service.session().restore().await?.is_none() {
        println!("No active session");
        return Ok(());
    }

    service.logout().await?;
    println!("Logged out");
    Ok(())
}

pub async fn run_profile(config: &AppConfig, args: &ProfileArgs) -> anyhow::Result<ExitCode> {
    let service = auth_service(config)?;
    if !service.initialize().await {
        bail!("not logged in (run `successfuel login` first)");
    }

    // initialize() already cached the profile
    let profile = service.get_profile(args.refresh).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print!("{}", render_profile(&profile));
    }
    Ok(ExitCode::SUCCESS)
}

async fn read_password() -> anyhow::Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password)
}

pub fn render_profile(profile: &UserProfile) -> String {
    let mut out = format!("{} ({})\n", profile.display_name(), profile.login);
    if let Some(email) = &profile.email {
        out.push_str(&format!("  email: {email}\n"));
    }
    if let Some(profil) = &profile.profil {
        out.push_str(&format!("  role:  {} [{}]\n", profil.libelle, profil.code));
    }
    let names = profile.permission_names();
    if names.is_empty() {
        out.push_str("  permissions: none\n");
    } else {
        out.push_str(&format!("  permissions: {}\n", names.join(", ")));
    }
    out
}
