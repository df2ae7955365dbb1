//! Shell state and the login / dashboard flows.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::{info, warn};
use webdesk_core::auth::{
    AuthApi, CodePurpose, FileStorage, KeyValueStorage, KeyringStorage, LoginRequest,
    ResetPasswordRequest, Session, SessionStore, VerificationCodeRequest,
};
use webdesk_core::{HttpClient, NormalizedResponse};

use crate::config::{Config, StorageBackend};

/// Password attempts before giving up
const MAX_LOGIN_ATTEMPTS: usize = 3;

/// What the shell was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Dashboard if the session is valid, otherwise the login prompt
    Run,
    Logout,
    Status,
    SendCode { target: String, purpose: CodePurpose },
    ResetPassword { target: String },
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut args = args.iter().map(String::as_str);
        let command = match args.next() {
            None => Command::Run,
            Some("--logout") => Command::Logout,
            Some("--status") => Command::Status,
            Some("--help" | "-h") => Command::Help,
            Some("--send-code") => {
                let target = args
                    .next()
                    .ok_or_else(|| anyhow!("--send-code needs a phone number or email"))?;
                let purpose = match args.next() {
                    None => CodePurpose::Register,
                    Some(purpose) => parse_purpose(purpose)?,
                };
                Command::SendCode {
                    target: target.to_string(),
                    purpose,
                }
            }
            Some("--reset-password") => {
                let target = args
                    .next()
                    .ok_or_else(|| anyhow!("--reset-password needs a phone number or email"))?;
                Command::ResetPassword {
                    target: target.to_string(),
                }
            }
            Some(other) => bail!("Unknown argument: {} (try --help)", other),
        };
        if let Some(extra) = args.next() {
            bail!("Unexpected argument: {}", extra);
        }
        Ok(command)
    }
}

fn parse_purpose(purpose: &str) -> Result<CodePurpose> {
    match purpose {
        "register" => Ok(CodePurpose::Register),
        "reset_password" | "reset-password" => Ok(CodePurpose::ResetPassword),
        "login" => Ok(CodePurpose::Login),
        other => bail!("Unknown code purpose: {}", other),
    }
}

pub const USAGE: &str = "\
Usage: webdesk [COMMAND]

With no command, shows the dashboard or asks you to log in.

Commands:
  --status                         Show the stored session
  --logout                         Forget the stored session
  --send-code <target> [purpose]   Send a verification code (register, reset_password, login)
  --reset-password <target>        Reset a password with an emailed or texted code
  --help                           Show this message";

pub struct App {
    config: Config,
    auth: AuthApi,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let storage: Arc<dyn KeyValueStorage> = match config.storage {
            StorageBackend::File => Arc::new(FileStorage::new(config.cache_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStorage::new()),
        };
        let session = SessionStore::new(storage);

        let client = HttpClient::builder(config.client_config()?, session)
            .on_unauthorized(Arc::new(|| info!("Session rejected by backend, login required")))
            .build()?;

        Ok(Self {
            config,
            auth: AuthApi::new(client),
        })
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Run => self.run().await,
            Command::Logout => {
                report(&self.auth.logout())?;
                println!("Logged out.");
                Ok(())
            }
            Command::Status => {
                self.print_status()?;
                Ok(())
            }
            Command::SendCode { target, purpose } => {
                let response = self
                    .auth
                    .send_verification_code(&VerificationCodeRequest {
                        target: target.clone(),
                        purpose,
                    })
                    .await;
                report(&response)?;
                println!("Verification code sent to {}.", target);
                Ok(())
            }
            Command::ResetPassword { target } => self.reset_password(target).await,
            Command::Help => {
                println!("{}", USAGE);
                Ok(())
            }
        }
    }

    /// Show the dashboard, logging in first if needed. An unauthorized or
    /// expired profile fetch drops back to the login prompt once.
    async fn run(&mut self) -> Result<()> {
        if !self.auth.session().is_valid() {
            self.login_interactive().await?;
        }

        let mut response = self.auth.fetch_profile().await;
        if response.requires_login() {
            println!("{}", response.message.as_deref().unwrap_or("Please log in again"));
            self.login_interactive().await?;
            response = self.auth.fetch_profile().await;
        }
        let profile = report(&response)?;

        let session = self.auth.session().get()?;
        for line in dashboard_lines(&profile, &session) {
            println!("{}", line);
        }
        Ok(())
    }

    async fn login_interactive(&mut self) -> Result<()> {
        println!("\n=== webdesk Login ===\n");

        let username = self.prompt_username()?;
        for attempt in 1..=MAX_LOGIN_ATTEMPTS {
            let password = rpassword::prompt_password("Password: ")?;

            println!("\nAuthenticating...");
            let response = self.auth.login(&LoginRequest::new(&username, password)).await;
            if response.success {
                self.config.last_username = Some(username);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                println!("Login successful!\n");
                return Ok(());
            }

            let message = response.message.unwrap_or_else(|| "Login failed".to_string());
            warn!(attempt, code = ?response.code, "Login failed");
            println!("{}\n", message);
        }
        bail!("Giving up after {} failed login attempts", MAX_LOGIN_ATTEMPTS)
    }

    fn prompt_username(&self) -> Result<String> {
        let username = match self.config.last_username {
            Some(ref last_user) => {
                let input = prompt(&format!("Username [{}]: ", last_user))?;
                if input.is_empty() {
                    last_user.clone()
                } else {
                    input
                }
            }
            None => prompt("Username: ")?,
        };
        if username.is_empty() {
            bail!("Username required");
        }
        Ok(username)
    }

    async fn reset_password(&mut self, target: String) -> Result<()> {
        let response = self
            .auth
            .send_verification_code(&VerificationCodeRequest {
                target: target.clone(),
                purpose: CodePurpose::ResetPassword,
            })
            .await;
        report(&response)?;
        println!("A verification code was sent to {}.", target);

        let code = prompt("Code: ")?;
        let new_password = rpassword::prompt_password("New password: ")?;
        let confirm = rpassword::prompt_password("Repeat new password: ")?;
        if new_password != confirm {
            bail!("Passwords do not match");
        }

        let response = self
            .auth
            .reset_password(&ResetPasswordRequest {
                target,
                code,
                new_password,
            })
            .await;
        report(&response)?;
        println!("Password reset. Run webdesk to log in.");
        Ok(())
    }

    fn print_status(&self) -> Result<()> {
        let session = self.auth.session();
        let valid = session.is_valid();
        let stored = session.get()?;

        if !valid {
            println!("Not logged in.");
            return Ok(());
        }
        println!("Logged in as {}.", display_name(stored.user_info.as_ref()));
        match stored.token_expiration.and_then(DateTime::from_timestamp_millis) {
            Some(expires) => println!(
                "Session expires {}.",
                expires.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            ),
            None => println!("Session has no recorded expiration."),
        }
        Ok(())
    }
}

/// The call's data, or its message as an error
fn report(response: &NormalizedResponse) -> Result<Value> {
    if response.success {
        Ok(response.data.clone().unwrap_or(Value::Null))
    } else {
        Err(anyhow!(
            "{}",
            response.message.as_deref().unwrap_or("Request failed")
        ))
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Nickname, then username, then id
fn display_name(user_info: Option<&Value>) -> String {
    let Some(info) = user_info else {
        return "unknown user".to_string();
    };
    ["nickname", "username", "name"]
        .iter()
        .find_map(|key| info.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .map(str::to_string)
        .or_else(|| info.get("id").map(|id| format!("user {}", id)))
        .unwrap_or_else(|| "unknown user".to_string())
}

/// Plain-text dashboard: who is logged in, then the profile fields
fn dashboard_lines(profile: &Value, session: &Session) -> Vec<String> {
    let mut lines = vec![
        "=== Dashboard ===".to_string(),
        format!("Welcome, {}", display_name(Some(profile))),
    ];

    if let Some(map) = profile.as_object() {
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("  {:<12} {}", key, value));
        }
    }

    if let Some(expires) = session.token_expiration.and_then(DateTime::from_timestamp_millis) {
        lines.push(format!(
            "Session valid until {}",
            expires.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        ));
    }
    lines
}
