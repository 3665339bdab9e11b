//! Command line interface
//!
//! One handler per subcommand. Running without a subcommand drops into the
//! interactive menu instead, which `main` dispatches.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};

use tgsc::config;
use tgsc::login;
use tgsc::tdata;
use tgsc::validate::{self, SessionStatus};
use tgsc::{Artifact, ReadOptions, SessionFormat};

#[derive(Parser)]
#[command(name = "tgsc", version, about = "Convert, check and create Telegram sessions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert a session from one format to another
    Convert(ConvertArgs),
    /// Log in with a phone number and save a fresh session
    Login(LoginArgs),
    /// Check whether a session still authorizes
    Check(CheckArgs),
    /// Store API credentials, or show where the current ones come from
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Source format
    #[arg(long, value_enum)]
    from: SessionFormat,
    /// Target format
    #[arg(long, value_enum)]
    to: SessionFormat,
    /// Source artifact: file path, tdata folder or string session.
    /// Defaults to the installed Telegram Desktop folder for tdata sources.
    #[arg(long)]
    input: Option<String>,
    /// Where to write the result; string targets print to stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
    /// Telegram API id, stored by Pyrogram targets
    #[arg(long)]
    api_id: Option<i32>,
    /// Telegram API hash
    #[arg(long)]
    api_hash: Option<String>,
    /// Local passcode of a tdata source
    #[arg(long)]
    passcode: Option<String>,
    /// Account slot in a multi-account tdata folder
    #[arg(long, default_value_t = 0)]
    account: usize,
}

#[derive(Args)]
pub struct LoginArgs {
    /// Format of the session to create
    #[arg(long = "type", value_enum, default_value_t = SessionFormat::Telethon)]
    session_type: SessionFormat,
    /// Phone number in international format; prompted when omitted
    #[arg(long)]
    phone: Option<String>,
    /// Where to write the session; defaults to <phone>.session for file formats
    #[arg(long)]
    output: Option<PathBuf>,
    /// Telegram API id
    #[arg(long)]
    api_id: Option<i32>,
    /// Telegram API hash
    #[arg(long)]
    api_hash: Option<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Session artifact: file path, tdata folder or string session
    #[arg(long)]
    session: String,
    /// Telegram API id
    #[arg(long)]
    api_id: Option<i32>,
    /// Telegram API hash
    #[arg(long)]
    api_hash: Option<String>,
    /// Local passcode of a tdata session
    #[arg(long)]
    passcode: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Telegram API id to store
    #[arg(long)]
    api_id: Option<i32>,
    /// Telegram API hash to store
    #[arg(long)]
    api_hash: Option<String>,
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Convert(args) => convert(args),
        Command::Login(args) => login_cmd(args).await,
        Command::Check(args) => check(args).await,
        Command::Config(args) => config_cmd(args),
    }
}

fn convert(args: ConvertArgs) -> anyhow::Result<()> {
    let input = match args.input {
        Some(input) => input,
        None if args.from == SessionFormat::Tdata => tdata::default_tdata_path()
            .ok_or_else(|| anyhow::anyhow!("no default tdata location on this platform, pass --input"))?
            .to_string_lossy()
            .into_owned(),
        None => anyhow::bail!("--input is required for {} sources", args.from),
    };

    let opts = ReadOptions {
        passcode: args.passcode,
        account: args.account,
    };
    let mut record = tgsc::read_session(&input, args.from, &opts)?;

    if let Some(api_id) = args.api_id {
        record.api_id = Some(api_id);
    }
    let wants_api_id = matches!(
        args.to,
        SessionFormat::Pyrogram | SessionFormat::PyrogramString
    );
    if wants_api_id && record.api_id.is_none() {
        if let Ok(resolved) = config::resolve(None, None) {
            record.api_id = Some(resolved.credentials.api_id);
        }
    }

    report(tgsc::write_session(&record, args.to, args.output.as_deref())?);
    Ok(())
}

async fn login_cmd(args: LoginArgs) -> anyhow::Result<()> {
    let creds = config::resolve(args.api_id, args.api_hash.as_deref())?.credentials;
    let phone = match args.phone {
        Some(phone) => phone,
        None => login::prompt("Enter your phone number (international format): ")?,
    };

    let mut record = login::login(&creds, &phone).await?;
    record.api_id = Some(creds.api_id);

    let output = match args.output {
        Some(path) => Some(path),
        None if args.session_type.is_string() => None,
        None => Some(PathBuf::from(format!(
            "{}.session",
            phone.trim_start_matches('+')
        ))),
    };

    report(tgsc::write_session(&record, args.session_type, output.as_deref())?);
    Ok(())
}

async fn check(args: CheckArgs) -> anyhow::Result<()> {
    let creds = config::resolve(args.api_id, args.api_hash.as_deref())?.credentials;
    report_validity(&args.session, args.passcode, &creds).await
}

/// Print offline diagnostics for an artifact, then its live status.
/// Shared with the interactive menu.
pub(crate) async fn report_validity(
    session: &str,
    passcode: Option<String>,
    creds: &config::ApiCredentials,
) -> anyhow::Result<()> {
    let info = validate::inspect(session)?;
    println!("Format: {}", info.format);
    if let Some(size) = info.size {
        println!("Size: {size} bytes");
    }
    if let Some(modified) = info.modified {
        let when: DateTime<Local> = modified.into();
        println!("Modified: {}", when.format("%Y-%m-%d %H:%M:%S"));
    }

    let opts = ReadOptions {
        passcode,
        ..ReadOptions::default()
    };
    let record = tgsc::read_session(session, info.format, &opts)?;

    match validate::check(&record, creds).await? {
        SessionStatus::Valid(account) => {
            println!("✅ Session is valid");
            println!("Account: {} (id {})", account.full_name, account.id);
            if let Some(username) = account.username {
                println!("Username: @{username}");
            }
            if let Some(phone) = account.phone {
                println!("Phone: +{phone}");
            }
        }
        SessionStatus::Invalid => println!("❌ Session is expired or revoked"),
    }
    Ok(())
}

fn config_cmd(args: ConfigArgs) -> anyhow::Result<()> {
    match (args.api_id, args.api_hash) {
        (Some(api_id), Some(api_hash)) => {
            let creds = config::ApiCredentials { api_id, api_hash };
            let path = config::default_config_path();
            config::save(&creds, &path)?;
            println!("✅ Credentials saved to {}", path.display());
        }
        (None, None) => {
            let resolved = config::resolve(None, None)?;
            println!(
                "api_id:   {} ({})",
                resolved.credentials.api_id, resolved.id_source
            );
            println!(
                "api_hash: {} ({})",
                mask(&resolved.credentials.api_hash),
                resolved.hash_source
            );
        }
        _ => anyhow::bail!("pass both --api-id and --api-hash to store credentials"),
    }
    Ok(())
}

pub(crate) fn report(artifact: Artifact) {
    match artifact {
        Artifact::File(path) => println!("✅ Session saved to {}", path.display()),
        Artifact::Text(session) => println!("{session}"),
    }
}

fn mask(hash: &str) -> String {
    let chars: Vec<char> = hash.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}
