//! Interactive menu
//!
//! The numbered flow shown when the tool starts without a subcommand. Every
//! option maps onto the same library calls the subcommands use; errors are
//! printed and the menu comes back instead of exiting.

use std::path::{Path, PathBuf};

use anyhow::Context;

use tgsc::config::{self, ApiCredentials};
use tgsc::login::{self, prompt};
use tgsc::validate::{self, SessionStatus};
use tgsc::{ReadOptions, SessionFormat, SessionRecord};

use crate::cli;

const MENU: &str = "\
Telegram session converter

  [1] Create new Telethon session (login)
  [2] Create new Pyrogram session (login)
  [3] Convert Telethon session to Pyrogram
  [4] Convert Pyrogram session to Telethon
  [5] Convert session file to string session
  [6] Check session validity
  [7] Delete session file
  [8] Create API credentials file
  [0] Exit
";

pub async fn run() -> anyhow::Result<()> {
    loop {
        println!("{MENU}");
        let choice = prompt("Enter your choice (0-8): ")?;

        let outcome = match choice.as_str() {
            "1" => create_session(SessionFormat::Telethon).await,
            "2" => create_session(SessionFormat::Pyrogram).await,
            "3" => {
                convert_file(
                    SessionFormat::Telethon,
                    SessionFormat::Pyrogram,
                    "pyrogram.session",
                )
                .await
            }
            "4" => {
                convert_file(
                    SessionFormat::Pyrogram,
                    SessionFormat::Telethon,
                    "telethon.session",
                )
                .await
            }
            "5" => export_string().await,
            "6" => check_session().await,
            "7" => delete_session(),
            "8" => create_credentials_file(),
            "0" => break,
            _ => {
                println!("Invalid choice, enter a number between 0 and 8\n");
                continue;
            }
        };

        if let Err(e) = outcome {
            println!("❌ {e:#}");
        }
        println!();
    }
    Ok(())
}

async fn create_session(format: SessionFormat) -> anyhow::Result<()> {
    let creds = obtain_credentials()?;
    let phone = prompt("Enter your phone number (e.g. +1234567890): ")?;

    let mut record = login::login(&creds, &phone).await?;
    record.api_id = Some(creds.api_id);

    let default_name = format!("{}.session", phone.trim_start_matches('+'));
    let entered = prompt(&format!(
        "Output session file (or press Enter for '{default_name}'): "
    ))?;
    let output = if entered.is_empty() { default_name } else { entered };

    cli::report(tgsc::write_session(&record, format, Some(Path::new(&output)))?);
    Ok(())
}

async fn convert_file(
    from: SessionFormat,
    to: SessionFormat,
    default_output: &str,
) -> anyhow::Result<()> {
    let input = prompt(&format!("Enter the {from} session file path: "))?;
    let entered = prompt(&format!(
        "Output path (or press Enter for '{default_output}'): "
    ))?;
    let output = if entered.is_empty() {
        default_output.to_string()
    } else {
        entered
    };

    let mut record = tgsc::read_session(&input, from, &ReadOptions::default())?;
    complete_for_target(&mut record, to).await?;

    cli::report(tgsc::write_session(&record, to, Some(Path::new(&output)))?);

    if confirm("Delete the original session file? (yes/no): ")? {
        std::fs::remove_file(&input)?;
        println!("Original session file deleted");
    }
    Ok(())
}

async fn export_string() -> anyhow::Result<()> {
    let input = prompt("Enter the session file path: ")?;
    let from = tgsc::detect_format(&input)?;
    let to = match from {
        SessionFormat::Pyrogram | SessionFormat::PyrogramString => SessionFormat::PyrogramString,
        _ => SessionFormat::TelethonString,
    };

    let mut record = tgsc::read_session(&input, from, &ReadOptions::default())?;
    complete_for_target(&mut record, to).await?;

    println!("String session (keep this private):");
    cli::report(tgsc::write_session(&record, to, None)?);

    if confirm("Save this string session to a file? (yes/no): ")? {
        let entered = prompt("Enter filename (or press Enter for 'string_session.txt'): ")?;
        let name = if entered.is_empty() {
            "string_session.txt".to_string()
        } else {
            entered
        };
        tgsc::write_session(&record, to, Some(Path::new(&name)))?;
        println!("✅ String session saved to {name}");
    }
    Ok(())
}

async fn check_session() -> anyhow::Result<()> {
    let session = prompt("Enter the session file path or string: ")?;
    let creds = obtain_credentials()?;
    cli::report_validity(&session, None, &creds).await
}

fn delete_session() -> anyhow::Result<()> {
    let entered = prompt("Enter the session file path to delete: ")?;
    let path = if entered.ends_with(".session") {
        PathBuf::from(entered)
    } else {
        PathBuf::from(format!("{entered}.session"))
    };

    if !path.is_file() {
        anyhow::bail!("session file not found: {}", path.display());
    }

    let question = format!("Are you sure you want to delete {}? (yes/no): ", path.display());
    if !confirm(&question)? {
        println!("Deletion cancelled");
        return Ok(());
    }

    std::fs::remove_file(&path)?;
    println!("✅ Session file {} deleted", path.display());
    Ok(())
}

fn create_credentials_file() -> anyhow::Result<()> {
    let api_id: i32 = prompt("Enter your API ID: ")?
        .parse()
        .context("the API ID must be an integer")?;
    let api_hash = prompt("Enter your API Hash: ")?;

    let default_path = config::default_config_path();
    let entered = prompt(&format!(
        "File path to save credentials (or press Enter for '{}'): ",
        default_path.display()
    ))?;
    let path = if entered.is_empty() {
        default_path
    } else {
        PathBuf::from(entered)
    };

    config::save(&ApiCredentials { api_id, api_hash }, &path)?;
    println!("✅ Credentials saved to {}", path.display());
    Ok(())
}

/// Resolve credentials the usual way, falling back to prompts
fn obtain_credentials() -> anyhow::Result<ApiCredentials> {
    if let Ok(resolved) = config::resolve(None, None) {
        println!("Using API credentials from the {}", resolved.id_source);
        return Ok(resolved.credentials);
    }

    let api_id: i32 = prompt("Enter your API ID: ")?
        .parse()
        .context("the API ID must be an integer")?;
    let api_hash = prompt("Enter your API Hash: ")?;
    let creds = ApiCredentials { api_id, api_hash };

    if confirm("Save these credentials for next time? (yes/no): ")? {
        let path = config::default_config_path();
        config::save(&creds, &path)?;
        println!("Saved to {}", path.display());
    }
    Ok(creds)
}

/// Fill the fields a Pyrogram target persists when the source lacks them.
/// The account id can be fetched over the network with the session itself.
async fn complete_for_target(record: &mut SessionRecord, to: SessionFormat) -> anyhow::Result<()> {
    if !matches!(to, SessionFormat::Pyrogram | SessionFormat::PyrogramString) {
        return Ok(());
    }

    if record.user_id.is_none()
        && confirm("The source stores no account id. Fetch it from Telegram? (yes/no): ")?
    {
        let creds = obtain_credentials()?;
        if record.api_id.is_none() {
            record.api_id = Some(creds.api_id);
        }
        match validate::check(record, &creds).await? {
            SessionStatus::Valid(account) => record.user_id = Some(account.id),
            SessionStatus::Invalid => {
                anyhow::bail!("the session is no longer authorized, cannot fetch the account id")
            }
        }
    }

    if record.api_id.is_none() {
        if let Ok(resolved) = config::resolve(None, None) {
            record.api_id = Some(resolved.credentials.api_id);
        }
    }
    Ok(())
}

fn confirm(message: &str) -> anyhow::Result<bool> {
    let answer = prompt(message)?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}
