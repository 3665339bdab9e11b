//! Session format dispatch
//!
//! Maps declared or detected formats to the concrete readers and writers.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::session::SessionRecord;
use crate::tdata::TdataFolder;
use crate::{pyrogram, telethon, Error, Result};

/// The supported session representations
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SessionFormat {
    /// Telethon SQLite session file
    Telethon,
    /// Pyrogram SQLite session file
    Pyrogram,
    /// Telethon string session
    TelethonString,
    /// Pyrogram string session
    PyrogramString,
    /// Telegram Desktop tdata folder (source only)
    Tdata,
}

impl SessionFormat {
    /// Whether the format is an encoded string rather than a file
    pub fn is_string(self) -> bool {
        matches!(self, Self::TelethonString | Self::PyrogramString)
    }
}

impl fmt::Display for SessionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Telethon => "telethon",
            Self::Pyrogram => "pyrogram",
            Self::TelethonString => "telethon-string",
            Self::PyrogramString => "pyrogram-string",
            Self::Tdata => "tdata",
        })
    }
}

/// Source-side options that only apply to some formats
#[derive(Debug, Default, Clone)]
pub struct ReadOptions {
    /// Local passcode for tdata folders
    pub passcode: Option<String>,
    /// Account slot for multi-account tdata folders
    pub account: usize,
}

/// What a conversion produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A session file was written
    File(PathBuf),
    /// A string session; printed when no output path was given
    Text(String),
}

/// Read a session artifact in the given format
///
/// For string formats the input may be the string itself or a path to a
/// text file holding it.
pub fn read_session(input: &str, format: SessionFormat, opts: &ReadOptions) -> Result<SessionRecord> {
    match format {
        SessionFormat::Telethon => telethon::read_file(Path::new(input)),
        SessionFormat::Pyrogram => pyrogram::read_file(Path::new(input)),
        SessionFormat::TelethonString => telethon::decode_string(&resolve_string(input)?),
        SessionFormat::PyrogramString => pyrogram::decode_string(&resolve_string(input)?),
        SessionFormat::Tdata => {
            let passcode = opts.passcode.as_deref().unwrap_or("");
            TdataFolder::open(input)?.account(passcode, opts.account)
        }
    }
}

/// Write a record in the given target format
///
/// File targets need an output path; string targets return the string, or
/// write it to `output` when one is given.
pub fn write_session(
    record: &SessionRecord,
    format: SessionFormat,
    output: Option<&Path>,
) -> Result<Artifact> {
    match format {
        SessionFormat::Telethon => {
            let path = required_output(output, format)?;
            telethon::write_file(record, path)?;
            Ok(Artifact::File(path.to_path_buf()))
        }
        SessionFormat::Pyrogram => {
            let path = required_output(output, format)?;
            pyrogram::write_file(record, path)?;
            Ok(Artifact::File(path.to_path_buf()))
        }
        SessionFormat::TelethonString => {
            finish_string(telethon::encode_string(record), output)
        }
        SessionFormat::PyrogramString => {
            finish_string(pyrogram::encode_string(record)?, output)
        }
        SessionFormat::Tdata => Err(Error::UnsupportedTarget { format }),
    }
}

/// Classify a session artifact
///
/// Directories are tdata folders. SQLite files are told apart by their
/// sessions table: only Telethon stores a server_address column. Everything
/// else is tried as a string session.
pub fn detect_format(input: &str) -> Result<SessionFormat> {
    let path = Path::new(input);

    if path.is_dir() {
        return Ok(SessionFormat::Tdata);
    }

    if path.is_file() {
        let head = std::fs::read(path)?;
        if head.starts_with(b"SQLite format 3\0") {
            return classify_database(path);
        }

        let text = String::from_utf8(head)
            .map_err(|_| unknown(&path.display().to_string()))?;
        return detect_string(text.trim()).ok_or_else(|| unknown(&path.display().to_string()));
    }

    detect_string(input.trim()).ok_or_else(|| unknown("the given string"))
}

fn classify_database(path: &Path) -> Result<SessionFormat> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut stmt = conn.prepare("PRAGMA table_info(sessions)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<_, _>>()?;

    if columns.is_empty() {
        return Err(unknown(&path.display().to_string()));
    }

    if columns.iter().any(|c| c == "server_address") {
        Ok(SessionFormat::Telethon)
    } else if columns.iter().any(|c| c == "dc_id") {
        Ok(SessionFormat::Pyrogram)
    } else {
        Err(unknown(&path.display().to_string()))
    }
}

fn detect_string(s: &str) -> Option<SessionFormat> {
    if telethon::decode_string(s).is_ok() {
        Some(SessionFormat::TelethonString)
    } else if pyrogram::decode_string(s).is_ok() {
        Some(SessionFormat::PyrogramString)
    } else {
        None
    }
}

fn unknown(artifact: &str) -> Error {
    Error::UnknownFormat {
        artifact: artifact.to_string(),
    }
}

/// Accept a literal string session or a path to a file containing one
fn resolve_string(input: &str) -> Result<String> {
    let path = Path::new(input);
    if path.is_file() {
        Ok(std::fs::read_to_string(path)?.trim().to_string())
    } else {
        Ok(input.to_string())
    }
}

fn required_output(output: Option<&Path>, format: SessionFormat) -> Result<&Path> {
    output.ok_or(Error::OutputRequired { format })
}

fn finish_string(session: String, output: Option<&Path>) -> Result<Artifact> {
    match output {
        Some(path) => {
            std::fs::write(path, format!("{session}\n"))?;
            Ok(Artifact::File(path.to_path_buf()))
        }
        None => Ok(Artifact::Text(session)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AUTH_KEY_SIZE;

    fn full_record() -> SessionRecord {
        let mut record = SessionRecord::new(2, [0x21; AUTH_KEY_SIZE]).unwrap();
        record.user_id = Some(1111);
        record.api_id = Some(424242);
        record
    }

    #[test]
    fn detects_written_session_files() {
        let dir = tempfile::tempdir().unwrap();

        let telethon_path = dir.path().join("a.session");
        telethon::write_file(&full_record(), &telethon_path).unwrap();
        assert_eq!(
            detect_format(telethon_path.to_str().unwrap()).unwrap(),
            SessionFormat::Telethon
        );

        let pyrogram_path = dir.path().join("b.session");
        pyrogram::write_file(&full_record(), &pyrogram_path).unwrap();
        assert_eq!(
            detect_format(pyrogram_path.to_str().unwrap()).unwrap(),
            SessionFormat::Pyrogram
        );
    }

    #[test]
    fn detects_string_sessions() {
        let record = full_record();

        let t = telethon::encode_string(&record);
        assert_eq!(detect_format(&t).unwrap(), SessionFormat::TelethonString);

        let p = pyrogram::encode_string(&record).unwrap();
        assert_eq!(detect_format(&p).unwrap(), SessionFormat::PyrogramString);
    }

    #[test]
    fn detects_directories_as_tdata() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            detect_format(dir.path().to_str().unwrap()).unwrap(),
            SessionFormat::Tdata
        );
    }

    #[test]
    fn garbage_is_unknown() {
        assert!(matches!(
            detect_format("definitely not a session"),
            Err(Error::UnknownFormat { .. })
        ));
    }

    #[test]
    fn string_target_writes_file_when_output_given() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("session.txt");

        let artifact = write_session(
            &full_record(),
            SessionFormat::TelethonString,
            Some(&out),
        )
        .unwrap();

        assert_eq!(artifact, Artifact::File(out.clone()));
        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.trim().starts_with('1'));

        // And the saved file reads back through the dispatcher
        let loaded = read_session(
            out.to_str().unwrap(),
            SessionFormat::TelethonString,
            &ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(loaded.auth_key, full_record().auth_key);
    }

    #[test]
    fn file_target_requires_output() {
        assert!(matches!(
            write_session(&full_record(), SessionFormat::Telethon, None),
            Err(Error::OutputRequired { .. })
        ));
    }

    #[test]
    fn tdata_target_is_unsupported() {
        assert!(matches!(
            write_session(&full_record(), SessionFormat::Tdata, None),
            Err(Error::UnsupportedTarget {
                format: SessionFormat::Tdata
            })
        ));
    }
}
