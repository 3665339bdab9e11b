//! Pyrogram session format
//!
//! SQLite-backed session files (storage version 3) and the unpadded string
//! session encoding. Older storage layouts lack the api_id column, so the
//! file reader resolves columns by name instead of position; legacy string
//! layouts are told apart by decoded length.

use std::net::IpAddr;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rusqlite::{params, Connection, OpenFlags};

use crate::formats::SessionFormat;
use crate::session::{dc_address, SessionRecord};
use crate::{Error, Result, AUTH_KEY_SIZE};

/// Pyrogram storage version
const STORAGE_VERSION: i32 = 3;

/// Current string layout: dc, api_id, test, key, 64-bit user id, bot flag
const STRING_LEN: usize = 1 + 4 + 1 + AUTH_KEY_SIZE + 8 + 1;

/// Legacy layout with a 64-bit user id and no api_id
const STRING_LEN_OLD_64: usize = 1 + 1 + AUTH_KEY_SIZE + 8 + 1;

/// Legacy layout with a 32-bit user id and no api_id
const STRING_LEN_OLD: usize = 1 + 1 + AUTH_KEY_SIZE + 4 + 1;

const SCHEMA: &str = "
CREATE TABLE sessions (
    dc_id     INTEGER PRIMARY KEY,
    api_id    INTEGER,
    test_mode INTEGER,
    auth_key  BLOB,
    date      INTEGER NOT NULL,
    user_id   INTEGER,
    is_bot    INTEGER
);
CREATE TABLE peers (
    id             INTEGER PRIMARY KEY,
    access_hash    INTEGER,
    type           INTEGER NOT NULL,
    username       TEXT,
    phone_number   TEXT,
    last_update_on INTEGER NOT NULL DEFAULT (CAST(STRFTIME('%s', 'now') AS INTEGER))
);
CREATE TABLE version (number INTEGER PRIMARY KEY);
CREATE INDEX idx_peers_id ON peers (id);
CREATE INDEX idx_peers_username ON peers (username);
CREATE INDEX idx_peers_phone_number ON peers (phone_number);
";

/// Read a Pyrogram session file, any storage version
pub fn read_file(path: &Path) -> Result<SessionRecord> {
    if !path.is_file() {
        return Err(Error::SessionNotFound {
            path: path.to_path_buf(),
        });
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut stmt = conn
        .prepare("SELECT * FROM sessions")
        .map_err(|e| Error::corrupt(format!("not a Pyrogram session: {e}")))?;

    let names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let col = |name: &str| names.iter().position(|n| n == name);

    let dc_idx = col("dc_id").ok_or_else(|| Error::corrupt("sessions table has no dc_id"))?;
    let key_idx = col("auth_key").ok_or_else(|| Error::corrupt("sessions table has no auth_key"))?;
    let api_idx = col("api_id");
    let test_idx = col("test_mode");
    let user_idx = col("user_id");
    let bot_idx = col("is_bot");

    type RawRow = (i32, Option<Vec<u8>>, Option<i64>, Option<i64>, Option<i64>, Option<i64>);
    let (dc_id, key, api_id, test_mode, user_id, is_bot): RawRow = stmt
        .query_row([], |row| {
            Ok((
                row.get(dc_idx)?,
                row.get(key_idx)?,
                match api_idx {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                match test_idx {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                match user_idx {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                match bot_idx {
                    Some(i) => row.get(i)?,
                    None => None,
                },
            ))
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::corrupt("no session row in file"),
            e => Error::corrupt(format!("unreadable Pyrogram session: {e}")),
        })?;

    let key = key.ok_or_else(|| Error::corrupt("session has no auth key"))?;
    let auth_key = key_from_slice(&key)?;
    let test = test_mode.unwrap_or(0) != 0;

    let (ip, port) = dc_address(dc_id, test)?;
    let mut record = SessionRecord::with_address(dc_id, IpAddr::V4(ip), port, auth_key)?;
    record.user_id = user_id;
    record.api_id = api_id.map(|v| v as i32);
    record.is_bot = is_bot.unwrap_or(0) != 0;
    Ok(record)
}

/// Write a Pyrogram session file, replacing any existing file
///
/// The date column is written as 0 so identical records produce identical
/// files.
pub fn write_file(record: &SessionRecord, path: &Path) -> Result<()> {
    let user_id = record.user_id.ok_or(Error::MissingField {
        field: "user_id",
        target: SessionFormat::Pyrogram,
    })?;

    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    conn.execute("INSERT INTO version VALUES (?1)", params![STORAGE_VERSION])?;
    conn.execute(
        "INSERT INTO sessions (dc_id, api_id, test_mode, auth_key, date, user_id, is_bot)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        params![
            record.dc_id,
            record.api_id,
            record.test_mode,
            &record.auth_key[..],
            user_id,
            record.is_bot,
        ],
    )?;

    tracing::debug!(path = %path.display(), dc_id = record.dc_id, "wrote Pyrogram session");
    Ok(())
}

/// Encode a record as a Pyrogram string session (current layout)
pub fn encode_string(record: &SessionRecord) -> Result<String> {
    let user_id = record.user_id.ok_or(Error::MissingField {
        field: "user_id",
        target: SessionFormat::PyrogramString,
    })?;
    let api_id = record.api_id.ok_or(Error::MissingField {
        field: "api_id",
        target: SessionFormat::PyrogramString,
    })?;

    let mut packed = Vec::with_capacity(STRING_LEN);
    packed.push(record.dc_id as u8);
    packed.extend_from_slice(&(api_id as u32).to_be_bytes());
    packed.push(record.test_mode as u8);
    packed.extend_from_slice(&record.auth_key);
    packed.extend_from_slice(&(user_id as u64).to_be_bytes());
    packed.push(record.is_bot as u8);

    Ok(URL_SAFE_NO_PAD.encode(packed))
}

/// Decode a Pyrogram string session, current or legacy layout
pub fn decode_string(session: &str) -> Result<SessionRecord> {
    let session = session.trim().trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(session)
        .map_err(|e| Error::corrupt(format!("invalid base64 in string session: {e}")))?;

    let (dc_id, api_id, test, key_at, user_id, is_bot) = match decoded.len() {
        STRING_LEN => {
            let api = u32::from_be_bytes(decoded[1..5].try_into().unwrap());
            let user = u64::from_be_bytes(
                decoded[6 + AUTH_KEY_SIZE..14 + AUTH_KEY_SIZE].try_into().unwrap(),
            );
            (
                decoded[0] as i32,
                Some(api as i32),
                decoded[5] != 0,
                6,
                user as i64,
                decoded[14 + AUTH_KEY_SIZE] != 0,
            )
        }
        STRING_LEN_OLD_64 => {
            let user = u64::from_be_bytes(
                decoded[2 + AUTH_KEY_SIZE..10 + AUTH_KEY_SIZE].try_into().unwrap(),
            );
            (
                decoded[0] as i32,
                None,
                decoded[1] != 0,
                2,
                user as i64,
                decoded[10 + AUTH_KEY_SIZE] != 0,
            )
        }
        STRING_LEN_OLD => {
            let user = u32::from_be_bytes(
                decoded[2 + AUTH_KEY_SIZE..6 + AUTH_KEY_SIZE].try_into().unwrap(),
            );
            (
                decoded[0] as i32,
                None,
                decoded[1] != 0,
                2,
                user as i64,
                decoded[6 + AUTH_KEY_SIZE] != 0,
            )
        }
        n => {
            return Err(Error::corrupt(format!(
                "unexpected string session payload length: {n}"
            )))
        }
    };

    let auth_key = key_from_slice(&decoded[key_at..key_at + AUTH_KEY_SIZE])?;

    let (ip, port) = dc_address(dc_id, test)?;
    let mut record = SessionRecord::with_address(dc_id, IpAddr::V4(ip), port, auth_key)?;
    record.user_id = Some(user_id);
    record.api_id = api_id;
    record.is_bot = is_bot;
    Ok(record)
}

fn key_from_slice(bytes: &[u8]) -> Result<[u8; AUTH_KEY_SIZE]> {
    bytes.try_into().map_err(|_| {
        Error::corrupt(format!(
            "auth key must be {} bytes, got {}",
            AUTH_KEY_SIZE,
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> SessionRecord {
        let mut record = SessionRecord::new(2, [0x7E; AUTH_KEY_SIZE]).unwrap();
        record.user_id = Some(123456789);
        record.api_id = Some(17349);
        record
    }

    #[test]
    fn string_session_round_trips() {
        let record = sample_record();
        let s = encode_string(&record).unwrap();

        assert_eq!(s.len(), 362);
        assert!(!s.contains('='));

        let decoded = decode_string(&s).unwrap();
        assert_eq!(decoded.dc_id, record.dc_id);
        assert_eq!(decoded.auth_key, record.auth_key);
        assert_eq!(decoded.user_id, record.user_id);
        assert_eq!(decoded.api_id, record.api_id);
        assert!(!decoded.is_bot);
    }

    #[test]
    fn legacy_string_with_wide_user_id_decodes() {
        let mut packed = Vec::with_capacity(STRING_LEN_OLD_64);
        packed.push(1u8);
        packed.push(0u8);
        packed.extend_from_slice(&[0x42; AUTH_KEY_SIZE]);
        packed.extend_from_slice(&98765432100u64.to_be_bytes());
        packed.push(1u8);

        let record = decode_string(&URL_SAFE_NO_PAD.encode(packed)).unwrap();
        assert_eq!(record.dc_id, 1);
        assert_eq!(record.user_id, Some(98765432100));
        assert_eq!(record.api_id, None);
        assert!(record.is_bot);
    }

    #[test]
    fn legacy_string_with_narrow_user_id_decodes() {
        let mut packed = Vec::with_capacity(STRING_LEN_OLD);
        packed.push(4u8);
        packed.push(0u8);
        packed.extend_from_slice(&[0x43; AUTH_KEY_SIZE]);
        packed.extend_from_slice(&44332211u32.to_be_bytes());
        packed.push(0u8);

        let record = decode_string(&URL_SAFE_NO_PAD.encode(packed)).unwrap();
        assert_eq!(record.dc_id, 4);
        assert_eq!(record.user_id, Some(44332211));
        assert_eq!(record.auth_key, [0x43; AUTH_KEY_SIZE]);
    }

    #[test]
    fn padded_input_is_accepted() {
        let record = sample_record();
        let s = format!("{}==", encode_string(&record).unwrap());
        assert_eq!(decode_string(&s).unwrap().auth_key, record.auth_key);
    }

    #[test]
    fn encode_requires_user_and_api_id() {
        let mut record = sample_record();
        record.user_id = None;
        assert!(matches!(
            encode_string(&record),
            Err(Error::MissingField {
                field: "user_id",
                ..
            })
        ));

        let mut record = sample_record();
        record.api_id = None;
        assert!(matches!(
            encode_string(&record),
            Err(Error::MissingField { field: "api_id", .. })
        ));
    }

    #[test]
    fn file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.session");

        let record = sample_record();
        write_file(&record, &path).unwrap();

        let loaded = read_file(&path).unwrap();
        assert_eq!(loaded.dc_id, record.dc_id);
        assert_eq!(loaded.auth_key, record.auth_key);
        assert_eq!(loaded.user_id, record.user_id);
        assert_eq!(loaded.api_id, record.api_id);
        assert_eq!(loaded.is_bot, record.is_bot);
        assert!(!loaded.test_mode);
    }

    #[test]
    fn file_write_requires_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nouser.session");

        let mut record = sample_record();
        record.user_id = None;

        assert!(matches!(
            write_file(&record, &path),
            Err(Error::MissingField {
                field: "user_id",
                ..
            })
        ));
        // No malformed artifact is left behind
        assert!(!path.exists());
    }

    #[test]
    fn written_file_is_version_three_with_zero_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.session");
        write_file(&sample_record(), &path).unwrap();

        let conn = Connection::open(&path).unwrap();
        let version: i32 = conn
            .query_row("SELECT number FROM version", [], |row| row.get(0))
            .unwrap();
        let date: i64 = conn
            .query_row("SELECT date FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, STORAGE_VERSION);
        assert_eq!(date, 0);
    }

    #[test]
    fn reads_legacy_layout_without_api_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.session");

        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sessions (
                dc_id INTEGER PRIMARY KEY,
                test_mode INTEGER,
                auth_key BLOB,
                date INTEGER NOT NULL,
                user_id INTEGER,
                is_bot INTEGER
            );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO sessions VALUES (?1, 0, ?2, 0, ?3, 0)",
            params![5, &[0x66u8; AUTH_KEY_SIZE][..], 31337],
        )
        .unwrap();
        drop(conn);

        let record = read_file(&path).unwrap();
        assert_eq!(record.dc_id, 5);
        assert_eq!(record.api_id, None);
        assert_eq!(record.user_id, Some(31337));
        assert_eq!(record.auth_key, [0x66; AUTH_KEY_SIZE]);
    }

    #[test]
    fn unknown_dc_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baddc.session");

        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO sessions VALUES (9, NULL, 0, ?1, 0, 1, 0)",
            params![&[0u8; AUTH_KEY_SIZE][..]],
        )
        .unwrap();
        drop(conn);

        assert!(matches!(
            read_file(&path),
            Err(Error::UnknownDc { dc_id: 9 })
        ));
    }
}
