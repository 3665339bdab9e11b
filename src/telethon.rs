//! Telethon session format
//!
//! SQLite-backed session files (schema version 7) and the `1`-prefixed
//! string session encoding.

use std::net::IpAddr;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use rusqlite::{params, Connection, OpenFlags};

use crate::session::SessionRecord;
use crate::{Error, Result, AUTH_KEY_SIZE};

/// Telethon session schema version
const SESSION_VERSION: i32 = 7;

/// Version prefix of Telethon string sessions
const STRING_PREFIX: char = '1';

const SCHEMA: &str = "
CREATE TABLE version (version integer primary key);
CREATE TABLE sessions (
    dc_id integer primary key,
    server_address text,
    port integer,
    auth_key blob,
    takeout_id integer
);
CREATE TABLE entities (
    id integer primary key,
    hash integer not null,
    username text,
    phone integer,
    name text,
    date integer
);
CREATE TABLE sent_files (
    md5_digest blob,
    file_size integer,
    type integer,
    id integer,
    hash integer,
    primary key(md5_digest, file_size, type)
);
CREATE TABLE update_state (
    id integer primary key,
    pts integer,
    qts integer,
    date integer,
    seq integer
);
";

/// Read a Telethon session file
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

    let (dc_id, address, port, key): (i32, String, u16, Vec<u8>) = conn
        .query_row(
            "SELECT dc_id, server_address, port, auth_key FROM sessions
             WHERE auth_key IS NOT NULL",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::corrupt("no authorized session row in file")
            }
            e => Error::corrupt(format!("not a Telethon session: {e}")),
        })?;

    let server_address: IpAddr = address
        .parse()
        .map_err(|_| Error::corrupt(format!("invalid server address: {address}")))?;
    let auth_key = key_from_slice(&key)?;

    SessionRecord::with_address(dc_id, server_address, port, auth_key)
}

/// Write a Telethon session file, replacing any existing file
pub fn write_file(record: &SessionRecord, path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    conn.execute("INSERT INTO version VALUES (?1)", params![SESSION_VERSION])?;
    conn.execute(
        "INSERT INTO sessions (dc_id, server_address, port, auth_key, takeout_id)
         VALUES (?1, ?2, ?3, ?4, NULL)",
        params![
            record.dc_id,
            record.server_address.to_string(),
            record.port,
            &record.auth_key[..],
        ],
    )?;

    tracing::debug!(path = %path.display(), dc_id = record.dc_id, "wrote Telethon session");
    Ok(())
}

/// Encode a record as a Telethon string session
///
/// `1` followed by url-safe base64 (with padding) of big-endian
/// dc id, IP bytes, port and auth key.
pub fn encode_string(record: &SessionRecord) -> String {
    let ip_bytes: Vec<u8> = match record.server_address {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    };

    let mut packed = Vec::with_capacity(1 + ip_bytes.len() + 2 + AUTH_KEY_SIZE);
    packed.push(record.dc_id as u8);
    packed.extend_from_slice(&ip_bytes);
    packed.extend_from_slice(&record.port.to_be_bytes());
    packed.extend_from_slice(&record.auth_key);

    format!("{}{}", STRING_PREFIX, URL_SAFE.encode(packed))
}

/// Decode a Telethon string session
pub fn decode_string(session: &str) -> Result<SessionRecord> {
    let session = session.trim();
    let payload = session
        .strip_prefix(STRING_PREFIX)
        .ok_or_else(|| Error::corrupt("Telethon string session must start with '1'"))?;

    let decoded = URL_SAFE
        .decode(repad(payload))
        .map_err(|e| Error::corrupt(format!("invalid base64 in string session: {e}")))?;

    // 1 + ip + 2 + 256, with a 4- or 16-byte ip
    let ip_len = match decoded.len() {
        263 => 4,
        275 => 16,
        n => {
            return Err(Error::corrupt(format!(
                "unexpected string session payload length: {n}"
            )))
        }
    };

    let dc_id = decoded[0] as i32;
    let server_address: IpAddr = if ip_len == 4 {
        let octets: [u8; 4] = decoded[1..5].try_into().unwrap();
        IpAddr::from(octets)
    } else {
        let octets: [u8; 16] = decoded[1..17].try_into().unwrap();
        IpAddr::from(octets)
    };
    let port = u16::from_be_bytes([decoded[1 + ip_len], decoded[2 + ip_len]]);
    let auth_key = key_from_slice(&decoded[3 + ip_len..])?;

    SessionRecord::with_address(dc_id, server_address, port, auth_key)
}

/// Restore the standard base64 padding Telethon writes
fn repad(payload: &str) -> String {
    let rem = payload.len() % 4;
    if rem == 0 {
        payload.to_string()
    } else {
        format!("{}{}", payload, "=".repeat(4 - rem))
    }
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
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn sample_record() -> SessionRecord {
        SessionRecord::new(2, [0x5A; AUTH_KEY_SIZE]).unwrap()
    }

    #[test]
    fn string_session_round_trips() {
        let record = sample_record();
        let s = encode_string(&record);

        assert!(s.starts_with('1'));
        assert_eq!(s.len(), 353);

        let decoded = decode_string(&s).unwrap();
        assert_eq!(decoded.dc_id, record.dc_id);
        assert_eq!(decoded.server_address, record.server_address);
        assert_eq!(decoded.port, record.port);
        assert_eq!(decoded.auth_key, record.auth_key);
    }

    #[test]
    fn string_session_round_trips_ipv6() {
        let addr = IpAddr::V6(Ipv6Addr::new(0x2001, 0xb28, 0xf23d, 0xf001, 0, 0, 0, 0xa));
        let record =
            SessionRecord::with_address(1, addr, 443, [0x11; AUTH_KEY_SIZE]).unwrap();

        let s = encode_string(&record);
        let decoded = decode_string(&s).unwrap();

        assert_eq!(decoded.server_address, addr);
        assert_eq!(decoded.auth_key, record.auth_key);
    }

    #[test]
    fn string_session_is_deterministic() {
        let record = sample_record();
        assert_eq!(encode_string(&record), encode_string(&record));
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert!(matches!(
            decode_string("2AAAA"),
            Err(Error::CorruptSession { .. })
        ));
        assert!(matches!(
            decode_string("1%%%%"),
            Err(Error::CorruptSession { .. })
        ));
        // Valid base64, wrong payload size
        assert!(matches!(
            decode_string(&format!("1{}", URL_SAFE.encode([0u8; 32]))),
            Err(Error::CorruptSession { .. })
        ));
    }

    #[test]
    fn file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.session");

        let mut record = sample_record();
        record.user_id = Some(42);
        write_file(&record, &path).unwrap();

        let loaded = read_file(&path).unwrap();
        assert_eq!(loaded.dc_id, record.dc_id);
        assert_eq!(loaded.server_address, record.server_address);
        assert_eq!(loaded.port, record.port);
        assert_eq!(loaded.auth_key, record.auth_key);
        // The file format does not store a user id
        assert_eq!(loaded.user_id, None);
    }

    #[test]
    fn written_file_has_version_seven() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.session");
        write_file(&sample_record(), &path).unwrap();

        let conn = Connection::open(&path).unwrap();
        let version: i32 = conn
            .query_row("SELECT version FROM version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SESSION_VERSION);
    }

    #[test]
    fn missing_file_is_session_not_found() {
        assert!(matches!(
            read_file(Path::new("/no/such/file.session")),
            Err(Error::SessionNotFound { .. })
        ));
    }

    #[test]
    fn non_database_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.session");
        std::fs::write(&path, b"this is not sqlite").unwrap();

        assert!(matches!(
            read_file(&path),
            Err(Error::CorruptSession { .. })
        ));
    }

    #[test]
    fn test_dc_address_sets_test_mode_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.session");

        let addr = IpAddr::V4(Ipv4Addr::new(149, 154, 167, 40));
        let record =
            SessionRecord::with_address(2, addr, 443, [0x33; AUTH_KEY_SIZE]).unwrap();
        write_file(&record, &path).unwrap();

        let loaded = read_file(&path).unwrap();
        assert!(loaded.test_mode);
    }
}
