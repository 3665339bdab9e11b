//! Telegram Desktop tdata reader
//!
//! Read-only source format: extracts the accounts stored in a `tdata` folder
//! and maps each one to a canonical session record. Writing tdata is not
//! supported.

use std::fs;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::crypto::{create_local_key, decrypt_local, LocalKey};
use crate::qdatastream::QDataStream;
use crate::session::SessionRecord;
use crate::{Error, Result, AUTH_KEY_SIZE};

/// Magic bytes at the start of tdata files
const TDATA_MAGIC: [u8; 4] = *b"TDF$";

/// Key file name used by current Telegram Desktop versions
const KEY_FILE: &str = "data";

/// Maximum number of accounts Telegram Desktop stores in one folder
pub const MAX_ACCOUNTS: usize = 3;

/// Block id of the MTP authorization section inside account data
const DBI_MTP_AUTHORIZATION: i32 = 0x4B;

/// Tag marking the 64-bit user id layout
const K_WIDE_IDS_TAG: i64 = !0i64;

/// A tdata folder on disk
#[derive(Debug)]
pub struct TdataFolder {
    base_path: PathBuf,
}

impl TdataFolder {
    /// Open a tdata folder
    ///
    /// Accepts either the `tdata` directory itself or its parent (the
    /// Telegram Desktop installation folder).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut base_path = expand_home(path.as_ref());

        if !base_path.exists() {
            return Err(Error::SessionNotFound { path: base_path });
        }

        let has_key = base_path.join(format!("key_{KEY_FILE}")).is_file()
            || base_path.join(format!("key_{KEY_FILE}s")).is_file();
        if !has_key {
            let child = base_path.join("tdata");
            if child.is_dir() {
                base_path = child;
            }
        }

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Read every account the folder holds
    ///
    /// The passcode is the Local Passcode, empty when the folder is not
    /// protected. Accounts that fail to load are skipped with a warning;
    /// an empty result is an error.
    pub fn accounts(&self, passcode: &str) -> Result<Vec<SessionRecord>> {
        let (local_key, indices) = self.load_key(passcode)?;

        let mut records = Vec::new();
        for index in indices {
            match self.load_account(index, &local_key) {
                Ok(record) => {
                    tracing::info!(
                        index,
                        dc_id = record.dc_id,
                        user_id = record.user_id,
                        "loaded tdata account"
                    );
                    records.push(record);
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "failed to load tdata account");
                }
            }
        }

        if records.is_empty() {
            return Err(Error::NoAccounts);
        }

        Ok(records)
    }

    /// Read one account by position, 0 being the main account
    pub fn account(&self, passcode: &str, index: usize) -> Result<SessionRecord> {
        let mut records = self.accounts(passcode)?;

        if index >= records.len() {
            return Err(Error::AccountIndexOutOfRange {
                index,
                found: records.len(),
            });
        }

        Ok(records.swap_remove(index))
    }

    /// Decrypt the key file, yielding the local key and account indices
    fn load_key(&self, passcode: &str) -> Result<(LocalKey, Vec<i32>)> {
        let file = read_versioned_file(&format!("key_{KEY_FILE}"), &self.base_path)?;

        let mut stream = QDataStream::new(&file.data);
        let salt = stream.read_qbytearray()?;
        let key_encrypted = stream.read_qbytearray()?;
        let info_encrypted = stream.read_qbytearray()?;

        let passcode_key = create_local_key(&salt, passcode.as_bytes());

        // A checksum failure here means the passcode key is wrong, not that
        // the file is damaged
        let decrypted_key = match decrypt_local(&key_encrypted, &passcode_key) {
            Err(Error::ChecksumMismatch) => return Err(Error::WrongPasscode),
            other => other?,
        };

        if decrypted_key.len() < AUTH_KEY_SIZE {
            return Err(Error::corrupt(format!(
                "decrypted key too short: {} bytes",
                decrypted_key.len()
            )));
        }
        let local_key = LocalKey::from_bytes(&decrypted_key[..AUTH_KEY_SIZE])?;

        let decrypted_info = decrypt_local(&info_encrypted, &local_key)?;
        let mut info_stream = QDataStream::new(&decrypted_info);

        let count = info_stream.read_i32()?;
        if count <= 0 || count > MAX_ACCOUNTS as i32 {
            return Err(Error::corrupt(format!("invalid account count: {count}")));
        }

        let mut indices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = info_stream.read_i32()?;
            if (0..MAX_ACCOUNTS as i32).contains(&index) {
                indices.push(index);
            }
        }

        Ok((local_key, indices))
    }

    /// Load one account slot and map it to a canonical record
    fn load_account(&self, index: i32, local_key: &LocalKey) -> Result<SessionRecord> {
        let file_name = file_name_for_account(KEY_FILE, index);
        tracing::debug!(index, file = %file_name, "reading account data");

        let file = read_versioned_file(&file_name, &self.base_path)?;

        let mut stream = QDataStream::new(&file.data);
        let encrypted = stream.read_qbytearray()?;
        let decrypted = decrypt_local(&encrypted, local_key)?;

        let auth = parse_mtp_authorization(&decrypted)?;

        let mut record = SessionRecord::new(auth.dc_id, auth.auth_key)?;
        record.user_id = Some(auth.user_id);
        Ok(record)
    }
}

/// Raw content of one versioned tdata file
#[derive(Debug)]
struct FileDescriptor {
    #[allow(dead_code)]
    version: u32,
    data: Vec<u8>,
}

/// Read a tdata file, falling back to its `s` backup
fn read_versioned_file(name: &str, base_path: &Path) -> Result<FileDescriptor> {
    let path = base_path.join(name);
    let path_s = base_path.join(format!("{name}s"));

    let file_data = if path.is_file() {
        fs::read(&path)?
    } else if path_s.is_file() {
        fs::read(&path_s)?
    } else {
        return Err(Error::FileNotFound {
            file: name.to_string(),
            folder: base_path.to_path_buf(),
        });
    };

    parse_file_descriptor(&file_data)
}

/// Parse a TDF$ container
///
/// Layout: 4-byte magic, little-endian version, payload, then an MD5 trailer
/// over payload + payload length + version + magic.
fn parse_file_descriptor(data: &[u8]) -> Result<FileDescriptor> {
    if data.len() < 8 + 16 {
        return Err(Error::corrupt("tdata file too short"));
    }

    if data[0..4] != TDATA_MAGIC {
        return Err(Error::corrupt("invalid tdata file magic"));
    }

    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    let data_size = data.len() - 8 - 16;
    let payload = &data[8..8 + data_size];
    let file_md5 = &data[data.len() - 16..];

    let mut hasher = Md5::new();
    hasher.update(payload);
    hasher.update((data_size as u32).to_le_bytes());
    hasher.update(version.to_le_bytes());
    hasher.update(TDATA_MAGIC);
    let computed: [u8; 16] = hasher.finalize().into();

    if file_md5 != computed.as_slice() {
        return Err(Error::ChecksumMismatch);
    }

    Ok(FileDescriptor {
        version,
        data: payload.to_vec(),
    })
}

/// Account data file name: ToFilePart(MD5(ComposeDataString(key_file, index)))
fn file_name_for_account(key_file: &str, index: i32) -> String {
    let data_name = compose_data_string(key_file, index);
    to_file_part(compute_data_name_key(&data_name))
}

/// "data" for slot 0, "data#2" for slot 1, and so on
fn compose_data_string(key_file: &str, index: i32) -> String {
    let base = key_file.replace('#', "");
    if index > 0 {
        format!("{}#{}", base, index + 1)
    } else {
        base
    }
}

/// Lower 64 bits of MD5(name), little endian
fn compute_data_name_key(data_name: &str) -> u64 {
    let mut hasher = Md5::new();
    hasher.update(data_name.as_bytes());
    let result: [u8; 16] = hasher.finalize().into();

    u64::from_le_bytes([
        result[0], result[1], result[2], result[3], result[4], result[5], result[6], result[7],
    ])
}

/// Hex-encode a file key, low nibble first
fn to_file_part(val: u64) -> String {
    let mut result = String::with_capacity(16);
    let mut v = val;

    for _ in 0..16 {
        let nibble = (v & 0x0F) as u8;
        let c = if nibble < 0x0A {
            (b'0' + nibble) as char
        } else {
            (b'A' + (nibble - 0x0A)) as char
        };
        result.push(c);
        v >>= 4;
    }

    result
}

/// Fields of the MTP authorization block
#[derive(Debug)]
struct MtpAuthorization {
    dc_id: i32,
    user_id: i64,
    auth_key: [u8; AUTH_KEY_SIZE],
}

/// Parse the MTP authorization block from decrypted account data
///
/// The block starts with id 0x4B, then a QByteArray holding: user id and
/// main DC id (as two i32, or i64 + i32 after the wide-ids tag), a key
/// count, and per-DC auth keys. Only the main DC's key is kept.
fn parse_mtp_authorization(data: &[u8]) -> Result<MtpAuthorization> {
    let mut stream = QDataStream::new(data);

    let block_id = stream.read_i32()?;
    if block_id != DBI_MTP_AUTHORIZATION {
        return Err(Error::corrupt(format!(
            "expected MtpAuthorization block (0x4B), got 0x{block_id:02X}"
        )));
    }

    let serialized = stream.read_qbytearray()?;
    let mut auth_stream = QDataStream::new(&serialized);

    let first_int = auth_stream.read_i32()?;
    let second_int = auth_stream.read_i32()?;

    let combined = ((first_int as i64) << 32) | (second_int as u32 as i64);
    let (user_id, main_dc_id) = if combined == K_WIDE_IDS_TAG {
        let uid = auth_stream.read_i64()?;
        let dc = auth_stream.read_i32()?;
        (uid, dc)
    } else {
        (first_int as i64, second_int)
    };

    let keys_count = auth_stream.read_i32()?;
    if !(0..=10).contains(&keys_count) {
        return Err(Error::corrupt(format!("invalid keys count: {keys_count}")));
    }

    let mut auth_key: Option<[u8; AUTH_KEY_SIZE]> = None;
    for _ in 0..keys_count {
        let dc_id = auth_stream.read_i32()?;
        let key_bytes = auth_stream.read_raw(AUTH_KEY_SIZE)?;

        if dc_id == main_dc_id {
            let mut key = [0u8; AUTH_KEY_SIZE];
            key.copy_from_slice(&key_bytes);
            auth_key = Some(key);
        }
    }

    let auth_key = auth_key.ok_or(Error::AuthKeyMissing { dc_id: main_dc_id })?;

    Ok(MtpAuthorization {
        dc_id: main_dc_id,
        user_id,
        auth_key,
    })
}

/// Expand a leading ~ to the home directory
fn expand_home(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(rest) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
    }
    path.to_path_buf()
}

/// Default tdata location for the current OS
pub fn default_tdata_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        dirs::home_dir().map(|h| h.join(".local/share/TelegramDesktop/tdata"))
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join("Library/Application Support/Telegram Desktop/tdata"))
    }

    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir().map(|d| d.join("Telegram Desktop/tdata"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
