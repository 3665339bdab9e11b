//! Local-storage cryptography for tdata
//!
//! Telegram Desktop protects its storage with a 256-byte local key derived
//! via PBKDF2-SHA512 and encrypts payloads with AES-256-IGE keyed by the old
//! MTProto SHA-1 schedule.

use sha1::{Digest as Sha1Digest, Sha1};
use sha2::Sha512;

use crate::{Error, Result, AUTH_KEY_SIZE};

/// Size of the local encryption salt
pub const LOCAL_ENCRYPT_SALT_SIZE: usize = 32;

/// AES-256 key size
const AES_KEY_SIZE: usize = 32;

/// AES block size
const AES_BLOCK_SIZE: usize = 16;

/// PBKDF2 iteration count used by Telegram Desktop (with passcode)
const PBKDF2_ITERATIONS_WITH_PASSCODE: u32 = 100_000;

/// PBKDF2 iteration count used by Telegram Desktop (without passcode)
const PBKDF2_ITERATIONS_NO_PASSCODE: u32 = 1;

/// The 256-byte key protecting a tdata folder's files
#[derive(Clone)]
pub struct LocalKey {
    data: [u8; AUTH_KEY_SIZE],
}

impl LocalKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != AUTH_KEY_SIZE {
            return Err(Error::corrupt(format!(
                "local key must be {} bytes, got {}",
                AUTH_KEY_SIZE,
                bytes.len()
            )));
        }

        let mut data = [0u8; AUTH_KEY_SIZE];
        data.copy_from_slice(bytes);
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8; AUTH_KEY_SIZE] {
        &self.data
    }
}

impl std::fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose key material in debug output
        f.debug_struct("LocalKey")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Derive the local key from salt and passcode
///
/// Matches tdesktop: hash = SHA512(salt + passcode + salt), then
/// PBKDF2-HMAC-SHA512 over the hash with 1 iteration for an empty passcode
/// and 100 000 otherwise.
pub fn create_local_key(salt: &[u8], passcode: &[u8]) -> LocalKey {
    let mut key_data = [0u8; AUTH_KEY_SIZE];

    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(passcode);
    hasher.update(salt);
    let hash_key = hasher.finalize();

    let iterations = if passcode.is_empty() {
        PBKDF2_ITERATIONS_NO_PASSCODE
    } else {
        PBKDF2_ITERATIONS_WITH_PASSCODE
    };

    pbkdf2::pbkdf2_hmac::<Sha512>(&hash_key, salt, iterations, &mut key_data);

    LocalKey { data: key_data }
}

/// Decrypt a local tdata payload
///
/// Layout: the first 16 bytes are the message key (a SHA-1 prefix of the
/// plaintext), the rest is AES-256-IGE ciphertext. The plaintext starts with
/// its own length as a little-endian u32, followed by the data and padding.
pub fn decrypt_local(encrypted: &[u8], key: &LocalKey) -> Result<Vec<u8>> {
    if encrypted.len() <= AES_BLOCK_SIZE {
        return Err(Error::corrupt("encrypted data too short"));
    }

    if encrypted.len() % AES_BLOCK_SIZE != 0 {
        return Err(Error::corrupt(
            "encrypted data length must be a multiple of 16",
        ));
    }

    let msg_key = &encrypted[0..16];
    let ciphertext = &encrypted[16..];

    let (aes_key, aes_iv) = prepare_aes_oldmtp(key.as_bytes(), msg_key);
    let decrypted = grammers_crypto::aes::ige_decrypt(ciphertext, &aes_key, &aes_iv);

    // SHA1(plaintext)[0..16] must equal the message key
    let check_hash = &sha1_parts(&[&decrypted])[0..16];
    if check_hash != msg_key {
        return Err(Error::ChecksumMismatch);
    }

    if decrypted.len() < 4 {
        return Err(Error::corrupt("decrypted data too short"));
    }

    let original_len =
        u32::from_le_bytes([decrypted[0], decrypted[1], decrypted[2], decrypted[3]]) as usize;
    let full_len = ciphertext.len();

    if original_len > decrypted.len()
        || original_len <= full_len.saturating_sub(16)
        || original_len < 4
    {
        return Err(Error::corrupt(format!(
            "invalid decrypted length {} for {} ciphertext bytes",
            original_len, full_len
        )));
    }

    Ok(decrypted[4..original_len].to_vec())
}

/// Derive the AES key and IV from the local key and message key
///
/// Old MTProto 1.0 schedule as in tdesktop's prepareAES_oldmtp with
/// send=false, so x = 8.
pub(crate) fn prepare_aes_oldmtp(
    local_key: &[u8],
    msg_key: &[u8],
) -> ([u8; AES_KEY_SIZE], [u8; AES_KEY_SIZE]) {
    let x: usize = 8;

    let sha1_a = sha1_parts(&[msg_key, &local_key[x..x + 32]]);
    let sha1_b = sha1_parts(&[
        &local_key[32 + x..48 + x],
        msg_key,
        &local_key[48 + x..64 + x],
    ]);
    let sha1_c = sha1_parts(&[&local_key[64 + x..96 + x], msg_key]);
    let sha1_d = sha1_parts(&[msg_key, &local_key[96 + x..128 + x]]);

    let mut key = [0u8; AES_KEY_SIZE];
    let mut iv = [0u8; AES_KEY_SIZE];

    key[0..8].copy_from_slice(&sha1_a[0..8]);
    key[8..20].copy_from_slice(&sha1_b[8..20]);
    key[20..32].copy_from_slice(&sha1_c[4..16]);

    iv[0..12].copy_from_slice(&sha1_a[8..20]);
    iv[12..20].copy_from_slice(&sha1_b[0..8]);
    iv[20..24].copy_from_slice(&sha1_c[16..20]);
    iv[24..32].copy_from_slice(&sha1_d[0..8]);

    (key, iv)
}

/// SHA-1 over the concatenation of the given slices
pub(crate) fn sha1_parts(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_key_is_deterministic() {
        let salt = [7u8; LOCAL_ENCRYPT_SALT_SIZE];

        let a = create_local_key(&salt, b"test");
        let b = create_local_key(&salt, b"test");
        assert_eq!(a.as_bytes(), b.as_bytes());

        let c = create_local_key(&salt, b"");
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn local_key_requires_exact_size() {
        assert!(LocalKey::from_bytes(&[0u8; 100]).is_err());
        assert!(LocalKey::from_bytes(&[0xAB; AUTH_KEY_SIZE]).is_ok());
    }

    #[test]
    fn sha1_concatenation_matches_known_vector() {
        // SHA1("hello") = aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d
        let hash = sha1_parts(&[b"he", b"ll", b"o"]);
        assert_eq!(
            hex::encode(hash),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    #[test]
    fn decrypt_rejects_short_and_unaligned_input() {
        let key = create_local_key(&[0u8; LOCAL_ENCRYPT_SALT_SIZE], b"");

        assert!(decrypt_local(&[0u8; 16], &key).is_err());
        assert!(decrypt_local(&[0u8; 33], &key).is_err());
    }

    #[test]
    fn decrypt_rejects_wrong_message_key() {
        let key = create_local_key(&[0u8; LOCAL_ENCRYPT_SALT_SIZE], b"");

        // Valid sizes but garbage content fails the SHA-1 check
        assert!(matches!(
            decrypt_local(&[0u8; 48], &key),
            Err(Error::ChecksumMismatch)
        ));
    }

    /// Encrypt the way tdesktop writes local payloads; the schedule is the
    /// same in both directions for local storage.
    fn encrypt_local(data: &[u8], key: &LocalKey) -> Vec<u8> {
        let original_len = (data.len() + 4) as u32;
        let mut plain = Vec::from(original_len.to_le_bytes());
        plain.extend_from_slice(data);
        while plain.len() % AES_BLOCK_SIZE != 0 {
            plain.push(0);
        }

        let msg_key: [u8; 16] = sha1_parts(&[&plain])[0..16].try_into().unwrap();
        let (aes_key, aes_iv) = prepare_aes_oldmtp(key.as_bytes(), &msg_key);
        let ciphertext = grammers_crypto::aes::ige_encrypt(&plain, &aes_key, &aes_iv);

        let mut out = Vec::from(msg_key);
        out.extend_from_slice(&ciphertext);
        out
    }

    #[test]
    fn decrypt_recovers_encrypted_payload() {
        let key = create_local_key(&[3u8; LOCAL_ENCRYPT_SALT_SIZE], b"passcode");
        let payload = b"some secret payload";

        let encrypted = encrypt_local(payload, &key);
        let decrypted = decrypt_local(&encrypted, &key).unwrap();

        assert_eq!(decrypted, payload);
    }
}
