//! Encrypted on-disk token store.
//!
//! The token record is serialized to JSON, encrypted with AES-256-CTR and
//! authenticated with HMAC-SHA256 over `magic || iv || ciphertext`.
//!
//! File layout: `MXT1 | iv (16) | ciphertext | tag (32)`.
//!
//! The 64-byte key (cipher key followed by MAC key) is generated on first use
//! and kept in a separate file next to the token file. Both files are `0600`
//! on Unix.

use aes::cipher::{KeyIvInit, StreamCipher};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::tokens::{TokenRecord, TokenStore};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const MAGIC: &[u8; 4] = b"MXT1";
const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
const CIPHER_KEY_LEN: usize = 32;
const MAC_KEY_LEN: usize = 32;
const KEY_FILE_LEN: usize = CIPHER_KEY_LEN + MAC_KEY_LEN;

const TOKEN_FILE: &str = "tokens.bin";
const KEY_FILE: &str = "token.key";

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("token file failed authentication (tampered or wrong key)")]
    Tampered,
    #[error("token file is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to generate vault key: {0}")]
    KeyGen(String),
}

struct VaultKey {
    cipher: [u8; CIPHER_KEY_LEN],
    mac: [u8; MAC_KEY_LEN],
}

impl VaultKey {
    fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() != KEY_FILE_LEN {
            return Err(VaultError::Corrupt(format!(
                "key file is {} bytes (expected {})",
                bytes.len(),
                KEY_FILE_LEN
            )));
        }
        let mut cipher = [0u8; CIPHER_KEY_LEN];
        let mut mac = [0u8; MAC_KEY_LEN];
        cipher.copy_from_slice(&bytes[..CIPHER_KEY_LEN]);
        mac.copy_from_slice(&bytes[CIPHER_KEY_LEN..]);
        Ok(Self { cipher, mac })
    }

    fn generate() -> Result<([u8; KEY_FILE_LEN], Self), VaultError> {
        let mut bytes = [0u8; KEY_FILE_LEN];
        getrandom::getrandom(&mut bytes).map_err(|e| VaultError::KeyGen(e.to_string()))?;
        let key = Self::from_bytes(&bytes)?;
        Ok((bytes, key))
    }

    fn mac(&self) -> Result<HmacSha256, VaultError> {
        HmacSha256::new_from_slice(&self.mac).map_err(|e| VaultError::Corrupt(e.to_string()))
    }
}

fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
    let mut iv = [0u8; IV_LEN];
    getrandom::getrandom(&mut iv).map_err(|e| VaultError::KeyGen(e.to_string()))?;

    let mut ciphertext = plaintext.to_vec();
    let mut cipher = Aes256Ctr::new((&key.cipher).into(), (&iv).into());
    cipher.apply_keystream(&mut ciphertext);

    let mut out = Vec::with_capacity(MAGIC.len() + IV_LEN + ciphertext.len() + TAG_LEN);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);

    let mut mac = key.mac()?;
    mac.update(&out);
    out.extend_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn open(key: &VaultKey, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
    if sealed.len() < MAGIC.len() + IV_LEN + TAG_LEN {
        return Err(VaultError::Corrupt(format!("{} bytes is too short", sealed.len())));
    }
    if &sealed[..MAGIC.len()] != MAGIC {
        return Err(VaultError::Corrupt("bad magic".to_string()));
    }

    let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    let mut mac = key.mac()?;
    mac.update(body);
    mac.verify_slice(tag).map_err(|_| VaultError::Tampered)?;

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&body[MAGIC.len()..MAGIC.len() + IV_LEN]);
    let mut plaintext = body[MAGIC.len() + IV_LEN..].to_vec();
    let mut cipher = Aes256Ctr::new((&key.cipher).into(), (&iv).into());
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}

/// Write `data` to `path` through a temporary sibling and a rename.
///
/// The temporary file is created with mode `0600`, so the data is never
/// readable by others, even briefly.
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    // A leftover from an interrupted write keeps its old mode; start fresh
    match fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", tmp.display())),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    drop(file);

    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Token store backed by an encrypted file.
pub struct EncryptedFileStore {
    dir: PathBuf,
}

impl EncryptedFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store in the platform data directory.
    pub fn default_location() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "musicextended", "music-extended")
            .context("Could not determine data directory")?;
        Ok(Self::new(proj_dirs.data_dir()))
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    fn read_key(&self) -> Result<Option<VaultKey>> {
        match fs::read(self.key_path()) {
            Ok(bytes) => Ok(Some(VaultKey::from_bytes(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read vault key"),
        }
    }

    fn key_or_create(&self) -> Result<VaultKey> {
        if let Some(key) = self.read_key()? {
            return Ok(key);
        }
        tracing::debug!("Generating new vault key in {}", self.dir.display());
        let (bytes, key) = VaultKey::generate()?;
        write_private(&self.key_path(), &bytes)?;
        Ok(key)
    }
}

impl TokenStore for EncryptedFileStore {
    fn load(&self) -> Result<Option<TokenRecord>> {
        let sealed = match fs::read(self.token_path()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read token file"),
        };
        let key = self
            .read_key()?
            .ok_or_else(|| VaultError::Corrupt("token file present but key missing".to_string()))?;
        let plaintext = open(&key, &sealed)?;
        let record = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::Corrupt(e.to_string()))?;
        Ok(Some(record))
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).context("Failed to create data directory")?;
        let key = self.key_or_create()?;
        let plaintext = serde_json::to_vec(record).context("Failed to serialize token record")?;
        let sealed = seal(&key, &plaintext)?;
        write_private(&self.token_path(), &sealed)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.token_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove token file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TokenRecord {
        TokenRecord::issued(
            "access-abc".into(),
            Some("refresh-xyz".into()),
            Some("Bearer".into()),
            3600,
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_save_load_preserves_absolute_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.absolute_expiry_epoch_ms, 1_700_000_000_000 + 3_600_000);
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_does_not_contain_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();

        let raw = fs::read(dir.path().join(TOKEN_FILE)).unwrap();
        let haystack = String::from_utf8_lossy(&raw);
        assert!(!haystack.contains("access-abc"));
        assert!(!haystack.contains("refresh-xyz"));
    }

    #[test]
    fn test_tampered_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();

        let path = dir.path().join(TOKEN_FILE);
        let mut raw = fs::read(&path).unwrap();
        let mid = MAGIC.len() + IV_LEN + 2;
        raw[mid] ^= 0x01;
        fs::write(&path, raw).unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err.downcast_ref::<VaultError>(), Some(VaultError::Tampered)));
    }

    #[test]
    fn test_clear_removes_record_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_key_is_reused_across_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();
        let key_before = fs::read(dir.path().join(KEY_FILE)).unwrap();

        let mut next = sample();
        next.access_token = Some("access-2".into());
        store.save(&next).unwrap();
        let key_after = fs::read(dir.path().join(KEY_FILE)).unwrap();

        assert_eq!(key_before, key_after);
        assert_eq!(store.load().unwrap().unwrap().access_token.as_deref(), Some("access-2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();

        for name in [TOKEN_FILE, KEY_FILE] {
            let mode = fs::metadata(dir.path().join(name)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{} has mode {:o}", name, mode);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_temp_file_does_not_leak_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(format!("{}.tmp", KEY_FILE));
        fs::write(&stale, b"leftover").unwrap();
        fs::set_permissions(&stale, fs::Permissions::from_mode(0o644)).unwrap();

        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();

        let mode = fs::metadata(dir.path().join(KEY_FILE)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!stale.exists());
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn test_bad_key_file_is_corrupt_not_keygen() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::new(dir.path());
        store.save(&sample()).unwrap();
        fs::write(dir.path().join(KEY_FILE), [0u8; 10]).unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err.downcast_ref::<VaultError>(), Some(VaultError::Corrupt(_))));
    }

    #[test]
    fn test_wrong_mac_key_is_tampered() {
        let key = VaultKey::from_bytes(&[7u8; KEY_FILE_LEN]).unwrap();
        let sealed = seal(&key, b"{}").unwrap();
        let mut other = VaultKey::from_bytes(&[7u8; KEY_FILE_LEN]).unwrap();
        other.mac[0] ^= 0xff;
        assert!(matches!(open(&other, &sealed), Err(VaultError::Tampered)));
        assert!(key.mac().is_ok());
    }
}
