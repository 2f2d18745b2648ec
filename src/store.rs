//! The store engine: an in-memory key/value mapping with atomic, authenticated-encrypted
//! persistence to a single file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use secstr::SecVec;
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::secretbox;

use crate::envelope;
use crate::errors::{Result, StoreError};
use crate::nonce::Nonce;
use crate::types::Map;

/// Width, in bytes, of the `crypto_secretbox` symmetric key.
pub const KEY_BYTES: usize = secretbox::KEYBYTES;

const VERSION: &str = "1";
const METHOD: &str = "crypto_secretbox";
const CIPHER: &str = "salsa20poly1305";

#[derive(Serialize, Deserialize)]
struct HeaderDoc {
    header: HeaderFields,
}

#[derive(Serialize, Deserialize)]
struct HeaderFields {
    version: String,
    method: String,
    cipher: String,
    nonce: String,
}

/// A password-protected key/value store backed by a single encrypted file.
///
/// `Store` owns the in-memory mapping exclusively: [`Store::put`] copies the given bytes in,
/// [`Store::get`] hands back a borrowed view tied to `&self`, never ownership.
pub struct Store {
    map: Map,
    nonce: Nonce,
    dir: Option<PathBuf>,
    file: Option<String>,
}

impl Store {
    /// An empty store with a zero nonce and no persistence target configured.
    pub fn new() -> Self {
        Store {
            map: Map::new(),
            nonce: Nonce::new(),
            dir: None,
            file: None,
        }
    }

    /// Insert or replace `key`'s value. Passing `None` deletes the key (a no-op if the key
    /// is already absent). The bytes are deep-copied into store-owned, zero-on-drop storage.
    pub fn put(&mut self, key: &str, value: Option<Vec<u8>>) {
        match value {
            None => {
                self.map.shift_remove(key);
            }
            Some(bytes) => {
                self.map.insert(key.to_string(), SecVec::new(bytes));
            }
        }
    }

    /// A borrowed view of `key`'s value, or `None` if the key doesn't exist. The returned
    /// slice's lifetime is tied to `&self`, so it cannot outlive a subsequent mutation.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.map.get(key).map(|v| v.unsecure())
    }

    /// Replace the configured persistence directory.
    pub fn set_dir(&mut self, dir: impl Into<PathBuf>) {
        self.dir = Some(dir.into());
    }

    /// Replace the configured persistence file name.
    pub fn set_file(&mut self, file: impl Into<String>) {
        self.file = Some(file.into());
    }

    fn target(&self) -> Result<(PathBuf, String)> {
        let dir = self.dir.clone().ok_or(StoreError::ConfigMissing)?;
        let file = self.file.clone().ok_or(StoreError::ConfigMissing)?;
        Ok((dir, file))
    }

    /// Write the entire mapping to disk, encrypted with `key_bytes`.
    ///
    /// Randomizes the nonce on the first save (while it's still zero), builds the header and
    /// packed-map frames, encrypts, and writes atomically via a sibling `.tmp` file and a
    /// rename. The plaintext packed-map buffer and the envelope buffer are wiped before being
    /// released.
    pub fn save(&mut self, key_bytes: &[u8; KEY_BYTES]) -> Result<()> {
        let (dir, file) = self.target()?;

        if !self.nonce.is_initialized() {
            self.nonce.randomize();
        }

        let header = HeaderDoc {
            header: HeaderFields {
                version: VERSION.to_string(),
                method: METHOD.to_string(),
                cipher: CIPHER.to_string(),
                nonce: self.nonce.to_hex(),
            },
        };
        let header_bytes = toml::to_string(&header)?.into_bytes();

        let packed = SecVec::new(pack_map(&self.map));
        let key = secretbox::Key::from_slice(key_bytes).ok_or(StoreError::Cipher)?;
        let ciphertext = secretbox::seal(packed.unsecure(), &self.nonce.as_sodium(), &key);
        drop(packed);

        let envelope_buf = SecVec::new(envelope::encode(&[&header_bytes, &ciphertext]));

        write_atomic(&dir, &file, envelope_buf.unsecure())
    }

    /// Read, authenticate, decrypt and install the mapping from disk.
    ///
    /// Transactional: the in-memory mapping and nonce are only replaced after the
    /// authenticated decryption succeeds. Any failure (missing file, wrong permissions,
    /// malformed envelope/header, wrong password) leaves the store exactly as it was.
    pub fn load(&mut self, key_bytes: &[u8; KEY_BYTES]) -> Result<()> {
        let (dir, file) = self.target()?;
        let path = dir.join(&file);

        let metadata = fs::metadata(&path).map_err(|e| StoreError::io(path.clone(), e))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            return Err(StoreError::Permission(path));
        }

        let mut raw = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut raw))
            .map_err(|e| StoreError::io(path.clone(), e))?;

        let frames = envelope::decode_exact(&raw, 2)?;
        let header_str =
            std::str::from_utf8(&frames[0]).map_err(|e| StoreError::Decode(e.to_string()))?;
        let header: HeaderDoc = toml::from_str(header_str)?;

        if header.header.version != VERSION {
            return Err(StoreError::UnsupportedHeader(format!(
                "version '{}', expected '{}'",
                header.header.version, VERSION
            )));
        }
        if header.header.method != METHOD {
            return Err(StoreError::UnsupportedHeader(format!(
                "method '{}', expected '{}'",
                header.header.method, METHOD
            )));
        }
        if header.header.cipher != CIPHER {
            return Err(StoreError::UnsupportedHeader(format!(
                "cipher '{}', expected '{}'",
                header.header.cipher, CIPHER
            )));
        }

        let mut nonce = Nonce::new();
        nonce
            .from_hex(&header.header.nonce)
            .map_err(|_| StoreError::UnsupportedHeader("invalid nonce".to_string()))?;

        let key = secretbox::Key::from_slice(key_bytes).ok_or(StoreError::Cipher)?;
        let decrypted = secretbox::open(&frames[1], &nonce.as_sodium(), &key)
            .map_err(|_| StoreError::Auth)?;
        let decrypted = SecVec::new(decrypted);

        let map = unpack_map(decrypted.unsecure())?;
        drop(decrypted);

        self.map = map;
        self.nonce = nonce;
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes each key/value pair's length-prefixed frames directly into the output buffer,
/// instead of through `envelope::encode`'s `&[&[u8]]` API, so that no unzeroized
/// intermediate copy of a value's plaintext bytes is ever allocated.
fn pack_map(map: &Map) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in map.iter() {
        let key_bytes = key.as_bytes();
        out.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(key_bytes);

        let value_bytes = value.unsecure();
        out.extend_from_slice(&(value_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(value_bytes);
    }
    out
}

fn unpack_map(buf: &[u8]) -> Result<Map> {
    let frames = envelope::decode(buf)?;
    if frames.len() % 2 != 0 {
        return Err(StoreError::Decode(
            "packed map buffer has an odd number of frames".to_string(),
        ));
    }
    let mut map = Map::new();
    let mut it = frames.into_iter();
    while let (Some(key_bytes), Some(value_bytes)) = (it.next(), it.next()) {
        let key = String::from_utf8(key_bytes).map_err(|e| StoreError::Decode(e.to_string()))?;
        map.insert(key, SecVec::new(value_bytes));
    }
    Ok(map)
}

fn write_atomic(dir: &Path, file: &str, data: &[u8]) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir.to_path_buf(), e))?;

    let tmp_path = dir.join(format!("{}.tmp", file));
    let final_path = dir.join(file);

    let extra_flags = libc::O_EXCL | libc::O_NOFOLLOW | libc::O_SYNC | libc::O_CLOEXEC;
    let mut opened = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .custom_flags(extra_flags)
        .open(&tmp_path)
        .map_err(|e| StoreError::io(tmp_path.clone(), e))?;

    let written = match opened.write(data) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(tmp_path, e));
        }
    };
    if let Err(e) = opened.sync_all() {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(tmp_path, e));
    }
    drop(opened);

    if written != data.len() {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(
            tmp_path,
            std::io::Error::new(std::io::ErrorKind::WriteZero, "short write to store file"),
        ));
    }

    fs::rename(&tmp_path, &final_path).map_err(|e| StoreError::io(final_path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(byte: u8) -> [u8; KEY_BYTES] {
        [byte; KEY_BYTES]
    }

    #[test]
    fn put_get_roundtrip() {
        let mut store = Store::new();
        store.put("KEY", Some(b"VALUE".to_vec()));
        assert_eq!(store.get("KEY"), Some(&b"VALUE"[..]));
        assert_eq!(store.get("NOKEY"), None);

        store.put("KEY", None);
        assert_eq!(store.get("KEY"), None);
    }

    #[test]
    fn delete_of_missing_key_is_noop() {
        let mut store = Store::new();
        store.put("NOPE", None);
        assert_eq!(store.get("NOPE"), None);
    }

    #[test]
    fn save_requires_dir_and_file() {
        let mut store = Store::new();
        assert!(matches!(store.save(&key(1)), Err(StoreError::ConfigMissing)));
    }

    #[test]
    fn empty_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = Store::new();
        store.set_dir(dir.path());
        store.set_file("s.zns");
        store.save(&key(7)).unwrap();

        let mut reopened = Store::new();
        reopened.set_dir(dir.path());
        reopened.set_file("s.zns");
        reopened.load(&key(7)).unwrap();
        assert_eq!(reopened.get("anything"), None);
    }

    #[test]
    fn single_key_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = Store::new();
        store.set_dir(dir.path());
        store.set_file("s.zns");
        store.put("KEY", Some(b"VALUE\0".to_vec()));
        store.save(&key(9)).unwrap();

        let mut reopened = Store::new();
        reopened.set_dir(dir.path());
        reopened.set_file("s.zns");
        reopened.load(&key(9)).unwrap();
        assert_eq!(reopened.get("KEY"), Some(&b"VALUE\0"[..]));
    }

    #[test]
    fn wrong_password_fails_auth_and_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let mut store = Store::new();
        store.set_dir(dir.path());
        store.set_file("s.zns");
        store.put("KEY", Some(b"VALUE".to_vec()));
        store.save(&key(1)).unwrap();

        let mut reopened = Store::new();
        reopened.set_dir(dir.path());
        reopened.set_file("s.zns");
        reopened.put("SENTINEL", Some(b"untouched".to_vec()));
        let err = reopened.load(&key(2)).unwrap_err();
        assert!(matches!(err, StoreError::Auth));
        assert_eq!(reopened.get("SENTINEL"), Some(&b"untouched"[..]));
        assert_eq!(reopened.get("KEY"), None);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let dir = tempdir().unwrap();
        let mut store = Store::new();
        store.set_dir(dir.path());
        store.set_file("s.zns");
        store.put("KEY", Some(b"VALUE".to_vec()));
        store.save(&key(3)).unwrap();

        let path = dir.path().join("s.zns");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let mut reopened = Store::new();
        reopened.set_dir(dir.path());
        reopened.set_file("s.zns");
        assert!(matches!(reopened.load(&key(3)), Err(StoreError::Auth)));
    }

    #[test]
    fn wrong_permissions_are_rejected() {
        let dir = tempdir().unwrap();
        let mut store = Store::new();
        store.set_dir(dir.path());
        store.set_file("s.zns");
        store.save(&key(4)).unwrap();

        let path = dir.path().join("s.zns");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let mut reopened = Store::new();
        reopened.set_dir(dir.path());
        reopened.set_file("s.zns");
        assert!(matches!(reopened.load(&key(4)), Err(StoreError::Permission(_))));
    }

    #[test]
    fn header_strictness() {
        let dir = tempdir().unwrap();
        let mut store = Store::new();
        store.set_dir(dir.path());
        store.set_file("s.zns");
        store.save(&key(5)).unwrap();

        let path = dir.path().join("s.zns");
        let raw = fs::read(&path).unwrap();
        let frames = envelope::decode_exact(&raw, 2).unwrap();

        let header_str = std::str::from_utf8(&frames[0]).unwrap();
        let mut header: HeaderDoc = toml::from_str(header_str).unwrap();
        header.header.version = "2".to_string();
        let tampered_header = toml::to_string(&header).unwrap().into_bytes();
        let tampered = envelope::encode(&[&tampered_header, &frames[1]]);
        fs::write(&path, &tampered).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let mut reopened = Store::new();
        reopened.set_dir(dir.path());
        reopened.set_file("s.zns");
        assert!(matches!(
            reopened.load(&key(5)),
            Err(StoreError::UnsupportedHeader(_))
        ));
    }

    #[test]
    fn atomic_commit_leaves_no_tmp_as_visible_state() {
        let dir = tempdir().unwrap();
        let mut store = Store::new();
        store.set_dir(dir.path());
        store.set_file("s.zns");
        store.put("KEY", Some(b"V1".to_vec()));
        store.save(&key(6)).unwrap();

        assert!(dir.path().join("s.zns").exists());
        assert!(!dir.path().join("s.zns.tmp").exists());
    }
}
