//! Error kinds surfaced by the store and the actor.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias, mirroring the shape of most fallible store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Every way a [`crate::store::Store`] or [`crate::actor::Actor`] operation can fail.
///
/// Each variant corresponds to one of the error kinds from the error handling design:
/// `config-missing`, `io-error`, `permission-error`, `decode-error`, `unsupported-header`,
/// `auth-error`, `cipher-error`, `unknown-command`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `set_dir`/`set_file` were never called before `save`/`load`.
    #[error("directory or file name not configured")]
    ConfigMissing,

    /// Any I/O failure while opening, reading, writing, renaming or removing the store file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file's mode is not exactly `0600`.
    #[error("file {0} must be readable/writable only by its owner (mode 0600)")]
    Permission(PathBuf),

    /// The envelope or the header frame inside it could not be decoded.
    #[error("malformed container: {0}")]
    Decode(String),

    /// The header was decodable but named an unsupported version/method/cipher, or the
    /// nonce field was missing or not valid hex.
    #[error("unsupported header: {0}")]
    UnsupportedHeader(String),

    /// Authenticated decryption failed; the ciphertext or key is wrong.
    #[error("authentication of stored data failed, wrong password or corrupted file")]
    Auth,

    /// The symmetric cipher itself failed to encrypt (only possible on programmer error,
    /// e.g. a malformed key, but kept distinct from `Io`/`Decode` per the error design).
    #[error("encryption primitive failed")]
    Cipher,

    /// A control command the actor does not recognize.
    #[error("unknown control command: {0}")]
    UnknownCommand(String),
}

impl StoreError {
    /// Build an [`StoreError::Io`] with the path attached, for call sites that know which
    /// file was involved (the blanket `From<std::io::Error>` impl can't).
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        StoreError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(e: toml::de::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(e: toml::ser::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}
