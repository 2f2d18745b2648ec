//! `zenstore`: a password-protected, authenticated-encryption key/value store, exposed
//! in-process as [`Store`] and over a ZeroMQ router socket as [`Actor`].
//!
//! Values are encrypted at rest with `crypto_secretbox` (XSalsa20-Poly1305): a single file
//! holds a plaintext TOML header (format version, method, cipher, nonce) followed by the
//! authenticated ciphertext of the packed key/value mapping. Saves are atomic (write to a
//! sibling temp file, `fsync`, rename); loads are transactional (authenticated decryption
//! must fully succeed before any in-memory state changes).

mod actor;
mod control;
mod envelope;
mod errors;
mod nonce;
mod store;
mod types;

pub use actor::{Actor, ActorState};
pub use control::ControlCommand;
pub use errors::{Result, StoreError};
pub use nonce::Nonce;
pub use store::{Store, KEY_BYTES};
