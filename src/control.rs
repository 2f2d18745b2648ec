//! The supervisor → actor control channel.
//!
//! The original actor pattern drives these commands over a pipe socket shared with the data
//! plane's poller; here the supervisor's side of that pipe is replaced by an owned
//! `tokio::sync::mpsc` channel carrying this enum, while the data plane keeps using a real
//! external socket (see [`crate::actor`]).

/// One lifecycle/configuration command sent from the supervisor to the actor.
#[derive(Debug)]
pub enum ControlCommand {
    /// Enable verbose logging of commands and activity.
    Verbose,
    /// Bind the data socket, in router role, to the given endpoint.
    Bind(String),
    /// Set the persistence directory.
    Dir(String),
    /// Set the persistence file name.
    File(String),
    /// Set the password; only the first [`crate::store::KEY_BYTES`] bytes matter.
    Password(String),
    /// Load the store from disk if the target file exists.
    Start,
    /// Save the store to disk.
    Stop,
    /// Save the store to disk, then terminate the actor's event loop.
    Term,
}

impl ControlCommand {
    /// Parse a textual command name plus its already-split string arguments into a typed
    /// command, the shape an external front-end (out of scope for this crate) would speak.
    /// Unrecognized command names are the one case this crate treats as a programmer error
    /// at the protocol boundary rather than a recoverable runtime failure.
    pub fn parse(name: &str, mut args: Vec<String>) -> Result<Self, crate::errors::StoreError> {
        use crate::errors::StoreError;

        let mut take = |name: &str| -> Result<String, StoreError> {
            if args.is_empty() {
                return Err(StoreError::UnknownCommand(format!(
                    "{} requires an argument",
                    name
                )));
            }
            Ok(args.remove(0))
        };

        match name {
            "VERBOSE" => Ok(ControlCommand::Verbose),
            "BIND" => Ok(ControlCommand::Bind(take("BIND")?)),
            "DIR" => Ok(ControlCommand::Dir(take("DIR")?)),
            "FILE" => Ok(ControlCommand::File(take("FILE")?)),
            "PASSWORD" => Ok(ControlCommand::Password(take("PASSWORD")?)),
            "START" => Ok(ControlCommand::Start),
            "STOP" => Ok(ControlCommand::Stop),
            "$TERM" => Ok(ControlCommand::Term),
            other => Err(StoreError::UnknownCommand(other.to_string())),
        }
    }
}
