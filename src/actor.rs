//! The request actor: a single-threaded event loop multiplexing a control channel
//! (lifecycle/configuration) and a ZeroMQ router socket (PUT/GET from clients).

use bytes::Bytes;
use tokio::sync::mpsc;
use zeromq::{Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::control::ControlCommand;
use crate::store::{Store, KEY_BYTES};

/// Lifecycle state of an [`Actor`]. The loop's behavior is driven by the commands it
/// receives; this is tracked for diagnostics and to mirror the state machine in the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Created,
    Configured,
    Running,
    Stopped,
    Destroyed,
}

/// Owns a [`Store`] and an optional bound data socket, and drives the event loop that
/// dispatches control commands and PUT/GET requests to the store.
///
/// All mutable state here is touched only by the task running [`Actor::run`]; the control
/// channel is the only legal cross-task interaction.
pub struct Actor {
    store: Store,
    data_socket: Option<zeromq::RouterSocket>,
    password: [u8; KEY_BYTES],
    verbose: bool,
    terminated: bool,
    state: ActorState,
}

impl Actor {
    /// A freshly created actor: a store, no data socket, no password.
    pub fn new() -> Self {
        Actor {
            store: Store::new(),
            data_socket: None,
            password: [0u8; KEY_BYTES],
            verbose: false,
            terminated: false,
            state: ActorState::Created,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActorState {
        self.state
    }

    /// Run the event loop until `$TERM` is processed or the control channel is dropped.
    ///
    /// The wait is indefinite: no timeout, no periodic work, no background save. When both
    /// the control channel and the data socket are ready, the control channel wins (`biased`
    /// `select!`), matching the convention that the control channel takes priority.
    pub async fn run(mut self, mut control: mpsc::UnboundedReceiver<ControlCommand>) {
        loop {
            if self.terminated {
                break;
            }

            if let Some(socket) = self.data_socket.as_mut() {
                tokio::select! {
                    biased;

                    cmd = control.recv() => {
                        match cmd {
                            Some(cmd) => self.handle_control(cmd).await,
                            None => break, // control channel closed: stop with no save
                        }
                    }

                    msg = socket.recv() => {
                        match msg {
                            Ok(msg) => self.handle_data(msg).await,
                            Err(e) => log::error!(target: "zenstore", "data socket recv failed: {}", e),
                        }
                    }
                }
            } else {
                match control.recv().await {
                    Some(cmd) => self.handle_control(cmd).await,
                    None => break,
                }
            }
        }
        self.state = ActorState::Destroyed;
    }

    async fn handle_control(&mut self, cmd: ControlCommand) {
        if self.verbose {
            log::debug!(target: "zenstore", "control command: {:?}", cmd);
        }
        match cmd {
            ControlCommand::Verbose => {
                self.verbose = true;
            }
            ControlCommand::Bind(endpoint) => {
                let mut socket = zeromq::RouterSocket::new();
                match socket.bind(&endpoint).await {
                    Ok(_) => {
                        self.data_socket = Some(socket);
                        self.state = ActorState::Configured;
                    }
                    Err(e) => log::error!(target: "zenstore", "bind to {} failed: {}", endpoint, e),
                }
            }
            ControlCommand::Dir(dir) => {
                self.store.set_dir(dir);
                self.state = ActorState::Configured;
            }
            ControlCommand::File(file) => {
                self.store.set_file(file);
                self.state = ActorState::Configured;
            }
            ControlCommand::Password(password) => {
                self.set_password(&password);
                self.state = ActorState::Configured;
            }
            ControlCommand::Start => {
                if let Err(e) = self.store.load(&self.password) {
                    log::error!(target: "zenstore", "failed to open crypto store: {}", e);
                }
                self.state = ActorState::Running;
            }
            ControlCommand::Stop => {
                if let Err(e) = self.store.save(&self.password) {
                    log::error!(target: "zenstore", "failed to save crypto store: {}", e);
                }
                self.state = ActorState::Stopped;
            }
            ControlCommand::Term => {
                // The $TERM command is sent by the supervisor on teardown: always processed,
                // always attempts a save, always stops the loop, even if the save fails.
                if let Err(e) = self.store.save(&self.password) {
                    log::error!(target: "zenstore", "failed to save crypto store on terminate: {}", e);
                }
                self.state = ActorState::Stopped;
                self.terminated = true;
            }
        }
    }

    fn set_password(&mut self, password: &str) {
        let mut buf = [0u8; KEY_BYTES];
        let bytes = password.as_bytes();
        let n = bytes.len().min(KEY_BYTES);
        buf[..n].copy_from_slice(&bytes[..n]);
        self.password = buf;
    }

    async fn handle_data(&mut self, msg: ZmqMessage) {
        let frames: Vec<Bytes> = msg.into_vec();
        if frames.len() < 3 {
            log::error!(target: "zenstore", "malformed request: {} frames", frames.len());
            return;
        }

        let route = frames[0].clone();
        let command = String::from_utf8_lossy(&frames[1]).into_owned();
        let key = String::from_utf8_lossy(&frames[2]).into_owned();

        if self.verbose {
            log::debug!(target: "zenstore", "data command={} key={}", command, key);
        }

        match command.as_str() {
            "GET" => {
                let value = self.store.get(&key).map(|v| v.to_vec());
                let mut reply = ZmqMessage::from(route);
                reply.push_back(Bytes::from_static(b"GET"));
                reply.push_back(Bytes::from(key.into_bytes()));
                if let Some(v) = value {
                    reply.push_back(Bytes::from(v));
                }
                if let Some(socket) = self.data_socket.as_mut() {
                    if let Err(e) = socket.send(reply).await {
                        log::error!(target: "zenstore", "reply send failed: {}", e);
                    }
                }
            }
            "PUT" => {
                if frames.len() < 4 {
                    log::error!(target: "zenstore", "PUT request missing value frame");
                    return;
                }
                self.store.put(&key, Some(frames[3].to_vec()));
            }
            other => {
                log::error!(target: "zenstore", "unknown data command: {}", other);
            }
        }
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_get_over_the_wire() {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = Actor::new();
        let handle = tokio::spawn(actor.run(rx));

        tx.send(ControlCommand::Bind("tcp://127.0.0.1:17555".to_string()))
            .unwrap();
        tx.send(ControlCommand::Dir(dir.path().to_string_lossy().into_owned()))
            .unwrap();
        tx.send(ControlCommand::File("s.zns".to_string())).unwrap();
        tx.send(ControlCommand::Password("S3cr3t!".to_string()))
            .unwrap();
        tx.send(ControlCommand::Start).unwrap();

        // Give the actor a moment to process configuration and bind before clients connect.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut client = zeromq::DealerSocket::new();
        client.connect("tcp://127.0.0.1:17555").await.unwrap();

        let mut put = ZmqMessage::from("PUT".to_string());
        put.push_back(Bytes::from_static(b"KEY"));
        put.push_back(Bytes::from_static(b"VALUE"));
        client.send(put).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut get = ZmqMessage::from("GET".to_string());
        get.push_back(Bytes::from_static(b"KEY"));
        client.send(get).await.unwrap();

        let reply = client.recv().await.unwrap();
        let frames = reply.into_vec();
        assert_eq!(&frames[0][..], b"GET");
        assert_eq!(&frames[1][..], b"KEY");
        assert_eq!(&frames[2][..], b"VALUE");

        let mut get_missing = ZmqMessage::from("GET".to_string());
        get_missing.push_back(Bytes::from_static(b"NOKEY"));
        client.send(get_missing).await.unwrap();

        let reply = client.recv().await.unwrap();
        let frames = reply.into_vec();
        assert_eq!(&frames[0][..], b"GET");
        assert_eq!(&frames[1][..], b"NOKEY");
        assert_eq!(frames.len(), 2);

        tx.send(ControlCommand::Term).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn password_is_truncated_and_padded() {
        let mut actor = Actor::new();
        actor.set_password("short");
        assert_eq!(&actor.password[..5], b"short");
        assert!(actor.password[5..].iter().all(|&b| b == 0));

        let long = "x".repeat(KEY_BYTES + 10);
        actor.set_password(&long);
        assert_eq!(actor.password, [b'x'; KEY_BYTES]);
    }
}
