use std::sync::mpsc;
use std::time::Duration;

use crate::models::error::ControlError;

/// Outcome of one shell command: its combined output, or why it failed.
pub type CommandResult = Result<String, ControlError>;

/// Authenticated remote-shell channel used to toggle OS audio permissions.
///
/// Implementations serialize commands internally; `submit` may be called from
/// any thread and never blocks on the transport.
pub trait ControlPlane: Send + Sync {
    /// Queue a shell command. The returned handle yields exactly one result.
    fn submit(&self, command: &str) -> CommandHandle;

    /// Whether a live, authenticated connection currently exists.
    fn is_connected(&self) -> bool;
}

/// Sending half of a one-shot command result.
///
/// Consumed by [`send`](Self::send), so a command can complete only once.
#[derive(Debug)]
pub struct CommandReply {
    tx: mpsc::Sender<CommandResult>,
}

impl CommandReply {
    pub fn send(self, result: CommandResult) {
        // The caller may have dropped its handle; that is not an error here.
        let _ = self.tx.send(result);
    }
}

/// Receiving half of a one-shot command result.
#[derive(Debug)]
pub struct CommandHandle {
    rx: mpsc::Receiver<CommandResult>,
}

impl CommandHandle {
    /// Create a connected reply/handle pair.
    pub fn channel() -> (CommandReply, CommandHandle) {
        let (tx, rx) = mpsc::channel();
        (CommandReply { tx }, CommandHandle { rx })
    }

    /// A handle that is already complete.
    pub fn ready(result: CommandResult) -> Self {
        let (reply, handle) = Self::channel();
        reply.send(result);
        handle
    }

    /// Block until the command completes.
    pub fn wait(self) -> CommandResult {
        self.rx.recv().unwrap_or(Err(ControlError::Unavailable))
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> CommandResult {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ControlError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ControlError::Unavailable),
        }
    }

    /// Non-blocking poll; `None` while the command is still pending.
    pub fn try_result(&self) -> Option<CommandResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(ControlError::Unavailable)),
        }
    }
}
