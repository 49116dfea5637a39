//! Shell protocol v2 framing.
//!
//! With `shell,v2` every stream payload is a sequence of packets
//! `[id: u8][length: u32 LE][data]` so stdout, stderr and the exit status
//! can share one stream.

use crate::error::AdbError;

pub const ID_STDIN: u8 = 0;
pub const ID_STDOUT: u8 = 1;
pub const ID_STDERR: u8 = 2;
pub const ID_EXIT: u8 = 3;
pub const ID_CLOSE_STDIN: u8 = 4;
pub const ID_WINDOW_SIZE_CHANGE: u8 = 5;

const PACKET_HEADER_LEN: usize = 5;

pub fn encode_packet(id: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PACKET_HEADER_LEN + data.len());
    buf.push(id);
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
    buf
}

/// Accumulates stream payloads and splits them into stdout, stderr and the
/// exit status. Packets may straddle WRTE boundaries.
#[derive(Debug, Default)]
pub struct ShellV2Decoder {
    pending: Vec<u8>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
}

impl ShellV2Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<(), AdbError> {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= PACKET_HEADER_LEN {
            let len = u32::from_le_bytes([self.pending[1], self.pending[2], self.pending[3], self.pending[4]]) as usize;
            if self.pending.len() < PACKET_HEADER_LEN + len {
                break;
            }
            let id = self.pending[0];
            let body: Vec<u8> = self.pending.drain(..PACKET_HEADER_LEN + len).skip(PACKET_HEADER_LEN).collect();
            match id {
                ID_STDOUT => self.stdout.extend_from_slice(&body),
                ID_STDERR => self.stderr.extend_from_slice(&body),
                ID_EXIT => {
                    let code = body
                        .first()
                        .copied()
                        .ok_or_else(|| AdbError::Protocol("empty exit packet".into()))?;
                    self.exit_code = Some(i32::from(code));
                }
                other => log::debug!("Ignoring shell v2 packet id {}", other),
            }
        }
        Ok(())
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Bytes still waiting for the rest of their packet.
    pub fn has_partial_packet(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn finish(self) -> CommandOutput {
        let mut output = self.stdout;
        output.extend_from_slice(&self.stderr);
        CommandOutput {
            output: String::from_utf8_lossy(&output).into_owned(),
            exit_code: self.exit_code,
        }
    }
}

/// What a shell command printed, and how it exited when the daemon told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout followed by stderr.
    pub output: String,
    /// `None` on the legacy `shell:` service.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code.is_none_or(|code| code == 0)
    }

    /// Turn a non-zero exit status into an error.
    pub fn into_result(self) -> Result<String, AdbError> {
        match self.exit_code {
            Some(code) if code != 0 => Err(AdbError::CommandExit {
                code,
                output: self.output,
            }),
            _ => Ok(self.output),
        }
    }
}
