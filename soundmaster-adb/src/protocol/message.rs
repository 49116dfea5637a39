//! ADB transport messages.
//!
//! Every message is a 24-byte little-endian header followed by an optional
//! payload:
//!
//! ```text
//! command | arg0 | arg1 | data_length | data_check | magic
//! ```
//!
//! `magic` is `command ^ 0xffffffff`; `data_check` is the byte sum of the
//! payload (newer daemons send 0 and skip the check).

use std::fmt;
use std::io::{Read, Write};

use crate::error::AdbError;

pub const A_SYNC: u32 = 0x434e_5953;
pub const A_CNXN: u32 = 0x4e58_4e43;
pub const A_AUTH: u32 = 0x4854_5541;
pub const A_OPEN: u32 = 0x4e45_504f;
pub const A_OKAY: u32 = 0x5941_4b4f;
pub const A_CLSE: u32 = 0x4553_4c43;
pub const A_WRTE: u32 = 0x4554_5257;
pub const A_STLS: u32 = 0x534c_5453;

pub const A_VERSION: u32 = 0x0100_0001;

pub const AUTH_TOKEN: u32 = 1;
pub const AUTH_SIGNATURE: u32 = 2;
pub const AUTH_RSAPUBLICKEY: u32 = 3;

pub const HEADER_LEN: usize = 24;

/// One transport message.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub command: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(command: u32, arg0: u32, arg1: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            arg0,
            arg1,
            payload: payload.into(),
        }
    }

    pub fn connect(max_payload: u32, banner: &str) -> Self {
        Self::new(A_CNXN, A_VERSION, max_payload, nul_terminated(banner))
    }

    pub fn auth(kind: u32, data: impl Into<Vec<u8>>) -> Self {
        Self::new(A_AUTH, kind, 0, data)
    }

    pub fn open(local_id: u32, service: &str) -> Self {
        Self::new(A_OPEN, local_id, 0, nul_terminated(service))
    }

    pub fn okay(local_id: u32, remote_id: u32) -> Self {
        Self::new(A_OKAY, local_id, remote_id, Vec::new())
    }

    pub fn close(local_id: u32, remote_id: u32) -> Self {
        Self::new(A_CLSE, local_id, remote_id, Vec::new())
    }

    pub fn write(local_id: u32, remote_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self::new(A_WRTE, local_id, remote_id, data)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        for word in [
            self.command,
            self.arg0,
            self.arg1,
            self.payload.len() as u32,
            checksum(&self.payload),
            self.command ^ 0xffff_ffff,
        ] {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), AdbError> {
        writer.write_all(&self.encode())?;
        writer.flush()?;
        Ok(())
    }

    /// Read one message, rejecting payloads larger than `max_payload`.
    pub fn read_from<R: Read>(reader: &mut R, max_payload: u32) -> Result<Self, AdbError> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => AdbError::Closed,
            _ => AdbError::from(e),
        })?;

        let word = |i: usize| u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
        let command = word(0);
        let arg0 = word(4);
        let arg1 = word(8);
        let data_length = word(12);
        let data_check = word(16);
        let magic = word(20);

        if magic != command ^ 0xffff_ffff {
            return Err(AdbError::Protocol(format!(
                "bad magic {magic:#010x} for command {command:#010x}"
            )));
        }
        if data_length > max_payload {
            return Err(AdbError::Protocol(format!(
                "payload of {data_length} bytes exceeds limit {max_payload}"
            )));
        }

        let mut payload = vec![0u8; data_length as usize];
        reader.read_exact(&mut payload)?;
        if data_check != 0 && data_check != checksum(&payload) {
            return Err(AdbError::Protocol("payload checksum mismatch".into()));
        }

        Ok(Self {
            command,
            arg0,
            arg1,
            payload,
        })
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({:#x}, {:#x}, {} bytes)",
            command_name(self.command),
            self.arg0,
            self.arg1,
            self.payload.len()
        )
    }
}

pub fn command_name(command: u32) -> &'static str {
    match command {
        A_SYNC => "SYNC",
        A_CNXN => "CNXN",
        A_AUTH => "AUTH",
        A_OPEN => "OPEN",
        A_OKAY => "OKAY",
        A_CLSE => "CLSE",
        A_WRTE => "WRTE",
        A_STLS => "STLS",
        _ => "????",
    }
}

fn checksum(payload: &[u8]) -> u32 {
    payload.iter().map(|b| u32::from(*b)).sum()
}

fn nul_terminated(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    bytes
}

/// Device banner from a CNXN payload, e.g.
/// `device::ro.product.name=x;features=shell_v2,cmd`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Banner {
    pub kind: String,
    pub features: Vec<String>,
}

impl Banner {
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim_end_matches('\0');
        let kind = text.split(':').next().unwrap_or_default().to_string();
        let features = text
            .split(';')
            .filter_map(|field| field.rsplit(':').next()?.strip_prefix("features="))
            .flat_map(|list| list.split(','))
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        Self { kind, features }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}
