pub mod message;
pub mod shell_v2;
