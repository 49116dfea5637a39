pub mod adb_key;
pub mod key_store;
