//! Bee Core - Shared types and protocol definitions
//!
//! This crate provides the environment table, configuration and the wire
//! types spoken with the pairing endpoint.

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{env_flag, Config, Environment, StoreMode};
pub use error::{Error, Result};
pub use protocol::{
    error_code, PairingRequestBody, PairingResponseBody, PairingResultBody, PAIRING_REQUEST_PATH,
};
