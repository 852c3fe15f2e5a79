// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A list of error types which are produced during an execution of the protocol
//!
//! None of these errors are recoverable within a session: whichever of them is
//! returned, the caller must throw away the session (including any ephemeral
//! signing state) and start over with fresh randomness.
use core::fmt::Debug;
use thiserror::Error;

/// The default Result type used in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by key sharing, key refresh and signing sessions.
#[derive(Clone, Eq, PartialEq, Error, Debug)]
pub enum Error {
    /// The caller supplied an invalid configuration (the `n`/`t` invariant,
    /// an unknown curve, too few signers) or invoked an operation in the
    /// wrong mode.
    #[error("Configuration error: `{0}`")]
    Config(String),
    /// A round was invoked out of order, a party-count did not match, an
    /// expected message was missing or a message was written twice.
    #[error("Protocol state error: `{0}`")]
    ProtocolState(String),
    /// A cryptographic primitive rejected its input (plaintext out of range,
    /// point decoding failure, signature encoding failure, ...).
    #[error("Cryptographic error: `{0}`")]
    Crypto(String),
    /// The parties' outputs are inconsistent with each other or with the
    /// expected public key.
    #[error("Protocol integrity error: `{0}`")]
    ProtocolIntegrity(String),
    /// A JSON document (configuration, key share or message) could not be
    /// parsed or produced.
    #[error("Serialization error: `{0}`")]
    Serialization(String),
}

macro_rules! serialize {
    ($x:expr) => {{
        serde_json::to_string($x)
            .map_err(|e| crate::errors::Error::Serialization(e.to_string()))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        serde_json::from_str($x).map_err(|e| crate::errors::Error::Serialization(e.to_string()))
    }};
}

macro_rules! config_err {
    ($($arg:tt)*) => {{
        Err(crate::errors::Error::Config(format!($($arg)*)))
    }};
}

macro_rules! state_err {
    ($($arg:tt)*) => {{
        Err(crate::errors::Error::ProtocolState(format!($($arg)*)))
    }};
}

macro_rules! crypto_err {
    ($($arg:tt)*) => {{
        Err(crate::errors::Error::Crypto(format!($($arg)*)))
    }};
}

macro_rules! integrity_err {
    ($($arg:tt)*) => {{
        Err(crate::errors::Error::ProtocolIntegrity(format!($($arg)*)))
    }};
}

impl Error {
    /// Returns `true` for errors caused by the caller (bad configuration or
    /// calls made in the wrong order). These are raised before any
    /// cryptographic material is generated.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ProtocolState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails_with_config() -> Result<()> {
        config_err!("t({}) must be smaller than n({})", 3, 3)
    }

    #[test]
    fn macros_format_their_arguments() {
        let err = fails_with_config().unwrap_err();
        assert_eq!(err, Error::Config("t(3) must be smaller than n(3)".into()));
        assert!(err.is_caller_error());
        assert_eq!(
            err.to_string(),
            "Configuration error: `t(3) must be smaller than n(3)`"
        );
    }

    #[test]
    fn integrity_errors_are_not_caller_errors() {
        let err: Result<()> = integrity_err!("r mismatch");
        assert!(!err.unwrap_err().is_caller_error());
    }
}
