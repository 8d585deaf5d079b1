// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for misuse of the context engine.
//!
//! Only programmer errors surface here. A consumer that finds no provider, or a
//! derived context still waiting for some of its sources, is a normal state.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ContextError> = core::result::Result<T, E>;

/// Registration operation named in misuse errors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Creating a provider registration on a host.
    MakeProvider,
    /// Creating a consumer registration on a host.
    MakeConsumer,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MakeProvider => "make a provider",
            Self::MakeConsumer => "make a consumer",
        })
    }
}

/// Errors raised by the context engine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ContextError {
    /// The host cannot be activated or deactivated, so a registration on it
    /// would never pair or reset.
    #[error("cannot {operation} on `{host_type}` ({host}): host has no activation lifecycle")]
    MissingLifecycle {
        /// Operation that was attempted.
        operation: Operation,
        /// Type name reported by the host tree.
        host_type: String,
        /// Host identifier, formatted.
        host: String,
    },

    /// A record bag was asked for a field it does not have.
    #[error("record has no field `{name}`")]
    UnknownField {
        /// Requested field name.
        name: String,
    },

    /// A record field was accessed with the wrong value type.
    #[error("record field `{name}` holds `{actual}`, not `{expected}`")]
    FieldType {
        /// Field name.
        name: String,
        /// Type the caller asked for.
        expected: &'static str,
        /// Type the field's context carries.
        actual: &'static str,
    },

    /// A consumer-side record field was assigned.
    #[error("record field `{name}` is read-only")]
    ReadOnlyField {
        /// Field name.
        name: String,
    },
}
