//! Session lifecycle states

use std::fmt;

use serde::Serialize;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    /// Transient: a connect attempt failed and is being surfaced
    Error,
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Scanning and connecting are mutually exclusive
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Scanning | Self::Connecting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        })
    }
}
