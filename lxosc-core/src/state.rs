//! Observable bind/connect status, one per direction.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IoState {
    #[default]
    Stopped,
    Binding,
    Bound,
    UnknownHost,
    SocketError,
}

impl IoState {
    pub fn is_bound(self) -> bool {
        self == IoState::Bound
    }

    pub fn is_error(self) -> bool {
        matches!(self, IoState::UnknownHost | IoState::SocketError)
    }
}

impl fmt::Display for IoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoState::Stopped => "STOPPED",
            IoState::Binding => "BINDING",
            IoState::Bound => "BOUND",
            IoState::UnknownHost => "UNKNOWN_HOST",
            IoState::SocketError => "SOCKET_ERROR",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Receive,
    Transmit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Receive => "receive",
            Direction::Transmit => "transmit",
        })
    }
}

/// Published on every lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub direction: Direction,
    pub state: IoState,
    /// Bound address, or the reason for a failure.
    pub detail: Option<String>,
}
