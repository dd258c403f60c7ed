//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Flow of a packet through the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Player to server
    Serverbound,
    /// Server to player
    Clientbound,
}

impl Direction {
    pub const fn opposite(self) -> Self {
        match self {
            Self::Serverbound => Self::Clientbound,
            Self::Clientbound => Self::Serverbound,
        }
    }

    /// Side the packets of this direction are read from
    pub const fn source(self) -> Side {
        match self {
            Self::Serverbound => Side::Client,
            Self::Clientbound => Side::Server,
        }
    }

    /// Side the packets of this direction are written to
    pub const fn destination(self) -> Side {
        match self {
            Self::Serverbound => Side::Server,
            Self::Clientbound => Side::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serverbound => "serverbound",
            Self::Clientbound => "clientbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote end of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The player's game client
    Client,
    /// The backend server
    Server,
}

impl Side {
    /// Direction of the packets read from this side
    pub const fn inbound(self) -> Direction {
        match self {
            Self::Client => Direction::Serverbound,
            Self::Server => Direction::Clientbound,
        }
    }

    /// Direction of the packets written to this side
    pub const fn outbound(self) -> Direction {
        self.inbound().opposite()
    }
}

/// Protocol state owning a disjoint packet id space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Handshake,
    Status,
    Login,
    Configuration,
    Play,
}

impl Phase {
    /// Phase requested by the `next state` field of a handshake
    pub fn from_next_state(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Status),
            // 3 is a transfer, which logs in again
            2 | 3 => Some(Self::Login),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Status => "status",
            Self::Login => "login",
            Self::Configuration => "configuration",
            Self::Play => "play",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
