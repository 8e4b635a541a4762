//! # Transport
//!
//! Transport selection for assembled servers. TCP is the production default;
//! the in-process transport serves over in-memory duplex pipes and exists for
//! integration tests that want a real server without sockets.

mod inprocess;

pub use inprocess::{InProcessConnector, InProcessIo, InProcessListener, InProcessTransport};

use std::fmt;

/// Which transport an assembled server uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    InProcess,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::InProcess => write!(f, "in-process"),
        }
    }
}
