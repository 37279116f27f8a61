//! Typed error kinds shared by the client and server sessions.

use std::fmt;

/// The error kinds the core networking/simulation layer recognizes. The reference project does
/// not use `thiserror`, so this is a hand-rolled `std::error::Error` impl in the same style.
#[derive(Debug)]
pub enum NetcodeError {
    OutOfMemory,
    InvalidMessage(String),
    SocketError(std::io::Error),
    Timeout,
    ProtocolViolation(String),
    JoinDenied(String),
}

impl fmt::Display for NetcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetcodeError::OutOfMemory => write!(f, "out of memory"),
            NetcodeError::InvalidMessage(reason) => write!(f, "invalid message: {reason}"),
            NetcodeError::SocketError(err) => write!(f, "socket error: {err}"),
            NetcodeError::Timeout => write!(f, "timed out"),
            NetcodeError::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            NetcodeError::JoinDenied(reason) => write!(f, "join denied: {reason}"),
        }
    }
}

impl std::error::Error for NetcodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetcodeError::SocketError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NetcodeError {
    fn from(err: std::io::Error) -> Self {
        NetcodeError::SocketError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_variant_has_distinct_nonempty_display() {
        let variants: Vec<NetcodeError> = vec![
            NetcodeError::OutOfMemory,
            NetcodeError::InvalidMessage("bad length".into()),
            NetcodeError::SocketError(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
            NetcodeError::Timeout,
            NetcodeError::ProtocolViolation("future frame".into()),
            NetcodeError::JoinDenied("server full".into()),
        ];
        let mut seen = std::collections::HashSet::new();
        for v in &variants {
            let s = v.to_string();
            assert!(!s.is_empty());
            assert!(seen.insert(s));
        }
    }

    #[test]
    fn socket_error_has_source() {
        use std::error::Error;
        let err = NetcodeError::SocketError(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(err.source().is_some());
        assert!(NetcodeError::Timeout.source().is_none());
    }
}
