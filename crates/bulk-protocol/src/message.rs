//! Service identity and the text sent to clients on join and leave.

use std::fmt;

/// Identifies the running service in welcome messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

impl ServiceInfo {
    /// Service name used when none is configured.
    pub const DEFAULT_NAME: &'static str = "bulk server";

    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Identity of this build.
    pub fn current() -> Self {
        Self::new(Self::DEFAULT_NAME, env!("CARGO_PKG_VERSION"))
    }
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Messages the server sends to a client outside of batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent once when the client joins.
    Welcome(ServiceInfo),
    /// Sent once when the client leaves.
    Farewell,
}

impl ServerMessage {
    pub fn welcome(info: &ServiceInfo) -> Self {
        Self::Welcome(info.clone())
    }

    /// Newline-terminated text for the wire.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome(info) => {
                writeln!(f, "Welcome to the {}: {}", info.name, info.version)
            }
            ServerMessage::Farewell => writeln!(f, "Disconnected from a bulk server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_names_service_and_version() {
        let info = ServiceInfo::new("bulk server", "1.2.3");
        let text = ServerMessage::welcome(&info).render();

        assert_eq!(text, "Welcome to the bulk server: 1.2.3\n");
    }

    #[test]
    fn test_farewell_is_newline_terminated() {
        assert!(ServerMessage::Farewell.render().ends_with('\n'));
    }

    #[test]
    fn test_current_uses_crate_version() {
        assert_eq!(ServiceInfo::current().version, env!("CARGO_PKG_VERSION"));
    }
}
