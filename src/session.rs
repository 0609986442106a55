//! Interactive-session detection.
//!
//! The launcher wants to know whether it is attached to a live terminal
//! session before it hands off to the console entry point. Detection is
//! best-effort by contract: a missing or broken introspector means "not
//! interactive", never an error.

use thiserror::Error;

/// Descriptor reported for a usable terminal session.
pub const INTERACTIVE_DESCRIPTOR: &str = "InteractiveTerminal";

/// Descriptor reported when the process runs detached from a terminal.
pub const DETACHED_DESCRIPTOR: &str = "DetachedStream";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session introspection unavailable: {0}")]
    Unavailable(String),

    #[error("Session attribute missing: {0}")]
    MissingAttribute(String),
}

/// Reports a descriptor string classifying the surrounding session.
pub trait SessionIntrospector: Send + Sync {
    fn descriptor(&self) -> Result<String, SessionError>;
}

/// Production introspector: classifies by stdin/stdout terminal state and
/// the TERM variable.
#[derive(Debug, Default, Clone, Copy)]
pub struct TtyIntrospector;

impl TtyIntrospector {
    pub fn new() -> Self {
        Self
    }
}

impl SessionIntrospector for TtyIntrospector {
    fn descriptor(&self) -> Result<String, SessionError> {
        use std::io::IsTerminal;

        let on_tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        if !on_tty {
            return Ok(DETACHED_DESCRIPTOR.to_string());
        }
        match std::env::var("TERM") {
            Ok(term) if term != "dumb" => Ok(INTERACTIVE_DESCRIPTOR.to_string()),
            Ok(_) => Ok(DETACHED_DESCRIPTOR.to_string()),
            // On a tty the terminal kind should be known; without it the
            // session cannot be classified.
            Err(_) => Err(SessionError::MissingAttribute("TERM".to_string())),
        }
    }
}

/// Decide the interactive flag from an optional introspector.
///
/// `None`, an introspection error, or a descriptor other than
/// [`INTERACTIVE_DESCRIPTOR`] all yield `false`. Failures are logged at debug
/// level and never propagate.
pub fn detect_interactive(introspector: Option<&dyn SessionIntrospector>) -> bool {
    let Some(introspector) = introspector else {
        tracing::debug!("no session introspector available, assuming non-interactive");
        return false;
    };
    match introspector.descriptor() {
        Ok(descriptor) => descriptor == INTERACTIVE_DESCRIPTOR,
        Err(e) => {
            tracing::debug!("session introspection failed ({}), assuming non-interactive", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIntrospector(&'static str);

    impl SessionIntrospector for FixedIntrospector {
        fn descriptor(&self) -> Result<String, SessionError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenIntrospector;

    impl SessionIntrospector for BrokenIntrospector {
        fn descriptor(&self) -> Result<String, SessionError> {
            Err(SessionError::MissingAttribute("TERM".to_string()))
        }
    }

    #[test]
    fn test_matching_descriptor_is_interactive() {
        let probe = FixedIntrospector(INTERACTIVE_DESCRIPTOR);
        assert!(detect_interactive(Some(&probe)));
    }

    #[test]
    fn test_other_descriptor_is_not_interactive() {
        let probe = FixedIntrospector(DETACHED_DESCRIPTOR);
        assert!(!detect_interactive(Some(&probe)));
    }

    #[test]
    fn test_missing_introspector_is_not_interactive() {
        assert!(!detect_interactive(None));
    }

    #[test]
    fn test_introspection_failure_is_not_interactive() {
        assert!(!detect_interactive(Some(&BrokenIntrospector)));
    }
}
