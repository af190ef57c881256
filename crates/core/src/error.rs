use std::fmt;

/// Result alias that carries the custom [`SceneSwitchError`] type.
pub type Result<T> = std::result::Result<T, SceneSwitchError>;

/// Closed set of reasons a content backend can fail to load a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadFailureKind {
    /// The key did not resolve to anything the backend knows about.
    ContentNotFound,
    /// The remote backend could not fetch the content.
    ContentFetchFailed,
    /// Any other backend failure.
    LoadFailed,
}

impl fmt::Display for LoadFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ContentNotFound => "content not found",
            Self::ContentFetchFailed => "content fetch failed",
            Self::LoadFailed => "load failed",
        };
        f.write_str(label)
    }
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SceneSwitchError {
    /// A content loader failed. Every backend error is folded into this one
    /// variant so the runner only ever sees a single typed failure.
    #[error("{kind} for `{key}`: {message}")]
    Load {
        kind: LoadFailureKind,
        key: String,
        message: String,
    },
    /// The run's cancellation token fired at a suspension point.
    #[error("transition cancelled")]
    Cancelled,
    /// Another transition is still running on the same runner.
    #[error("a transition is already in flight")]
    TransitionInFlight,
    /// The request cannot be turned into a pipeline.
    #[error("invalid transition request: {0}")]
    InvalidRequest(String),
    /// A handle was used after the content it referenced went away.
    #[error("content handle {0} is no longer valid")]
    InvalidHandle(u64),
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SceneSwitchError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn load(kind: LoadFailureKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            kind,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::load(LoadFailureKind::ContentNotFound, key, "no backend knows this key")
    }

    /// Returns the loader failure kind, if this error came from a loader.
    pub fn load_kind(&self) -> Option<LoadFailureKind> {
        match self {
            Self::Load { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<&str> for SceneSwitchError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SceneSwitchError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_errors_carry_their_kind() {
        let err = SceneSwitchError::load(LoadFailureKind::ContentFetchFailed, "remote://lvl", "503");
        assert_eq!(err.load_kind(), Some(LoadFailureKind::ContentFetchFailed));
        let text = format!("{err}");
        assert!(text.contains("content fetch failed"));
        assert!(text.contains("remote://lvl"));
    }

    #[test]
    fn non_load_errors_have_no_kind() {
        assert_eq!(SceneSwitchError::Cancelled.load_kind(), None);
        assert!(SceneSwitchError::Cancelled.is_cancelled());
        assert!(!SceneSwitchError::msg("x").is_cancelled());
    }
}
