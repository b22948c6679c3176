//! Collaborators supplied by the host application.

use crate::error::UploadError;
use crate::types::HistoryRecord;

/// Supplies the opaque user identifier sent with every request.
pub trait IdentityProvider: Send + Sync {
    fn uid(&self) -> Result<String, UploadError>;
}

/// Identity backed by a fixed string.
#[derive(Debug, Clone)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }
}

impl IdentityProvider for StaticIdentity {
    fn uid(&self) -> Result<String, UploadError> {
        if self.0.trim().is_empty() {
            return Err(UploadError::Identity("empty uid".into()));
        }
        Ok(self.0.clone())
    }
}

/// Persists completed uploads. Failures are logged, never fatal.
pub trait HistoryRecorder: Send + Sync {
    fn record(&self, record: &HistoryRecord) -> Result<(), UploadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_identity() {
        assert_eq!(StaticIdentity::new("u1").uid().unwrap(), "u1");
        assert!(matches!(
            StaticIdentity::new("  ").uid(),
            Err(UploadError::Identity(_))
        ));
    }
}
