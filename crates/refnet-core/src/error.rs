use thiserror::Error;

/// Error taxonomy surfaced to callers of the engine.
///
/// All variants are terminal, synchronous conditions. The only internal
/// retry anywhere in the engine is the referral-code collision loop, which
/// consumes `Conflict` from the store and regenerates.
#[derive(Debug, Error)]
pub enum RefnetError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RefnetError {
    /// Status code hint for the transport layer. The engine itself never
    /// speaks HTTP; this keeps the mapping in one place for whoever does.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, RefnetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_not_found() {
        assert_eq!(RefnetError::NotFound("x".into()).http_status(), 404);
    }

    #[test]
    fn http_status_invalid_input() {
        assert_eq!(RefnetError::InvalidInput("x".into()).http_status(), 400);
    }

    #[test]
    fn http_status_conflict() {
        assert_eq!(RefnetError::Conflict("x".into()).http_status(), 409);
    }

    #[test]
    fn http_status_internal() {
        let err = RefnetError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn display_not_found() {
        let e = RefnetError::NotFound("user 42".into());
        assert_eq!(e.to_string(), "not found: user 42");
    }

    #[test]
    fn display_invalid_input() {
        let e = RefnetError::InvalidInput("bad volume".into());
        assert_eq!(e.to_string(), "invalid input: bad volume");
    }

    #[test]
    fn display_conflict() {
        let e = RefnetError::Conflict("duplicate code".into());
        assert_eq!(e.to_string(), "conflict: duplicate code");
    }

    #[test]
    fn display_internal() {
        let e = RefnetError::Internal(anyhow::anyhow!("db down"));
        assert_eq!(e.to_string(), "internal: db down");
    }
}
