use thiserror::Error;

pub type BipperResult<T> = Result<T, BipperError>;

#[derive(Debug, Error)]
pub enum BipperError {
    #[error("entropy source unavailable: {0}")]
    EntropySource(String),

    #[error("lookup key already exists")]
    DuplicateKey,

    #[error("no vault record for lookup key")]
    NotFound,

    #[error("authentication failed")]
    Authentication,

    #[error("vault record {0} has no backing blob")]
    MissingBlob(String),

    #[error("upload {0} is no longer staged")]
    UploadNotStaged(String),

    #[error("storage I/O error: {0}")]
    StorageIo(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("key derivation error: {0}")]
    Kdf(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What a caller across the trust boundary is allowed to learn about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Unknown phrase, wrong phrase, or ciphertext that failed to authenticate.
    InvalidPhrase,
    /// The request itself was unusable (e.g. filename too long).
    InvalidInput,
    /// Anything else. Details stay in the server log.
    Internal,
}

impl Outcome {
    pub fn message(self) -> &'static str {
        match self {
            Outcome::InvalidPhrase => "invalid passphrase",
            Outcome::InvalidInput => "invalid request",
            Outcome::Internal => "internal error",
        }
    }
}

impl BipperError {
    /// Collapse the error into its caller-visible outcome.
    ///
    /// `NotFound` and `Authentication` must stay indistinguishable, and an
    /// exhausted `DuplicateKey` retry is an internal failure, not caller error.
    pub fn outcome(&self) -> Outcome {
        match self {
            BipperError::NotFound | BipperError::Authentication => Outcome::InvalidPhrase,
            BipperError::InvalidFilename(_) => Outcome::InvalidInput,
            _ => Outcome::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_miss_and_auth_failure_look_the_same() {
        assert_eq!(BipperError::NotFound.outcome(), Outcome::InvalidPhrase);
        assert_eq!(BipperError::Authentication.outcome(), Outcome::InvalidPhrase);
        assert_eq!(
            BipperError::NotFound.outcome().message(),
            BipperError::Authentication.outcome().message()
        );
    }

    #[test]
    fn test_internal_outcomes_hide_detail() {
        let errors = [
            BipperError::DuplicateKey,
            BipperError::EntropySource("getrandom: EAGAIN".into()),
            BipperError::StorageIo("disk full".into()),
            BipperError::MissingBlob("00ff".into()),
        ];
        for err in errors {
            assert_eq!(err.outcome(), Outcome::Internal);
            assert_eq!(err.outcome().message(), "internal error");
        }
    }

    #[test]
    fn test_invalid_filename_is_caller_error() {
        let err = BipperError::InvalidFilename("too long".into());
        assert_eq!(err.outcome(), Outcome::InvalidInput);
    }
}
