use netca_keys::KeyError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Error types for CA operations
#[derive(Error, Debug)]
pub enum CaError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    #[error("Unknown authority: {0}")]
    UnknownAuthority(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stable error classification handed to transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParameter,
    NotFound,
    UnknownAuthority,
    Certificate,
    Signing,
    Parse,
    KeyDerivation,
    KeyGeneration,
    Decryption,
    MalformedCiphertext,
    Persistence,
    DataIntegrity,
    Configuration,
}

impl CaError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CaError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            CaError::NotFound(_) | CaError::CertificateNotFound(_) => ErrorCode::NotFound,
            CaError::UnknownAuthority(_) => ErrorCode::UnknownAuthority,
            CaError::Certificate(_) => ErrorCode::Certificate,
            CaError::Signing(_) => ErrorCode::Signing,
            CaError::Parse(_) => ErrorCode::Parse,
            CaError::KeyDerivation(_) => ErrorCode::KeyDerivation,
            CaError::KeyGeneration(_) => ErrorCode::KeyGeneration,
            CaError::Decryption(_) => ErrorCode::Decryption,
            CaError::MalformedCiphertext(_) => ErrorCode::MalformedCiphertext,
            CaError::Persistence(_) => ErrorCode::Persistence,
            CaError::DataIntegrity(_) => ErrorCode::DataIntegrity,
            CaError::Configuration(_) => ErrorCode::Configuration,
        }
    }

    /// True for both record-level and certificate-level lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }
}

impl From<KeyError> for CaError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::KeyGenerationError(msg) => CaError::KeyGeneration(msg),
            KeyError::KeyDerivationError(msg) => CaError::KeyDerivation(msg),
            KeyError::DecryptionError(msg) => CaError::Decryption(msg),
            KeyError::MalformedCiphertext(msg) => CaError::MalformedCiphertext(msg),
            KeyError::EncryptionError(msg) => CaError::Certificate(msg),
            KeyError::CertificateError(msg) => CaError::Certificate(msg),
            KeyError::CertificateValidationError(msg) => CaError::Certificate(msg),
            KeyError::SigningError(msg) => CaError::Signing(msg),
            KeyError::ParseError(msg) => CaError::Parse(msg),
            KeyError::InvalidKeyFormat(msg) => CaError::Parse(msg),
        }
    }
}

impl From<StoreError> for CaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidData(msg) => CaError::DataIntegrity(msg),
            other => CaError::Persistence(other.to_string()),
        }
    }
}

/// Result type for CA operations
pub type Result<T> = std::result::Result<T, CaError>;
