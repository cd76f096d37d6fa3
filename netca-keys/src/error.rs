use thiserror::Error;

/// Error types for the netca-keys crate
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    #[error("Key derivation error: {0}")]
    KeyDerivationError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Certificate validation error: {0}")]
    CertificateValidationError(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
}

impl From<hkdf::InvalidLength> for KeyError {
    fn from(err: hkdf::InvalidLength) -> Self {
        KeyError::KeyDerivationError(format!("HKDF error: {err}"))
    }
}

impl From<openssl::error::ErrorStack> for KeyError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        KeyError::CertificateError(format!("OpenSSL error: {err}"))
    }
}

/// Result type for netca-keys operations
pub type Result<T> = std::result::Result<T, KeyError>;
