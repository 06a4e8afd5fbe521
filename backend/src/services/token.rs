use rand::{rngs::OsRng, RngCore};

/// Number of random bytes behind every session token.
pub const TOKEN_BYTE_LENGTH: usize = 32;

/// Source of opaque session tokens.
#[cfg_attr(test, mockall::automock)]
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Draws tokens from the operating system CSPRNG and hex-encodes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureTokenGenerator;

impl TokenGenerator for SecureTokenGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTE_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
