pub mod session;
pub mod token;

pub use session::{SessionError, SessionPolicy, SessionService};
pub use token::{SecureTokenGenerator, TokenGenerator};
