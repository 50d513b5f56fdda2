pub mod password;
pub mod session;

pub use password::CredentialHasher;
pub use session::{Claims, SessionError, SessionIssuer};
