//! tresor-auth – Session-Authentifizierung
//!
//! Dieses Crate implementiert:
//! - HMAC-SHA-256 (eigene Konstruktion ueber `sha2`)
//! - Zustandslose, signierte Session-Tokens mit fester Lebensdauer
//! - Optionale Sperrliste fuer getrennte Tokens
//! - Sitzungs-Verwaltung mit periodischer Token-Erneuerung und Backoff

pub mod error;
pub mod hmac;
pub mod session;
pub mod token;

// Bequeme Re-Exporte
pub use error::{AuthError, AuthResult};
pub use hmac::hmac_sha256;
pub use session::{RefreshPolicy, SessionManager};
pub use token::{
    extract_expiry, extract_issued_at, extract_subject, SessionToken, TokenService,
    TOKEN_LEBENSDAUER_MILLIS,
};
