//! tresor-core – Gemeinsame Typen fuer alle Tresor-Crates
//!
//! - `types`: ID-Newtypes (Benutzer, Chat, Nachricht, Einladung)
//! - `clock`: Wanduhr-Abstraktion fuer Token-Zeitstempel und Nachrichten
//! - `error`: getaggter Service-Fehler (`Rejected` vs. `Fault`)

pub mod clock;
pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Ablehnung, ServiceError, ServiceResult};
pub use types::{ChatId, InviteId, MessageId, UserId};
