//! tresor-db – Persistenz-Vertraege
//!
//! Dieses Crate stellt das Repository-Pattern bereit. Die Geschaeftslogik
//! kennt nur die Traits; als Backend liegt eine In-Memory-Implementierung
//! mit deterministischer Fehler-Injektion bei.

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

pub use error::DbError;
pub use memory::{FehlerInjektion, Fehlerpunkt, MemoryDb};
pub use models::{
    ChatRecord, EinladungRecord, EnvelopeRecord, NachrichtRecord, RotationJobRecord,
    SchluesselRecord, SessionRecord, NO_KEY,
};
pub use repository::{
    ChatRepository, ChatStore, DbResult, EnvelopeRepository, InviteRepository, KeyDirectory,
    MessageRepository, RotationJobRepository, SessionRepository,
};
