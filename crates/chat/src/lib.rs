//! tresor-chat – Gruppen-Schluessel und verschluesselter Chat
//!
//! Dieses Crate implementiert:
//! - GroupKeyManager: Schluessel-Lebenszyklus pro Chat mit exklusiver
//!   Sperre, Rotations-Journal und Fortsetzung abgebrochener Rotationen
//! - ChatService: Chats, Einladungen, Austritt und Nachrichten-History
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use tresor_chat::{ChatService, GroupKeyManager};
//! use tresor_core::SystemClock;
//! use tresor_db::MemoryDb;
//!
//! #[tokio::main]
//! async fn main() {
//!     let db = MemoryDb::neu();
//!     let clock = Arc::new(SystemClock);
//!
//!     let schluessel = GroupKeyManager::laden_oder_erzeugen(db.clone(), clock.clone(), 1024)
//!         .await
//!         .unwrap();
//!     let chat = ChatService::neu(db, schluessel, clock);
//! }
//! ```

pub mod error;
pub mod key_manager;
pub mod service;
pub mod types;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use error::{ChatError, ChatResult};
pub use key_manager::{ChatSperre, GroupKeyManager};
pub use service::ChatService;
pub use types::{
    schluessel_record, schluesselpaar, ChatInfo, Einladung, EntschluesselteNachricht,
    GesendeteNachricht, GrantErgebnis, ERSTE_VERSION, MAX_NACHRICHT_BYTES,
};
