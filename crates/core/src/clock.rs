//! Wanduhr-Abstraktion
//!
//! Token-Zeitstempel und Nachrichten-Zeitstempel werden in Millisekunden
//! seit der Unix-Epoche gefuehrt. Die Uhr wird explizit injiziert, damit
//! Ablauf-Tests ohne echtes Warten auskommen.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Quelle fuer die aktuelle Zeit in Millisekunden
pub trait Clock: Send + Sync {
    fn jetzt_millis(&self) -> i64;
}

/// Systemuhr (chrono)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn jetzt_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manuell gestellte Uhr fuer Tests
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn neu(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn stellen(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn vorspulen(&self, delta_millis: i64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn jetzt_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}
