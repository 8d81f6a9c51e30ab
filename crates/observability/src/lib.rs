//! # tresor-observability
//!
//! Structured Logging fuer Tresor via tracing-subscriber (Text oder JSON).

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat};
