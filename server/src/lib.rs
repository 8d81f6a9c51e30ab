//! tresor-server – Bibliotheks-Root
//!
//! Verdrahtet alle Dienste explizit in einem [`AppKontext`] (keine globalen
//! Singletons) und stellt den oeffentlichen Einstiegspunkt fuer
//! Integrationstests bereit.

pub mod api;
pub mod config;

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use api::TresorApi;
use config::ServerConfig;
use tresor_auth::{SessionManager, TokenService};
use tresor_chat::{ChatService, GroupKeyManager};
use tresor_core::{Clock, SystemClock, UserId};
use tresor_db::{ChatStore, MemoryDb, SessionRepository};

/// Alle Dienste einer Server-Instanz
pub struct AppKontext {
    pub db: Arc<MemoryDb>,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<TokenService>,
    pub sitzungen: Arc<SessionManager>,
    pub schluessel: Arc<GroupKeyManager>,
    pub chat: Arc<ChatService>,
    /// Laufende Refresh-Tasks pro angemeldetem Benutzer
    pub(crate) refresh_tasks: DashMap<UserId, JoinHandle<()>>,
    pub(crate) rsa_primzahl_bits: usize,
}

impl AppKontext {
    /// Baut alle Dienste aus der Konfiguration auf
    pub async fn aufbauen(config: &ServerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let db = MemoryDb::neu();
        let store: Arc<dyn ChatStore> = db.clone();
        let sitzungs_repo: Arc<dyn SessionRepository> = db.clone();

        let mut tokens = TokenService::new(config.token_secret()?, clock.clone())
            .with_lifetime(config.token_lebensdauer_millis());
        if config.token.sperrliste {
            tokens = tokens.with_revocation();
        }
        let tokens = Arc::new(tokens);

        let sitzungen =
            SessionManager::new(tokens.clone(), sitzungs_repo, config.refresh_policy());

        let schluessel = GroupKeyManager::laden_oder_erzeugen(
            store.clone(),
            clock.clone(),
            config.krypto.rsa_primzahl_bits,
        )
        .await?;
        let chat = ChatService::neu(store, schluessel.clone(), clock.clone());

        Ok(Self {
            db,
            clock,
            tokens,
            sitzungen,
            schluessel,
            chat,
            refresh_tasks: DashMap::new(),
            rsa_primzahl_bits: config.krypto.rsa_primzahl_bits,
        })
    }
}

impl Drop for AppKontext {
    fn drop(&mut self) {
        for task in self.refresh_tasks.iter() {
            task.value().abort();
        }
    }
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    kontext: Arc<AppKontext>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub async fn neu(config: ServerConfig) -> Result<Self> {
        Self::mit_uhr(config, Arc::new(SystemClock)).await
    }

    /// Wie [`Server::neu`], aber mit injizierter Uhr
    pub async fn mit_uhr(config: ServerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let kontext = AppKontext::aufbauen(&config, clock).await?;
        Ok(Self {
            config,
            kontext: Arc::new(kontext),
        })
    }

    pub fn kontext(&self) -> &Arc<AppKontext> {
        &self.kontext
    }

    /// Service-Grenze fuer Aufrufer (Transport ist nicht Teil des Servers)
    pub fn api(&self) -> TresorApi {
        TresorApi::neu(self.kontext.clone())
    }

    /// Laeuft bis zum Shutdown-Signal
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            token_lebensdauer_s = self.config.token.lebensdauer_sekunden,
            sperrliste = self.config.token.sperrliste,
            rsa_primzahl_bits = self.config.krypto.rsa_primzahl_bits,
            "Server gestartet"
        );

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!(
            aktive_sitzungen = self.kontext.sitzungen.anzahl_aktive(),
            "Shutdown-Signal empfangen, Server wird beendet"
        );

        Ok(())
    }
}
