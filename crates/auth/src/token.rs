//! Signierte Session-Tokens
//!
//! Zustandslos: die Gueltigkeit ergibt sich allein aus Signatur und Ablauf.
//! Optional prueft eine Sperrliste (Schluessel: Signatur) vorzeitig
//! getrennte Tokens.
//!
//! ## Format
//! ```text
//! base64(payload) "$" base64(hmac_sha256(secret, payload))
//! payload = "<uuid>:<issued_at_millis>:<expires_at_millis>"
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use subtle::ConstantTimeEq;
use tresor_core::{Clock, UserId};
use zeroize::Zeroizing;

use crate::error::{AuthError, AuthResult};
use crate::hmac::hmac_sha256;

/// Feste Lebensdauer eines Tokens: 15 Minuten
pub const TOKEN_LEBENSDAUER_MILLIS: i64 = 15 * 60 * 1000;

const TRENNZEICHEN: char = '$';

/// Ein ausgestelltes Token mit seinen Eckdaten
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    wert: String,
    pub subject: UserId,
    pub issued_at_millis: i64,
    pub expires_at_millis: i64,
}

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.wert
    }

    pub fn into_string(self) -> String {
        self.wert
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("subject", &self.subject)
            .field("issued_at_millis", &self.issued_at_millis)
            .field("expires_at_millis", &self.expires_at_millis)
            .finish_non_exhaustive()
    }
}

/// Ungepruefte Angaben aus dem Payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claims {
    subject: UserId,
    issued_at: i64,
    expires_at: i64,
}

/// Stellt Tokens aus und prueft sie
pub struct TokenService {
    secret: Zeroizing<Vec<u8>>,
    clock: Arc<dyn Clock>,
    lebensdauer_millis: i64,
    /// Signatur (base64) -> Ablaufzeitpunkt; `None` wenn deaktiviert
    sperrliste: Option<DashMap<String, i64>>,
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            clock,
            lebensdauer_millis: TOKEN_LEBENSDAUER_MILLIS,
            sperrliste: None,
        }
    }

    /// Abweichende Lebensdauer (nur Konfiguration und Tests)
    pub fn with_lifetime(mut self, millis: i64) -> Self {
        self.lebensdauer_millis = millis;
        self
    }

    /// Aktiviert die Sperrliste fuer vorzeitig getrennte Tokens
    pub fn with_revocation(mut self) -> Self {
        self.sperrliste = Some(DashMap::new());
        self
    }

    pub fn revocation_enabled(&self) -> bool {
        self.sperrliste.is_some()
    }

    pub fn lebensdauer_millis(&self) -> i64 {
        self.lebensdauer_millis
    }

    /// Stellt ein neues Token fuer `subject` aus
    pub fn issue(&self, subject: UserId) -> SessionToken {
        let issued_at = self.clock.jetzt_millis();
        let expires_at = issued_at + self.lebensdauer_millis;
        let payload = format!("{subject}:{issued_at}:{expires_at}");
        let signatur = hmac_sha256(&self.secret, payload.as_bytes());

        let wert = format!(
            "{}{TRENNZEICHEN}{}",
            STANDARD.encode(payload.as_bytes()),
            STANDARD.encode(signatur)
        );

        tracing::debug!(user_id = %subject, expires_at, "Token ausgestellt");

        SessionToken {
            wert,
            subject,
            issued_at_millis: issued_at,
            expires_at_millis: expires_at,
        }
    }

    /// Prueft Signatur, Format, Ablauf und Sperrliste
    pub fn verify(&self, token: &str) -> bool {
        self.pruefen(token).is_some()
    }

    /// Prueft das Token und liefert das Subjekt
    ///
    /// Jeder Fehlschlag ergibt dasselbe [`AuthError::Unauthenticated`].
    pub fn authenticate(&self, token: &str) -> AuthResult<UserId> {
        self.pruefen(token)
            .map(|claims| claims.subject)
            .ok_or(AuthError::Unauthenticated)
    }

    fn pruefen(&self, token: &str) -> Option<Claims> {
        let (payload_b64, signatur_b64) = token.split_once(TRENNZEICHEN)?;
        let payload = STANDARD.decode(payload_b64).ok()?;
        let signatur = STANDARD.decode(signatur_b64).ok()?;

        let erwartet = hmac_sha256(&self.secret, &payload);
        if !bool::from(erwartet.as_slice().ct_eq(&signatur)) {
            return None;
        }

        let claims = parse_payload(std::str::from_utf8(&payload).ok()?)?;
        if self.clock.jetzt_millis() >= claims.expires_at {
            return None;
        }

        if let Some(sperrliste) = &self.sperrliste {
            if sperrliste.contains_key(signatur_b64) {
                return None;
            }
        }

        Some(claims)
    }

    /// Sperrt ein Token bis zu seinem Ablauf
    ///
    /// Wirkt nur bei aktivierter Sperrliste und nur fuer Tokens mit
    /// gueltiger Signatur. Gibt true zurueck wenn das Token neu gesperrt wurde.
    pub fn revoke(&self, token: &str) -> bool {
        let Some(sperrliste) = &self.sperrliste else {
            return false;
        };
        let Some(claims) = self.pruefen(token) else {
            return false;
        };
        let Some((_, signatur_b64)) = token.split_once(TRENNZEICHEN) else {
            return false;
        };

        tracing::info!(user_id = %claims.subject, "Token gesperrt");
        sperrliste
            .insert(signatur_b64.to_string(), claims.expires_at)
            .is_none()
    }

    /// Entfernt abgelaufene Eintraege aus der Sperrliste
    pub fn purge_revoked(&self) -> usize {
        let Some(sperrliste) = &self.sperrliste else {
            return 0;
        };
        let jetzt = self.clock.jetzt_millis();
        let vorher = sperrliste.len();
        sperrliste.retain(|_, ablauf| *ablauf > jetzt);
        let entfernt = vorher - sperrliste.len();
        if entfernt > 0 {
            tracing::debug!(anzahl = entfernt, "Abgelaufene Sperreintraege bereinigt");
        }
        entfernt
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("lebensdauer_millis", &self.lebensdauer_millis)
            .field("sperrliste", &self.sperrliste.as_ref().map(DashMap::len))
            .finish_non_exhaustive()
    }
}

fn payload_lesen(token: &str) -> Option<Claims> {
    let (payload_b64, _) = token.split_once(TRENNZEICHEN)?;
    let payload = STANDARD.decode(payload_b64).ok()?;
    parse_payload(std::str::from_utf8(&payload).ok()?)
}

fn parse_payload(payload: &str) -> Option<Claims> {
    let mut felder = payload.split(':');
    let (Some(subject), Some(issued_at), Some(expires_at), None) =
        (felder.next(), felder.next(), felder.next(), felder.next())
    else {
        return None;
    };

    Some(Claims {
        subject: subject.parse().ok()?,
        issued_at: issued_at.parse().ok()?,
        expires_at: expires_at.parse().ok()?,
    })
}

/// Liest das Subjekt aus dem Payload
///
/// Prueft die Signatur NICHT. Nur nach erfolgreichem
/// [`TokenService::verify`] verwenden.
pub fn extract_subject(token: &str) -> Option<UserId> {
    payload_lesen(token).map(|c| c.subject)
}

/// Liest den Ausstellungszeitpunkt aus dem Payload (ohne Signaturpruefung)
pub fn extract_issued_at(token: &str) -> Option<i64> {
    payload_lesen(token).map(|c| c.issued_at)
}

/// Liest den Ablaufzeitpunkt aus dem Payload (ohne Signaturpruefung)
pub fn extract_expiry(token: &str) -> Option<i64> {
    payload_lesen(token).map(|c| c.expires_at)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
