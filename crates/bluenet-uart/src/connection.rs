//! Per-link session state: key, session nonces, encryption demands.

use crate::protocol::{SESSION_NONCE_LEN, UART_KEY_LEN};

/// State of the UART session with the attached host.
///
/// Encryption becomes available once a key is configured and both session
/// nonces were exchanged. The host can additionally demand that everything
/// but the handshake is encrypted.
#[derive(Debug, Clone, Default)]
pub struct UartConnection {
    key: Option<[u8; UART_KEY_LEN]>,
    session_nonce_tx: Option<[u8; SESSION_NONCE_LEN]>,
    session_nonce_rx: Option<[u8; SESSION_NONCE_LEN]>,
    encryption_required: bool,
}

impl UartConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the UART key.
    pub fn set_key(&mut self, key: [u8; UART_KEY_LEN]) {
        self.key = Some(key);
    }

    /// Store the nonces agreed during session setup. `tx` salts outgoing
    /// messages, `rx` incoming ones.
    pub fn set_session_nonces(
        &mut self,
        tx: [u8; SESSION_NONCE_LEN],
        rx: [u8; SESSION_NONCE_LEN],
    ) {
        self.session_nonce_tx = Some(tx);
        self.session_nonce_rx = Some(rx);
    }

    /// Demand encryption for all non-handshake traffic.
    pub fn set_encryption_required(&mut self, required: bool) {
        self.encryption_required = required;
    }

    /// Drop the session. Key and encryption demand survive.
    pub fn reset_session(&mut self) {
        self.session_nonce_tx = None;
        self.session_nonce_rx = None;
    }

    /// Whether encrypted messages can be produced and consumed.
    pub fn encryption_ready(&self) -> bool {
        self.key.is_some() && self.session_nonce_tx.is_some() && self.session_nonce_rx.is_some()
    }

    pub fn is_encryption_required(&self) -> bool {
        self.encryption_required
    }

    pub(crate) fn key(&self) -> Option<&[u8; UART_KEY_LEN]> {
        self.key.as_ref()
    }

    pub(crate) fn session_nonce_tx(&self) -> Option<&[u8; SESSION_NONCE_LEN]> {
        self.session_nonce_tx.as_ref()
    }

    pub(crate) fn session_nonce_rx(&self) -> Option<&[u8; SESSION_NONCE_LEN]> {
        self.session_nonce_rx.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_ready_needs_key_and_nonces() {
        let mut connection = UartConnection::new();
        assert!(!connection.encryption_ready());
        connection.set_key([7; UART_KEY_LEN]);
        assert!(!connection.encryption_ready());
        connection.set_session_nonces([1; SESSION_NONCE_LEN], [2; SESSION_NONCE_LEN]);
        assert!(connection.encryption_ready());
        connection.reset_session();
        assert!(!connection.encryption_ready());
    }
}
