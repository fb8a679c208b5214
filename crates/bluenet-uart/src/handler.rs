//! Ties the frame writer, reader, and session state to a message consumer.

use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::connection::UartConnection;
use crate::protocol::*;
use crate::reader::UartReader;
use crate::writer::{Aes128Ctr, UartTx, UartWriter};

/// Consumer of validated incoming messages.
pub trait UartDispatcher {
    fn on_uart_msg(&mut self, device_id: u16, opcode: u8, data: &[u8]);
}

/// The full UART endpoint of a node.
///
/// Outgoing messages go through [`UartHandler::write_msg`]; incoming bytes
/// through [`UartHandler::on_read`]. Frames that fail any integrity or
/// decryption check are dropped without a trace on the wire, only a debug
/// log remains.
pub struct UartHandler<T: UartTx, D: UartDispatcher> {
    writer: UartWriter<T>,
    reader: UartReader,
    connection: UartConnection,
    dispatcher: D,
}

impl<T: UartTx, D: UartDispatcher> UartHandler<T, D> {
    pub fn new(tx: T, dispatcher: D) -> Self {
        UartHandler {
            writer: UartWriter::new(tx),
            reader: UartReader::new(),
            connection: UartConnection::new(),
            dispatcher,
        }
    }

    pub fn connection(&self) -> &UartConnection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut UartConnection {
        &mut self.connection
    }

    pub fn writer_mut(&mut self) -> &mut UartWriter<T> {
        &mut self.writer
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Write one message, encrypted according to policy.
    pub fn write_msg(
        &mut self,
        device_id: u16,
        opcode: u8,
        data: &[u8],
        policy: EncryptionPolicy,
    ) -> Result<(), UartError> {
        self.writer
            .write_msg(&self.connection, device_id, opcode, data, policy)
    }

    /// Feed one received byte; dispatches when a frame completes.
    pub fn on_read(&mut self, byte: u8) {
        if let Some(frame) = self.reader.on_read(byte) {
            self.handle_frame(&frame);
            self.reader.release();
        }
    }

    /// Validate and dispatch one reassembled frame.
    fn handle_frame(&mut self, frame: &[u8]) {
        if frame.len() < SIZE_HEADER_LEN + WRAPPER_HEADER_LEN + CRC_LEN {
            return;
        }
        let crc_index = frame.len() - CRC_LEN;
        let mut crc = Crc16::new();
        crc.update_all(&frame[..crc_index]);
        let received = u16::from_le_bytes([frame[crc_index], frame[crc_index + 1]]);
        if crc.finish() != received {
            log::debug!("crc mismatch, dropping frame");
            return;
        }

        let wrapper = frame[SIZE_HEADER_LEN];
        let payload = &frame[SIZE_HEADER_LEN + WRAPPER_HEADER_LEN..crc_index];
        match wrapper {
            WRAPPER_UART_MSG => self.dispatch_plain(payload),
            WRAPPER_ENCRYPTED_UART_MSG => self.dispatch_encrypted(payload),
            other => {
                log::debug!("unknown wrapper type {}, dropping frame", other);
            }
        }
    }

    fn dispatch_plain(&mut self, payload: &[u8]) {
        if payload.len() < UART_MSG_HEADER_LEN {
            return;
        }
        let device_id = u16::from_le_bytes([payload[0], payload[1]]);
        let opcode = payload[2];
        if self.connection.is_encryption_required() && opcode_requires_encryption(opcode) {
            log::debug!("plaintext msg opcode {} while encryption is required", opcode);
            return;
        }
        self.dispatcher
            .on_uart_msg(device_id, opcode, &payload[UART_MSG_HEADER_LEN..]);
    }

    fn dispatch_encrypted(&mut self, payload: &[u8]) {
        let header_len = PACKET_NONCE_LEN + 1;
        if payload.len() <= header_len {
            return;
        }
        let ciphertext = &payload[header_len..];
        if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_LEN != 0 {
            return;
        }
        let (Some(key), Some(session_nonce)) =
            (self.connection.key(), self.connection.session_nonce_rx())
        else {
            log::debug!("encrypted msg without a session, dropping");
            return;
        };

        let mut iv = [0u8; AES_BLOCK_LEN];
        iv[..PACKET_NONCE_LEN].copy_from_slice(&payload[..PACKET_NONCE_LEN]);
        iv[PACKET_NONCE_LEN..].copy_from_slice(session_nonce);

        let mut decrypted = ciphertext.to_vec();
        let mut cipher = Aes128Ctr::new(key.into(), (&iv).into());
        cipher.apply_keystream(&mut decrypted);

        // The inner size tells payload from padding. An inconsistent one
        // means the wrong key or nonce was used.
        let inner_len = u16::from_le_bytes([decrypted[0], decrypted[1]]) as usize;
        if inner_len < UART_MSG_HEADER_LEN || SIZE_HEADER_LEN + inner_len > decrypted.len() {
            log::debug!("inconsistent decrypted size, dropping frame");
            return;
        }
        let inner = &decrypted[SIZE_HEADER_LEN..SIZE_HEADER_LEN + inner_len];
        let device_id = u16::from_le_bytes([inner[0], inner[1]]);
        let opcode = inner[2];
        self.dispatcher
            .on_uart_msg(device_id, opcode, &inner[UART_MSG_HEADER_LEN..]);
    }
}
