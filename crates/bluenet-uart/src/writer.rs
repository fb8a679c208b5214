//! Streaming frame writer.
//!
//! A message is written as start, any number of parts, end, so large
//! payloads never need a contiguous staging buffer. The writer escapes and
//! CRCs on the fly; for encrypted messages it additionally runs the payload
//! through AES-CTR one block at a time.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use crate::connection::UartConnection;
use crate::protocol::*;

pub(crate) type Aes128Ctr = Ctr128BE<Aes128>;

/// Byte sink the writer feeds, typically the UART TX line.
pub trait UartTx {
    fn write_byte(&mut self, byte: u8);
}

impl UartTx for Vec<u8> {
    fn write_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// Decide whether a message must go out encrypted.
pub(crate) fn must_encrypt(
    policy: EncryptionPolicy,
    connection: &UartConnection,
    opcode: u8,
) -> Result<bool, UartError> {
    match policy {
        EncryptionPolicy::Never => Ok(false),
        EncryptionPolicy::OrFail => {
            if connection.encryption_ready() {
                Ok(true)
            } else {
                Err(UartError::EncryptionNotReady)
            }
        }
        EncryptionPolicy::AccordingToType => {
            if !opcode_requires_encryption(opcode) {
                Ok(false)
            } else if connection.encryption_ready() {
                Ok(true)
            } else if connection.is_encryption_required() {
                Err(UartError::EncryptionNotReady)
            } else {
                Ok(false)
            }
        }
        EncryptionPolicy::IfEnabled => Ok(connection.encryption_ready()),
    }
}

/// Streaming writer over a byte sink.
pub struct UartWriter<T: UartTx> {
    tx: T,
    crc: Crc16,
    cipher: Option<Aes128Ctr>,
    block: [u8; AES_BLOCK_LEN],
    block_len: usize,
    /// Payload bytes still owed by `write_msg_part` calls.
    remaining: usize,
    writing: bool,
}

impl<T: UartTx> UartWriter<T> {
    pub fn new(tx: T) -> Self {
        UartWriter {
            tx,
            crc: Crc16::new(),
            cipher: None,
            block: [0; AES_BLOCK_LEN],
            block_len: 0,
            remaining: 0,
            writing: false,
        }
    }

    pub fn tx(&self) -> &T {
        &self.tx
    }

    pub fn tx_mut(&mut self) -> &mut T {
        &mut self.tx
    }

    /// Write a whole message in one call.
    pub fn write_msg(
        &mut self,
        connection: &UartConnection,
        device_id: u16,
        opcode: u8,
        data: &[u8],
        policy: EncryptionPolicy,
    ) -> Result<(), UartError> {
        self.write_msg_start(connection, device_id, opcode, data.len(), policy)?;
        self.write_msg_part(data)?;
        self.write_msg_end()
    }

    /// Start a frame: start byte, size header, wrapper, message header.
    ///
    /// `data_size` announces how many payload bytes will follow in parts.
    pub fn write_msg_start(
        &mut self,
        connection: &UartConnection,
        device_id: u16,
        opcode: u8,
        data_size: usize,
        policy: EncryptionPolicy,
    ) -> Result<(), UartError> {
        if self.writing {
            return Err(UartError::WriteInProgress);
        }
        if UART_MSG_HEADER_LEN + data_size > UART_MAX_PAYLOAD_SIZE {
            return Err(UartError::PayloadTooLarge {
                max: UART_MAX_PAYLOAD_SIZE - UART_MSG_HEADER_LEN,
                actual: data_size,
            });
        }
        let encrypt = must_encrypt(policy, connection, opcode)?;

        self.tx.write_byte(UART_START_BYTE);
        self.crc = Crc16::new();

        if encrypt {
            self.start_encrypted(connection, device_id, opcode, data_size)?;
        } else {
            let size = (WRAPPER_HEADER_LEN + UART_MSG_HEADER_LEN + data_size + CRC_LEN) as u16;
            self.write_bytes(&size.to_le_bytes());
            self.write_bytes(&[WRAPPER_UART_MSG]);
            self.write_bytes(&device_id.to_le_bytes());
            self.write_bytes(&[opcode]);
        }
        self.remaining = data_size;
        self.writing = true;
        Ok(())
    }

    fn start_encrypted(
        &mut self,
        connection: &UartConnection,
        device_id: u16,
        opcode: u8,
        data_size: usize,
    ) -> Result<(), UartError> {
        let (Some(key), Some(session_nonce)) = (connection.key(), connection.session_nonce_tx())
        else {
            return Err(UartError::EncryptionNotReady);
        };

        let inner_len = UART_MSG_HEADER_LEN + data_size;
        let ciphertext_len = (SIZE_HEADER_LEN + inner_len).div_ceil(AES_BLOCK_LEN) * AES_BLOCK_LEN;
        let payload_len = PACKET_NONCE_LEN + 1 + ciphertext_len;
        let size = (WRAPPER_HEADER_LEN + payload_len + CRC_LEN) as u16;

        self.write_bytes(&size.to_le_bytes());
        self.write_bytes(&[WRAPPER_ENCRYPTED_UART_MSG]);

        let packet_nonce = rand::random::<[u8; PACKET_NONCE_LEN]>();
        self.write_bytes(&packet_nonce);
        // Key id, only one UART key exists today.
        self.write_bytes(&[0]);

        let mut iv = [0u8; AES_BLOCK_LEN];
        iv[..PACKET_NONCE_LEN].copy_from_slice(&packet_nonce);
        iv[PACKET_NONCE_LEN..].copy_from_slice(session_nonce);
        self.cipher = Some(Aes128Ctr::new(key.into(), (&iv).into()));
        self.block_len = 0;

        // The inner message is size prefixed so padding can be stripped.
        self.feed_encrypted(&(inner_len as u16).to_le_bytes());
        self.feed_encrypted(&device_id.to_le_bytes());
        self.feed_encrypted(&[opcode]);
        Ok(())
    }

    /// Write part of the payload announced in `write_msg_start`.
    pub fn write_msg_part(&mut self, data: &[u8]) -> Result<(), UartError> {
        if !self.writing {
            return Err(UartError::NoWriteInProgress);
        }
        if data.len() > self.remaining {
            return Err(UartError::SizeMismatch);
        }
        self.remaining -= data.len();
        if self.cipher.is_some() {
            self.feed_encrypted(data);
        } else {
            self.write_bytes(data);
        }
        Ok(())
    }

    /// Finish the frame: flush padding and write the CRC tail.
    pub fn write_msg_end(&mut self) -> Result<(), UartError> {
        if !self.writing {
            return Err(UartError::NoWriteInProgress);
        }
        if self.remaining != 0 {
            self.writing = false;
            self.cipher = None;
            return Err(UartError::SizeMismatch);
        }
        if self.cipher.is_some() {
            if self.block_len > 0 {
                for index in self.block_len..AES_BLOCK_LEN {
                    self.block[index] = 0;
                }
                self.block_len = AES_BLOCK_LEN;
                self.flush_block();
            }
            self.cipher = None;
        }
        // The CRC itself is escaped but not part of the CRC.
        let crc = self.crc.finish();
        for byte in crc.to_le_bytes() {
            self.write_escaped(byte);
        }
        self.writing = false;
        Ok(())
    }

    /// CRC and escape plain bytes.
    fn write_bytes(&mut self, data: &[u8]) {
        for byte in data {
            self.crc.update(*byte);
            self.write_escaped(*byte);
        }
    }

    /// Run bytes through the cipher block buffer.
    fn feed_encrypted(&mut self, data: &[u8]) {
        for byte in data {
            self.block[self.block_len] = *byte;
            self.block_len += 1;
            if self.block_len == AES_BLOCK_LEN {
                self.flush_block();
            }
        }
    }

    /// Encrypt the pending block and put it on the wire.
    fn flush_block(&mut self) {
        if let Some(cipher) = &mut self.cipher {
            cipher.apply_keystream(&mut self.block);
        }
        let block = self.block;
        for byte in block {
            self.crc.update(byte);
            self.write_escaped(byte);
        }
        self.block_len = 0;
    }

    /// Byte stuffing, applied to everything after the start byte.
    fn write_escaped(&mut self, byte: u8) {
        if needs_escaping(byte) {
            self.tx.write_byte(UART_ESCAPE_BYTE);
            self.tx.write_byte(escape_flip(byte));
        } else {
            self.tx.write_byte(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_connection() -> UartConnection {
        let mut connection = UartConnection::new();
        connection.set_key([0x42; UART_KEY_LEN]);
        connection.set_session_nonces([1; SESSION_NONCE_LEN], [2; SESSION_NONCE_LEN]);
        connection
    }

    #[test]
    fn test_plain_frame_layout() {
        let mut writer = UartWriter::new(Vec::new());
        let connection = UartConnection::new();
        writer
            .write_msg(&connection, 3, OPCODE_HELLO, &[0xAA], EncryptionPolicy::Never)
            .unwrap();

        let wire = writer.tx();
        assert_eq!(wire[0], UART_START_BYTE);
        // size = wrapper(1) + header(3) + data(1) + crc(2)
        assert_eq!(u16::from_le_bytes([wire[1], wire[2]]), 7);
        assert_eq!(wire[3], WRAPPER_UART_MSG);
        assert_eq!(u16::from_le_bytes([wire[4], wire[5]]), 3);
        assert_eq!(wire[6], OPCODE_HELLO);
        assert_eq!(wire[7], 0xAA);
    }

    #[test]
    fn test_special_bytes_escaped_on_wire() {
        let mut writer = UartWriter::new(Vec::new());
        let connection = UartConnection::new();
        writer
            .write_msg(
                &connection,
                1,
                OPCODE_HELLO,
                &[UART_START_BYTE, UART_ESCAPE_BYTE],
                EncryptionPolicy::Never,
            )
            .unwrap();

        // Only the very first byte may be a raw start byte.
        let wire = writer.tx();
        assert!(!wire[1..].contains(&UART_START_BYTE));
    }

    #[test]
    fn test_or_fail_without_session() {
        let mut writer = UartWriter::new(Vec::new());
        let connection = UartConnection::new();
        assert_eq!(
            writer.write_msg(&connection, 1, OPCODE_CONTROL, &[], EncryptionPolicy::OrFail),
            Err(UartError::EncryptionNotReady)
        );
        assert!(writer.tx().is_empty());
    }

    #[test]
    fn test_required_encryption_blocks_plain_write() {
        let mut writer = UartWriter::new(Vec::new());
        let mut connection = UartConnection::new();
        connection.set_encryption_required(true);
        assert_eq!(
            writer.write_msg(&connection, 1, OPCODE_CONTROL, &[], EncryptionPolicy::AccordingToType),
            Err(UartError::EncryptionNotReady)
        );
        // Handshake traffic still goes out.
        assert!(writer
            .write_msg(&connection, 1, OPCODE_HELLO, &[], EncryptionPolicy::AccordingToType)
            .is_ok());
    }

    #[test]
    fn test_encrypted_payload_is_block_padded() {
        let mut writer = UartWriter::new(Vec::new());
        let connection = paired_connection();
        writer
            .write_msg(&connection, 1, OPCODE_CONTROL, &[9; 3], EncryptionPolicy::OrFail)
            .unwrap();

        let wire = writer.tx();
        let size = u16::from_le_bytes([wire[1], wire[2]]) as usize;
        // wrapper + nonce + key id + one padded block + crc
        assert_eq!(size, 1 + PACKET_NONCE_LEN + 1 + AES_BLOCK_LEN + 2);
        assert_eq!(wire[3], WRAPPER_ENCRYPTED_UART_MSG);
    }

    #[test]
    fn test_part_overrun_rejected() {
        let mut writer = UartWriter::new(Vec::new());
        let connection = UartConnection::new();
        writer
            .write_msg_start(&connection, 1, OPCODE_HELLO, 2, EncryptionPolicy::Never)
            .unwrap();
        assert_eq!(writer.write_msg_part(&[1, 2, 3]), Err(UartError::SizeMismatch));
    }

    #[test]
    fn test_nested_start_rejected() {
        let mut writer = UartWriter::new(Vec::new());
        let connection = UartConnection::new();
        writer
            .write_msg_start(&connection, 1, OPCODE_HELLO, 0, EncryptionPolicy::Never)
            .unwrap();
        assert_eq!(
            writer.write_msg_start(&connection, 1, OPCODE_HELLO, 0, EncryptionPolicy::Never),
            Err(UartError::WriteInProgress)
        );
    }
}
