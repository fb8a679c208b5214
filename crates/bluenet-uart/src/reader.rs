//! Byte-at-a-time frame reassembly.

use bytes::BytesMut;

use crate::protocol::*;

/// Largest plausible value of the frame size field. Anything bigger resets
/// the reader instead of letting a corrupted header stall it.
const MAX_SIZE_FIELD: usize =
    WRAPPER_HEADER_LEN + PACKET_NONCE_LEN + 1 + UART_MAX_PAYLOAD_SIZE + AES_BLOCK_LEN + CRC_LEN;

/// Reassembles frames from the RX byte stream.
///
/// Fed one byte at a time, the way a UART interrupt hands them over. A raw
/// start byte always begins a new frame, so a writer reset mid-frame costs
/// at most the partial frame. A completed frame sets the busy flag; bytes
/// arriving while busy are dropped until [`UartReader::release`], which is
/// the backpressure toward the host.
#[derive(Debug, Default)]
pub struct UartReader {
    buffer: BytesMut,
    started: bool,
    escape_next: bool,
    read_busy: bool,
    /// Frame size announced by the size header, 0 while unknown.
    size_to_read: usize,
}

impl UartReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.read_busy
    }

    /// Accept the next completed frame again.
    pub fn release(&mut self) {
        self.read_busy = false;
    }

    /// Feed one received byte.
    ///
    /// Returns the unescaped frame, size header through CRC, once complete.
    pub fn on_read(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.read_busy {
            return None;
        }
        if byte == UART_START_BYTE {
            self.buffer.clear();
            self.started = true;
            self.escape_next = false;
            self.size_to_read = 0;
            return None;
        }
        if !self.started {
            return None;
        }
        if byte == UART_ESCAPE_BYTE {
            if self.escape_next {
                // An escape cannot escape another escape.
                self.reset();
                return None;
            }
            self.escape_next = true;
            return None;
        }

        let byte = if self.escape_next {
            self.escape_next = false;
            let unescaped = escape_flip(byte);
            if !needs_escaping(unescaped) {
                // Escaped something that never gets escaped. Garbled.
                self.reset();
                return None;
            }
            unescaped
        } else {
            byte
        };

        self.buffer.extend_from_slice(&[byte]);

        if self.buffer.len() == SIZE_HEADER_LEN {
            let size = u16::from_le_bytes([self.buffer[0], self.buffer[1]]) as usize;
            if size < WRAPPER_HEADER_LEN + CRC_LEN || size > MAX_SIZE_FIELD {
                log::debug!("implausible frame size {}, resetting", size);
                self.reset();
                return None;
            }
            self.size_to_read = size;
        }
        if self.size_to_read != 0 && self.buffer.len() == SIZE_HEADER_LEN + self.size_to_read {
            self.started = false;
            self.read_busy = true;
            return Some(self.buffer.split().to_vec());
        }
        None
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.started = false;
        self.escape_next = false;
        self.size_to_read = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal valid-shaped frame: size header + wrapper + crc bytes.
    fn feed(reader: &mut UartReader, bytes: &[u8]) -> Option<Vec<u8>> {
        let mut frame = None;
        for byte in bytes {
            if let Some(done) = reader.on_read(*byte) {
                frame = Some(done);
            }
        }
        frame
    }

    #[test]
    fn test_assembles_frame() {
        let mut reader = UartReader::new();
        // size 3 = wrapper + 2 crc bytes, no payload
        let frame = feed(&mut reader, &[UART_START_BYTE, 3, 0, WRAPPER_UART_MSG, 0xAB, 0xCD]);
        assert_eq!(frame, Some(vec![3, 0, WRAPPER_UART_MSG, 0xAB, 0xCD]));
        assert!(reader.is_busy());
    }

    #[test]
    fn test_garbage_before_start_ignored() {
        let mut reader = UartReader::new();
        let frame = feed(
            &mut reader,
            &[0x11, 0x22, UART_START_BYTE, 3, 0, WRAPPER_UART_MSG, 0xAB, 0xCD],
        );
        assert!(frame.is_some());
    }

    #[test]
    fn test_start_byte_restarts_frame() {
        let mut reader = UartReader::new();
        let frame = feed(
            &mut reader,
            &[UART_START_BYTE, 9, 0, 1, UART_START_BYTE, 3, 0, WRAPPER_UART_MSG, 0xAB, 0xCD],
        );
        assert_eq!(frame, Some(vec![3, 0, WRAPPER_UART_MSG, 0xAB, 0xCD]));
    }

    #[test]
    fn test_escaped_byte_unflipped() {
        let mut reader = UartReader::new();
        // Payload byte equal to the start byte arrives escaped.
        let frame = feed(
            &mut reader,
            &[
                UART_START_BYTE,
                4,
                0,
                WRAPPER_UART_MSG,
                UART_ESCAPE_BYTE,
                escape_flip(UART_START_BYTE),
                0xAB,
                0xCD,
            ],
        );
        assert_eq!(
            frame,
            Some(vec![4, 0, WRAPPER_UART_MSG, UART_START_BYTE, 0xAB, 0xCD])
        );
    }

    #[test]
    fn test_invalid_escape_resets() {
        let mut reader = UartReader::new();
        let frame = feed(
            &mut reader,
            &[UART_START_BYTE, 3, 0, UART_ESCAPE_BYTE, 0x00, 0xAB, 0xCD],
        );
        assert!(frame.is_none());
    }

    #[test]
    fn test_implausible_size_resets() {
        let mut reader = UartReader::new();
        assert!(feed(&mut reader, &[UART_START_BYTE, 0xFF, 0xFF]).is_none());
        // Reader recovers on the next start byte.
        let frame = feed(&mut reader, &[UART_START_BYTE, 3, 0, WRAPPER_UART_MSG, 1, 2]);
        assert!(frame.is_some());
    }

    #[test]
    fn test_busy_drops_bytes_until_release() {
        let mut reader = UartReader::new();
        feed(&mut reader, &[UART_START_BYTE, 3, 0, WRAPPER_UART_MSG, 1, 2]);
        assert!(reader.is_busy());

        let frame = feed(&mut reader, &[UART_START_BYTE, 3, 0, WRAPPER_UART_MSG, 1, 2]);
        assert!(frame.is_none());

        reader.release();
        let frame = feed(&mut reader, &[UART_START_BYTE, 3, 0, WRAPPER_UART_MSG, 1, 2]);
        assert!(frame.is_some());
    }
}
