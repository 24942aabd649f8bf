//! Stream framing for the Meshtastic serial API.
//!
//! Every protobuf message travels as `0x94 0xC3 <len_hi> <len_lo> <payload>`. Bytes
//! outside a frame are the device's debug console and are skipped.

use super::TransportError;

pub const START1: u8 = 0x94;
pub const START2: u8 = 0xC3;
/// Largest payload the firmware will send or accept.
pub const MAX_PAYLOAD: usize = 512;
const HEADER_LEN: usize = 4;

/// Wrap `payload` in a frame header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(START1);
    out.push(START2);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Incremental frame extractor.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Total non-frame bytes discarded so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Feed raw bytes and return every complete frame payload.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            // Realign to header if needed
            if !(self.buf[0] == START1 && self.buf[1] == START2) {
                match self.buf.iter().skip(1).position(|&b| b == START1) {
                    Some(pos) => {
                        self.buf.drain(..pos + 1);
                        self.skipped += pos + 1;
                    }
                    None => {
                        // Keep a trailing START1; its partner may be in the next read.
                        let keep = usize::from(self.buf.last() == Some(&START1));
                        let drop = self.buf.len() - keep;
                        self.buf.drain(..drop);
                        self.skipped += drop;
                        break;
                    }
                }
                continue;
            }

            let declared = usize::from(u16::from_be_bytes([self.buf[2], self.buf[3]]));
            if declared == 0 || declared > MAX_PAYLOAD {
                self.buf.drain(..1);
                self.skipped += 1;
                continue;
            }
            if self.buf.len() < HEADER_LEN + declared {
                break;
            }
            frames.push(self.buf[HEADER_LEN..HEADER_LEN + declared].to_vec());
            self.buf.drain(..HEADER_LEN + declared);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let f = encode_frame(&[1, 2, 3]).unwrap();
        assert_eq!(f, vec![0x94, 0xC3, 0x00, 0x03, 1, 2, 3]);
        assert!(encode_frame(&[0u8; MAX_PAYLOAD + 1]).is_err());
    }

    #[test]
    fn frames_split_across_reads() {
        let mut d = FrameDecoder::new();
        let frame = encode_frame(b"hello").unwrap();
        assert!(d.push(&frame[..3]).is_empty());
        assert_eq!(d.push(&frame[3..]), vec![b"hello".to_vec()]);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn console_noise_is_skipped() {
        let mut d = FrameDecoder::new();
        let mut stream = b"INFO | boot ok\r\n".to_vec();
        stream.extend(encode_frame(b"a").unwrap());
        stream.extend(b"\x94junk");
        stream.extend(encode_frame(b"bc").unwrap());
        let frames = d.push(&stream);
        assert_eq!(frames, vec![b"a".to_vec(), b"bc".to_vec()]);
        assert!(d.skipped() > 0);
    }

    #[test]
    fn bogus_length_does_not_stall() {
        let mut d = FrameDecoder::new();
        let mut stream = vec![0x94, 0xC3, 0xFF, 0xFF];
        stream.extend(encode_frame(b"ok").unwrap());
        assert_eq!(d.push(&stream), vec![b"ok".to_vec()]);
    }

    #[test]
    fn split_start_bytes_survive() {
        let mut d = FrameDecoder::new();
        let frame = encode_frame(b"xy").unwrap();
        let mut first = b"noise".to_vec();
        first.push(frame[0]);
        assert!(d.push(&first).is_empty());
        assert_eq!(d.push(&frame[1..]), vec![b"xy".to_vec()]);
    }
}
