//! ASCII framing for the base microcontroller link
//!
//! Inbound frame:  `ODOMS,<left>,<right>ODOME\n` (cumulative encoder ticks)
//! Outbound frame: `\nMOTOS,<l>,<r>,MOTOE\n` (drive integers in [-127, 127])
//!
//! This module provides:
//! - `FrameReader`: buffering scanner that extracts tick frames from a raw
//!   byte stream, tolerating garbage, partial reads, and malformed payloads
//! - `encode_motor_frame`: builder for outgoing motor-drive frames
//!
//! The reader classifies complete-vs-malformed payloads only; timeouts and
//! transport failures are the caller's concern, and an absent frame is simply
//! "no sample this cycle".

use std::time::Instant;

/// Start delimiter of an odometry frame
const ODOM_START: &[u8] = b"ODOMS";
/// End delimiter of an odometry frame
const ODOM_END: &[u8] = b"ODOME\n";

/// Longest plausible distance from a start delimiter to the end of its frame.
/// Anything longer is treated as a corrupt frame and resynced past.
const MAX_FRAME_SPAN: usize = 64;

/// Scan buffer cap; the stale prefix is discarded beyond this
const MAX_BUFFER_SIZE: usize = 1024;

/// Normalized command range [-1, 1] maps onto this integer range
const DRIVE_SCALE: f64 = 127.0;

/// Encoder tick pair decoded from one complete odometry frame
///
/// The wire tokens are mapped onto left/right by the caller (the
/// `flip_left_right` setting lives at the call site, not in the codec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSample {
    pub left_ticks: i64,
    pub right_ticks: i64,
    pub timestamp: Instant,
}

/// Buffering frame scanner for the odometry byte stream
///
/// Bytes are pushed in whatever chunks the transport produces; complete
/// frames are extracted in FIFO order. Malformed frames (fewer than two
/// commas, non-numeric fields) are counted and skipped without yielding a
/// partial result.
pub struct FrameReader {
    buffer: Vec<u8>,
    malformed: u64,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            malformed: 0,
        }
    }

    /// Append raw bytes read from the transport
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of malformed frames discarded so far
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Extract the next complete frame, if any
    ///
    /// Returns the two payload tokens in wire order. Skips over malformed
    /// frames until a valid frame or the end of buffered data is reached.
    pub fn next_frame(&mut self) -> Option<(i64, i64)> {
        loop {
            let Some(start) = find(&self.buffer, ODOM_START, 0) else {
                // No start delimiter; keep a tail that could be its prefix
                let keep = ODOM_START.len() - 1;
                if self.buffer.len() > keep {
                    self.buffer.drain(..self.buffer.len() - keep);
                }
                return None;
            };

            // The payload keeps the comma that follows the start delimiter,
            // so a well-formed payload carries at least two commas. The end
            // delimiter must land within the frame span, or a dropped byte
            // would let one corrupt frame swallow the valid frames behind it.
            let payload_start = start + ODOM_START.len();
            let search_end = (start + MAX_FRAME_SPAN).min(self.buffer.len());
            let Some(end) = find(&self.buffer[..search_end], ODOM_END, payload_start) else {
                if self.buffer.len() - start > MAX_FRAME_SPAN {
                    // Frame ran too long without an end delimiter; resync
                    // just past this start token.
                    self.malformed += 1;
                    self.buffer.drain(..start + 1);
                    continue;
                }
                if self.buffer.len() > MAX_BUFFER_SIZE {
                    self.buffer.drain(..start);
                }
                return None;
            };

            let parsed = parse_payload(&self.buffer[payload_start..end]);
            self.buffer.drain(..end + ODOM_END.len());

            match parsed {
                Some(ticks) => return Some(ticks),
                None => {
                    self.malformed += 1;
                    log::debug!("FrameReader: discarded malformed odometry frame");
                }
            }
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the payload between the delimiters
///
/// The payload begins with the comma trailing `ODOMS`; tick fields lie
/// between the first and second commas and after the second comma (bounded by
/// a third when the firmware emits a trailing one). Fewer than two commas or
/// a non-numeric field rejects the frame.
fn parse_payload(payload: &[u8]) -> Option<(i64, i64)> {
    let commas: Vec<usize> = payload
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b',')
        .map(|(i, _)| i)
        .collect();

    if commas.len() < 2 {
        return None;
    }

    let first = &payload[commas[0] + 1..commas[1]];
    let second_end = commas.get(2).copied().unwrap_or(payload.len());
    let second = &payload[commas[1] + 1..second_end];

    let first = std::str::from_utf8(first).ok()?.parse::<i64>().ok()?;
    let second = std::str::from_utf8(second).ok()?.parse::<i64>().ok()?;
    Some((first, second))
}

/// Locate a delimiter in the buffer starting at `from`
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Encode an outgoing motor-drive frame
///
/// Normalized commands scale by 127 (rounded) and clamp to the firmware's
/// [-127, 127] range.
pub fn encode_motor_frame(left_cmd: f64, right_cmd: f64) -> Vec<u8> {
    let left = drive_int(left_cmd);
    let right = drive_int(right_cmd);
    format!("\nMOTOS,{},{},MOTOE\n", left, right).into_bytes()
}

fn drive_int(cmd: f64) -> i32 {
    ((cmd * DRIVE_SCALE).round() as i64).clamp(-127, 127) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(reader: &mut FrameReader) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        while let Some(f) = reader.next_frame() {
            out.push(f);
        }
        out
    }

    #[test]
    fn test_decode_valid_frame() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,12,34ODOME\n");
        assert_eq!(reader.next_frame(), Some((12, 34)));
        assert_eq!(reader.next_frame(), None);
        assert_eq!(reader.malformed_count(), 0);
    }

    #[test]
    fn test_decode_negative_ticks() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,-8,-120ODOME\n");
        assert_eq!(reader.next_frame(), Some((-8, -120)));
    }

    #[test]
    fn test_decode_trailing_comma_variant() {
        // Symmetric with the outbound MOTOS,<l>,<r>,MOTOE format
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,12,34,ODOME\n");
        assert_eq!(reader.next_frame(), Some((12, 34)));
    }

    #[test]
    fn test_single_comma_is_malformed() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,12ODOME\n");
        assert_eq!(reader.next_frame(), None);
        assert_eq!(reader.malformed_count(), 1);
    }

    #[test]
    fn test_non_numeric_is_malformed() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,12,abODOME\n");
        assert_eq!(reader.next_frame(), None);
        assert_eq!(reader.malformed_count(), 1);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOM");
        assert_eq!(reader.next_frame(), None);
        reader.push_bytes(b"S,7,");
        assert_eq!(reader.next_frame(), None);
        reader.push_bytes(b"-3ODOME\n");
        assert_eq!(reader.next_frame(), Some((7, -3)));
    }

    #[test]
    fn test_garbage_before_frame() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"\x00\xffnoiseODOMS,1,2ODOME\n");
        assert_eq!(reader.next_frame(), Some((1, 2)));
    }

    #[test]
    fn test_multiple_frames_fifo() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,1,2ODOME\nODOMS,3,4ODOME\nODOMS,5,6ODOME\n");
        assert_eq!(frames(&mut reader), vec![(1, 2), (3, 4), (5, 6)]);
    }

    #[test]
    fn test_malformed_frame_skipped_to_next_valid() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,12ODOME\nODOMS,9,9ODOME\n");
        assert_eq!(reader.next_frame(), Some((9, 9)));
        assert_eq!(reader.malformed_count(), 1);
    }

    #[test]
    fn test_runaway_frame_resyncs() {
        let mut reader = FrameReader::new();
        reader.push_bytes(b"ODOMS,1,1");
        reader.push_bytes(&[b'x'; 100]);
        reader.push_bytes(b"ODOMS,2,3ODOME\n");
        assert_eq!(reader.next_frame(), Some((2, 3)));
        assert!(reader.malformed_count() >= 1);
    }

    #[test]
    fn test_encode_motor_frame() {
        assert_eq!(encode_motor_frame(0.5, -0.5), b"\nMOTOS,64,-64,MOTOE\n");
        assert_eq!(encode_motor_frame(0.0, 0.0), b"\nMOTOS,0,0,MOTOE\n");
        assert_eq!(encode_motor_frame(1.0, -1.0), b"\nMOTOS,127,-127,MOTOE\n");
    }

    #[test]
    fn test_encode_rounds_not_truncates() {
        // 0.996 * 127 = 126.49 -> 126; 0.997 * 127 = 126.62 -> 127
        assert_eq!(encode_motor_frame(0.996, 0.997), b"\nMOTOS,126,127,MOTOE\n");
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        assert_eq!(encode_motor_frame(5.0, -5.0), b"\nMOTOS,127,-127,MOTOE\n");
    }
}
