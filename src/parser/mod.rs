//! Record Parser (spec component A): decodes the framed, CRC-checked
//! TensorBoard event stream incrementally from caller-supplied byte
//! slices.
//!
//! The parser is stateless across calls — [`parse_buffer`] takes a slice
//! and returns how much of it was consumed; everything past `consumed` is
//! the caller's responsibility to retain and re-offer on the next call.
//! This is what lets the same function serve a one-shot file read and a
//! long-lived streaming consumer fed from 64 KiB disk-read chunks.

mod crc;
mod record;
pub mod writer;

use crate::error::{Error, Result};
use crate::model::hparam::ParsedEvent;
use crc::masked_crc32c;
use std::io::Read;

/// Header (8 + 4) plus trailing payload CRC (4) overhead per record.
const FRAME_OVERHEAD: usize = 8 + 4 + 4;
const MIN_HEADER_LEN: usize = 12;

/// A record whose length field or CRC could not be trusted, too large to
/// plausibly be a real TensorBoard record. Guards against treating a
/// corrupt length field as an enormous frame and stalling forever waiting
/// for bytes that will never arrive.
const MAX_PLAUSIBLE_RECORD_LEN: u64 = 1 << 30; // 1 GiB

/// Why a record was dropped rather than turned into a [`ParsedEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParseWarningKind {
    /// Either the length-field CRC or the payload CRC did not match.
    CrcMismatch,
    /// The frame's CRCs were valid but the protobuf payload inside it
    /// could not be decoded.
    MalformedProtobuf(String),
}

/// A non-fatal event surfaced while parsing. The stream always makes
/// forward progress past a warning; the caller decides whether to log it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// Byte offset (relative to the start of the buffer passed to this
    /// call) where the offending record began.
    pub offset: u64,
    pub kind: ParseWarningKind,
}

/// Result of one [`parse_buffer`] call.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Successfully decoded events, in stream order.
    pub events: Vec<ParsedEvent>,
    /// Number of bytes consumed from the front of the input. The caller
    /// must retain `input[consumed..]` and prepend future bytes to it.
    pub consumed: usize,
    /// Non-fatal issues encountered while parsing records that were
    /// nonetheless skipped (not retained for the next call).
    pub warnings: Vec<ParseWarning>,
}

/// Parse as many complete records as `buf` contains.
///
/// Returns the maximal prefix of complete records. Never reads past
/// `consumed`. If fewer than 12 header bytes are present, or the declared
/// payload doesn't fully fit yet, `consumed` is left unchanged so the
/// caller can top up the buffer and retry — this is not an error.
pub fn parse_buffer(buf: &[u8]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    loop {
        let remaining = &buf[outcome.consumed..];
        if remaining.len() < MIN_HEADER_LEN {
            break;
        }

        let len_bytes = &remaining[0..8];
        let declared_len = u64::from_le_bytes(len_bytes.try_into().unwrap());
        let len_crc = u32::from_le_bytes(remaining[8..12].try_into().unwrap());

        if declared_len > MAX_PLAUSIBLE_RECORD_LEN {
            // The length field itself is implausible; there is no frame
            // size we can trust, so treat just the header as the
            // offending unit and step past it to keep making progress.
            outcome.warnings.push(ParseWarning {
                offset: outcome.consumed as u64,
                kind: ParseWarningKind::CrcMismatch,
            });
            outcome.consumed += MIN_HEADER_LEN;
            continue;
        }

        let payload_len = declared_len as usize;
        let frame_total = FRAME_OVERHEAD + payload_len;
        if remaining.len() < frame_total {
            break;
        }

        let header_ok = masked_crc32c(len_bytes) == len_crc;
        let payload = &remaining[12..12 + payload_len];
        let payload_crc =
            u32::from_le_bytes(remaining[12 + payload_len..frame_total].try_into().unwrap());
        let payload_ok = masked_crc32c(payload) == payload_crc;

        if !header_ok || !payload_ok {
            outcome.warnings.push(ParseWarning {
                offset: outcome.consumed as u64,
                kind: ParseWarningKind::CrcMismatch,
            });
            outcome.consumed += frame_total;
            continue;
        }

        match record::decode_event(payload) {
            Ok(event) => outcome.events.push(event),
            Err(e) => outcome.warnings.push(ParseWarning {
                offset: outcome.consumed as u64,
                kind: ParseWarningKind::MalformedProtobuf(e.to_string()),
            }),
        }
        outcome.consumed += frame_total;
    }

    outcome
}

/// Parse every record from a blocking reader until EOF, accumulating a
/// rolling tail buffer the same way a streaming caller would. Hard I/O
/// errors abort the stream; CRC/protobuf issues are pushed onto
/// `warnings` exactly as in [`parse_buffer`] and do not stop iteration.
pub fn parse_stream<R: Read>(mut reader: R) -> Result<(Vec<ParsedEvent>, Vec<ParseWarning>)> {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    let mut events = Vec::new();
    let mut warnings = Vec::new();

    loop {
        let n = reader.read(&mut chunk).map_err(Error::Io)?;
        if n == 0 {
            break;
        }
        tail.extend_from_slice(&chunk[..n]);

        let outcome = parse_buffer(&tail);
        events.extend(outcome.events);
        warnings.extend(outcome.warnings);
        tail.drain(..outcome.consumed);
    }

    Ok((events, warnings))
}

#[cfg(test)]
mod tests {
    use super::writer::{frame, write_event};
    use super::*;

    fn sample_stream(n: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for i in 0..n {
            let loss = 2.0 - 0.015 * i as f32;
            bytes.extend(write_event(
                1_700_000_000.0 + i as f64,
                i as i64,
                &[("loss", loss), ("lr", 0.001), ("accuracy", 0.008 * i as f32)],
                &[],
            ));
        }
        bytes
    }

    #[test]
    fn parses_a_single_complete_record() {
        let bytes = write_event(1.0, 0, &[("loss", 1.0)], &[]);
        let outcome = parse_buffer(&bytes);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.consumed, bytes.len());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn leaves_incomplete_tail_unconsumed() {
        let bytes = write_event(1.0, 0, &[("loss", 1.0)], &[]);
        let partial = &bytes[..bytes.len() - 3];
        let outcome = parse_buffer(partial);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.consumed, 0);
    }

    #[test]
    fn byte_at_a_time_feeding_matches_one_shot_parse() {
        let bytes = sample_stream(20);
        let one_shot = parse_buffer(&bytes).events;

        let mut tail: Vec<u8> = Vec::new();
        let mut streamed = Vec::new();
        for &b in &bytes {
            tail.push(b);
            let outcome = parse_buffer(&tail);
            streamed.extend(outcome.events);
            tail.drain(..outcome.consumed);
        }
        assert_eq!(streamed.len(), one_shot.len());
        for (a, b) in streamed.iter().zip(one_shot.iter()) {
            assert_eq!(a.step, b.step);
            assert_eq!(a.scalars, b.scalars);
        }
    }

    #[test]
    fn eighty_thousand_byte_chunking_matches_one_shot_parse() {
        let bytes = sample_stream(101);
        let one_shot = parse_buffer(&bytes).events;

        let mut tail: Vec<u8> = Vec::new();
        let mut streamed = Vec::new();
        for chunk in bytes.chunks(80_000) {
            tail.extend_from_slice(chunk);
            let outcome = parse_buffer(&tail);
            streamed.extend(outcome.events);
            tail.drain(..outcome.consumed);
        }
        assert_eq!(streamed.len(), one_shot.len());
        assert_eq!(streamed.len(), 101);
    }

    #[test]
    fn splitting_at_an_offset_drops_at_most_the_straddling_record() {
        let bytes = sample_stream(10);
        let full = parse_buffer(&bytes).events;

        for offset in 0..bytes.len() {
            let first = parse_buffer(&bytes[..offset]);
            let mut combined = first.events.clone();
            // resume on the suffix starting right after what was actually
            // consumed, i.e. the caller's retained tail plus the rest of
            // the stream
            let resumed = parse_buffer(&bytes[first.consumed..]);
            combined.extend(resumed.events);
            // at most one record (the one straddling `offset`) can be lost
            assert!(combined.len() >= full.len() - 1);
            assert!(combined.len() <= full.len());
        }
    }

    #[test]
    fn flipping_a_payload_crc_bit_drops_exactly_that_record() {
        let mut bytes = Vec::new();
        bytes.extend(write_event(1.0, 0, &[("loss", 1.0)], &[]));
        let first_len = bytes.len();
        bytes.extend(write_event(2.0, 1, &[("loss", 2.0)], &[]));
        bytes.extend(write_event(3.0, 2, &[("loss", 3.0)], &[]));

        // flip one bit in the first record's payload CRC (last 4 bytes of
        // that frame)
        let crc_offset = first_len - 1;
        bytes[crc_offset] ^= 0x01;

        let outcome = parse_buffer(&bytes);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[0].step, 1);
        assert_eq!(outcome.events[1].step, 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, ParseWarningKind::CrcMismatch);
        assert_eq!(outcome.consumed, bytes.len());
    }

    #[test]
    fn malformed_protobuf_in_a_valid_frame_is_dropped_not_fatal() {
        // a CRC-valid frame whose payload is garbage (odd varint tag that
        // truncates mid-field)
        let garbage_payload = vec![0x08, 0xffu8];
        let garbage_frame = frame(&garbage_payload);

        let mut bytes = garbage_frame;
        bytes.extend(write_event(1.0, 5, &[("loss", 1.0)], &[]));

        let outcome = parse_buffer(&bytes);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].step, 5);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| matches!(w.kind, ParseWarningKind::MalformedProtobuf(_))));
    }

    #[test]
    fn streaming_parse_with_chunking_end_to_end_scenario() {
        // spec section 8, scenario 4: 101 total events (a version header
        // plus 100 scalar-bearing steps), fed through 1024-byte chunks.
        let mut bytes = Vec::new();
        bytes.extend(write_event(
            1.0,
            0,
            &[],
            &[("file_version/text_summary", "brain.Event:2")],
        ));
        for i in 0..100 {
            let loss = 2.0 - 0.015 * i as f32;
            let accuracy = 0.008 * i as f32;
            bytes.extend(write_event(
                1_700_000_000.0 + i as f64,
                i as i64,
                &[("loss", loss), ("lr", 0.001), ("accuracy", accuracy)],
                &[],
            ));
        }

        let mut tail: Vec<u8> = Vec::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(1024) {
            tail.extend_from_slice(chunk);
            let outcome = parse_buffer(&tail);
            events.extend(outcome.events);
            tail.drain(..outcome.consumed);
        }

        assert_eq!(events.len(), 101);
        assert!(tail.is_empty());
        for event in &events {
            assert!((0..100).contains(&event.step));
        }
    }
}
