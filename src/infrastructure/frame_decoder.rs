//! Decoder for the device's ASCII line protocol.
//!
//! The device sends comma-separated segments, each carrying one reading:
//!
//! ```text
//! [<metric>_warn]$<metric>:<number>#
//! ```
//!
//! `<metric>` is one of `temp`, `humi`, `ch2o`, `pm2.5`, `co`. The optional
//! `_warn` prefix flags the reading as a device-side warning; the metric it
//! names need not be the payload's. `<number>` is `[+-]?\d+(\.\d*)?`.
//!
//! # Segment rules
//!
//! - Matching is anchored at the start of the segment. Anything after the
//!   closing `#` is ignored.
//! - A segment that does not match is dropped, never retried.
//! - A segment is only matched once it is complete: either a `,` has
//!   terminated it, or it already holds its closing `#`. Bytes of an
//!   unterminated trailing segment stay buffered until the next chunk, so a
//!   frame split at any TCP boundary decodes exactly once.

use crate::domain::metric::{MetricKind, Reading};
use bytes::{Buf, BytesMut};
use thiserror::Error;

const SEGMENT_SEPARATOR: u8 = b',';
const VALUE_MARKER: u8 = b'$';
const NAME_SEPARATOR: u8 = b':';
const TERMINATOR: u8 = b'#';
const WARN_SUFFIX: &[u8] = b"_warn";

/// Default bound on buffered bytes that have not yet formed a segment.
pub const DEFAULT_MAX_PENDING: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing '$' marker")]
    MissingMarker,

    #[error("unknown metric {0:?}")]
    UnknownMetric(String),

    #[error("malformed warning prefix {0:?}")]
    InvalidPrefix(String),

    #[error("missing ':' after metric name")]
    MissingSeparator,

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("missing '#' terminator")]
    MissingTerminator,
}

/// Stream decoder owning the parse buffer of one connection.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_pending: usize,
}

impl FrameDecoder {
    pub fn new(max_pending: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_pending.min(DEFAULT_MAX_PENDING)),
            max_pending,
        }
    }

    /// Append `chunk` to the parse buffer and decode every complete segment.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Reading> {
        self.buffer.extend_from_slice(chunk);
        let mut readings = Vec::new();

        while let Some(end) = self.buffer.iter().position(|b| *b == SEGMENT_SEPARATOR) {
            let segment = self.buffer.split_to(end);
            self.buffer.advance(1);
            push_segment(&segment, &mut readings);
        }

        if self.buffer.contains(&TERMINATOR) {
            let segment = self.buffer.split();
            push_segment(&segment, &mut readings);
        } else if self.buffer.len() > self.max_pending {
            tracing::warn!(
                "Discarding {} buffered bytes without a segment boundary",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        readings
    }

    /// Bytes received but not yet part of a complete segment.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

fn push_segment(segment: &[u8], readings: &mut Vec<Reading>) {
    if segment.trim_ascii().is_empty() {
        return;
    }
    match decode_segment(segment) {
        Ok(reading) => {
            tracing::debug!(
                "Decoded {} = {} (warning: {})",
                reading.metric,
                reading.value,
                reading.is_warning
            );
            readings.push(reading);
        }
        Err(e) => {
            tracing::warn!(
                "Discarding segment {:?}: {}",
                String::from_utf8_lossy(segment),
                e
            );
        }
    }
}

/// Decode one segment, anchored at its first non-whitespace byte.
pub fn decode_segment(segment: &[u8]) -> Result<Reading, DecodeError> {
    let segment = segment.trim_ascii_start();
    let marker = segment
        .iter()
        .position(|b| *b == VALUE_MARKER)
        .ok_or(DecodeError::MissingMarker)?;

    let is_warning = match &segment[..marker] {
        [] => false,
        prefix => {
            parse_warn_prefix(prefix)?;
            true
        }
    };

    let body = &segment[marker + 1..];
    let name_end = body
        .iter()
        .position(|b| *b == NAME_SEPARATOR)
        .ok_or(DecodeError::MissingSeparator)?;
    let metric = parse_metric(&body[..name_end])?;

    let number = &body[name_end + 1..];
    let len = scan_number(number);
    if number.get(len) != Some(&TERMINATOR) {
        return Err(if len == 0 {
            DecodeError::InvalidNumber(lossy(number))
        } else {
            DecodeError::MissingTerminator
        });
    }

    let value = parse_number(&number[..len])?;
    Ok(Reading::new(metric, value, is_warning))
}

fn parse_warn_prefix(prefix: &[u8]) -> Result<MetricKind, DecodeError> {
    let name = prefix
        .strip_suffix(WARN_SUFFIX)
        .ok_or_else(|| DecodeError::InvalidPrefix(lossy(prefix)))?;
    parse_metric(name)
}

fn parse_metric(name: &[u8]) -> Result<MetricKind, DecodeError> {
    std::str::from_utf8(name)
        .ok()
        .and_then(MetricKind::from_token)
        .ok_or_else(|| DecodeError::UnknownMetric(lossy(name)))
}

/// Length of the longest `[+-]?\d+(\.\d*)?` prefix of `input`, or 0.
fn scan_number(input: &[u8]) -> usize {
    let sign = usize::from(matches!(input.first(), Some(b'+' | b'-')));
    let digits = count_digits(&input[sign..]);
    if digits == 0 {
        return 0;
    }

    let mut len = sign + digits;
    if input.get(len) == Some(&b'.') {
        len += 1 + count_digits(&input[len + 1..]);
    }
    len
}

fn count_digits(input: &[u8]) -> usize {
    input.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Integer and fractional literals both become `f64`; integers too wide for
/// exact representation round to the nearest value.
fn parse_number(literal: &[u8]) -> Result<f64, DecodeError> {
    let text = String::from_utf8_lossy(literal);
    text.parse::<f64>()
        .map_err(|_| DecodeError::InvalidNumber(text.into_owned()))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(readings: &[Reading]) -> Vec<(MetricKind, f64, bool)> {
        readings
            .iter()
            .map(|r| (r.metric, r.value, r.is_warning))
            .collect()
    }

    #[test]
    fn test_decodes_every_metric() {
        let cases: &[(&str, MetricKind, f64, bool)] = &[
            ("$temp:23.5#", MetricKind::Temperature, 23.5, false),
            ("$humi:55#", MetricKind::Humidity, 55.0, false),
            ("$ch2o:0.08#", MetricKind::Formaldehyde, 0.08, false),
            ("$pm2.5:12#", MetricKind::Pm2_5, 12.0, false),
            ("$co:-3#", MetricKind::Co, -3.0, false),
            ("temp_warn$temp:+31.25#", MetricKind::Temperature, 31.25, true),
            ("pm2.5_warn$pm2.5:40#", MetricKind::Pm2_5, 40.0, true),
            ("co_warn$co:12.#", MetricKind::Co, 12.0, true),
        ];

        for (segment, metric, value, warning) in cases {
            let reading = decode_segment(segment.as_bytes())
                .unwrap_or_else(|e| panic!("{} failed: {}", segment, e));
            assert_eq!(reading.metric, *metric, "{}", segment);
            assert_eq!(reading.value, *value, "{}", segment);
            assert_eq!(reading.is_warning, *warning, "{}", segment);
        }
    }

    #[test]
    fn test_rejects_malformed_segments() {
        let cases: &[(&str, DecodeError)] = &[
            ("$temp:23.5", DecodeError::MissingTerminator),
            ("temp:23.5#", DecodeError::MissingMarker),
            ("$pm25:10#", DecodeError::UnknownMetric("pm25".into())),
            ("$TEMP:10#", DecodeError::UnknownMetric("TEMP".into())),
            ("$temp:abc#", DecodeError::InvalidNumber("abc#".into())),
            ("$temp:.5#", DecodeError::InvalidNumber(".5#".into())),
            ("$temp:12x#", DecodeError::MissingTerminator),
            ("$temp23#", DecodeError::MissingSeparator),
            ("warn$temp:1#", DecodeError::InvalidPrefix("warn".into())),
            ("foo_warn$temp:1#", DecodeError::UnknownMetric("foo".into())),
        ];

        for (segment, expected) in cases {
            assert_eq!(decode_segment(segment.as_bytes()).as_ref().err(), Some(expected), "{}", segment);
        }
    }

    #[test]
    fn test_warn_prefix_may_name_another_metric() {
        let mut decoder = FrameDecoder::default();
        let readings = decoder.decode(b"humi_warn$temp:30#,");
        assert_eq!(summary(&readings), vec![(MetricKind::Temperature, 30.0, true)]);
    }

    #[test]
    fn test_wide_integer_literal_is_accepted() {
        let mut decoder = FrameDecoder::default();
        let readings = decoder.decode(b"$co:99999999999999999999#,$co:-7#,");
        assert_eq!(
            summary(&readings),
            vec![(MetricKind::Co, 1e20, false), (MetricKind::Co, -7.0, false)]
        );
    }

    #[test]
    fn test_trailing_garbage_after_terminator_is_ignored() {
        let reading = decode_segment(b"  $humi:61.5#\r\njunk").unwrap();
        assert_eq!(reading.value, 61.5);
    }

    #[test]
    fn test_end_to_end_buffer() {
        let mut decoder = FrameDecoder::default();
        let readings = decoder.decode(b"$temp:23.5#,$humi:55#,pm2.5_warn$pm2.5:40#");
        assert_eq!(
            summary(&readings),
            vec![
                (MetricKind::Temperature, 23.5, false),
                (MetricKind::Humidity, 55.0, false),
                (MetricKind::Pm2_5, 40.0, true),
            ]
        );
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_malformed_segments_do_not_poison_neighbours() {
        let mut decoder = FrameDecoder::default();
        let readings = decoder.decode(b"$temp:1#,$bogus:2#,,$humi:x#,$co:3#,");
        assert_eq!(
            summary(&readings),
            vec![(MetricKind::Temperature, 1.0, false), (MetricKind::Co, 3.0, false)]
        );
    }

    #[test]
    fn test_same_buffer_twice_is_identical() {
        let input = b"$temp:23.5#,humi_warn$humi:80#,$co:4#,";
        let first = summary(&FrameDecoder::default().decode(input));
        let second = summary(&FrameDecoder::default().decode(input));
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_frame_split_at_every_boundary() {
        let input = b"$temp:23.5#,pm2.5_warn$pm2.5:40#,$co:7#,";
        for split in 1..input.len() {
            let mut decoder = FrameDecoder::default();
            let mut readings = decoder.decode(&input[..split]);
            readings.extend(decoder.decode(&input[split..]));
            assert_eq!(
                summary(&readings),
                vec![
                    (MetricKind::Temperature, 23.5, false),
                    (MetricKind::Pm2_5, 40.0, true),
                    (MetricKind::Co, 7.0, false),
                ],
                "split at {}",
                split
            );
            assert!(decoder.pending().is_empty(), "split at {}", split);
        }
    }

    #[test]
    fn test_partial_segment_stays_buffered() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.decode(b"$temp:23.5#,$hu").len(), 1);
        assert_eq!(decoder.pending(), b"$hu");
        let readings = decoder.decode(b"mi:48#");
        assert_eq!(summary(&readings), vec![(MetricKind::Humidity, 48.0, false)]);
    }

    #[test]
    fn test_repeated_text_does_not_clear_buffer() {
        let mut decoder = FrameDecoder::default();
        let readings = decoder.decode(b"$co:1#,$co:1#,$co:");
        assert_eq!(readings.len(), 2);
        assert_eq!(decoder.pending(), b"$co:");
        assert_eq!(decoder.decode(b"1#").len(), 1);
    }

    #[test]
    fn test_unbounded_garbage_is_dropped() {
        let mut decoder = FrameDecoder::new(16);
        assert!(decoder.decode(&[b'x'; 17]).is_empty());
        assert!(decoder.pending().is_empty());
        assert_eq!(decoder.decode(b"$co:2#").len(), 1);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut decoder = FrameDecoder::default();
        decoder.decode(b"$temp:2");
        decoder.reset();
        assert!(decoder.decode(b"3#,").is_empty());
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.decode(b"").is_empty());
        assert!(decoder.pending().is_empty());
    }
}
