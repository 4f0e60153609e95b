//! Streaming removal of embedded metadata.
//!
//! JPEG streams lose every APP1 segment (Exif, XMP). Everything from the
//! start-of-scan marker on is copied untouched, and any stream that does not
//! open with a JPEG SOI marker passes through unchanged.

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP1: u8 = 0xE1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the first two bytes.
    Sniff,
    /// Expecting `FF xx`.
    Marker,
    /// Expecting the 2-byte length of segment `xx`; the marker is held back.
    Length(u8),
    /// Dropping the remaining bytes of an APP1 segment.
    Skip(usize),
    /// Copying the remaining bytes of any other segment.
    Copy(usize),
    Passthrough,
}

/// Incremental metadata filter. Feed chunks with [`push`](Self::push), then call
/// [`finish`](Self::finish) to flush any bytes still held back.
#[derive(Debug)]
pub struct MetadataStripper {
    state: State,
    header: Vec<u8>,
}

impl Default for MetadataStripper {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStripper {
    pub fn new() -> Self {
        Self {
            state: State::Sniff,
            header: Vec::with_capacity(2),
        }
    }

    /// Filter one chunk, appending the kept bytes to `out`.
    pub fn push(&mut self, mut input: &[u8], out: &mut Vec<u8>) {
        while !input.is_empty() {
            match self.state {
                State::Passthrough => {
                    out.extend_from_slice(input);
                    return;
                }
                State::Skip(n) => {
                    let k = n.min(input.len());
                    input = &input[k..];
                    self.state = if k == n { State::Marker } else { State::Skip(n - k) };
                }
                State::Copy(n) => {
                    let k = n.min(input.len());
                    out.extend_from_slice(&input[..k]);
                    input = &input[k..];
                    self.state = if k == n { State::Marker } else { State::Copy(n - k) };
                }
                State::Sniff | State::Marker | State::Length(_) => {
                    let k = (2 - self.header.len()).min(input.len());
                    self.header.extend_from_slice(&input[..k]);
                    input = &input[k..];
                    if self.header.len() == 2 {
                        let pair = [self.header[0], self.header[1]];
                        self.header.clear();
                        self.advance(pair, out);
                    }
                }
            }
        }
    }

    /// Flush held-back bytes of a truncated stream.
    pub fn finish(self, out: &mut Vec<u8>) {
        if let State::Length(marker) = self.state {
            out.extend_from_slice(&[0xFF, marker]);
        }
        out.extend_from_slice(&self.header);
    }

    fn advance(&mut self, pair: [u8; 2], out: &mut Vec<u8>) {
        self.state = match self.state {
            State::Sniff => {
                out.extend_from_slice(&pair);
                if pair == [0xFF, SOI] {
                    State::Marker
                } else {
                    State::Passthrough
                }
            }
            State::Marker if pair[0] != 0xFF => {
                out.extend_from_slice(&pair);
                State::Passthrough
            }
            State::Marker => match pair[1] {
                // Fill byte: the second 0xFF starts the real marker.
                0xFF => {
                    out.push(0xFF);
                    self.header.push(0xFF);
                    State::Marker
                }
                SOI | 0x01 | 0xD0..=0xD7 => {
                    out.extend_from_slice(&pair);
                    State::Marker
                }
                EOI | SOS => {
                    out.extend_from_slice(&pair);
                    State::Passthrough
                }
                marker => State::Length(marker),
            },
            State::Length(marker) => {
                let len = u16::from_be_bytes(pair) as usize;
                if len < 2 {
                    out.extend_from_slice(&[0xFF, marker]);
                    out.extend_from_slice(&pair);
                    State::Passthrough
                } else if marker == APP1 {
                    State::Skip(len - 2)
                } else {
                    out.extend_from_slice(&[0xFF, marker]);
                    out.extend_from_slice(&pair);
                    State::Copy(len - 2)
                }
            }
            other => other,
        };
    }
}

/// Strip a complete buffer in one call.
pub fn strip_metadata(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut stripper = MetadataStripper::new();
    stripper.push(bytes, &mut out);
    stripper.finish(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let len = (payload.len() + 2) as u16;
        let mut seg = vec![0xFF, marker];
        seg.extend_from_slice(&len.to_be_bytes());
        seg.extend_from_slice(payload);
        seg
    }

    fn sample_jpeg() -> (Vec<u8>, Vec<u8>) {
        let app0 = segment(0xE0, b"JFIF\0\x01\x01");
        let app1 = segment(APP1, b"Exif\0\0MM\0*secret-gps");
        let dqt = segment(0xDB, &[0u8; 8]);
        let scan = [0xFF, SOS, 0x00, 0x02, 0x12, 0x34, 0xFF, 0xE1, 0x56, 0xFF, EOI];

        let mut input = vec![0xFF, SOI];
        input.extend(&app0);
        input.extend(&app1);
        input.extend(&dqt);
        input.extend(scan);

        let mut expected = vec![0xFF, SOI];
        expected.extend(&app0);
        expected.extend(&dqt);
        expected.extend(scan);
        (input, expected)
    }

    #[test]
    fn app1_is_removed() {
        let (input, expected) = sample_jpeg();
        assert_eq!(strip_metadata(&input), expected);
    }

    #[test]
    fn chunking_does_not_matter() {
        let (input, expected) = sample_jpeg();
        for size in 1..=7 {
            let mut out = Vec::new();
            let mut stripper = MetadataStripper::new();
            for chunk in input.chunks(size) {
                stripper.push(chunk, &mut out);
            }
            stripper.finish(&mut out);
            assert_eq!(out, expected, "chunk size {size}");
        }
    }

    #[test]
    fn non_jpeg_passes_through() {
        let pdf = b"%PDF-1.7\n\xFF\xE1 not a marker".to_vec();
        assert_eq!(strip_metadata(&pdf), pdf);
        assert_eq!(strip_metadata(b"x"), b"x");
        assert!(strip_metadata(b"").is_empty());
    }

    #[test]
    fn truncated_stream_keeps_held_bytes() {
        let input = [0xFF, SOI, 0xFF, 0xDB, 0x00];
        assert_eq!(strip_metadata(&input), input);
    }
}
