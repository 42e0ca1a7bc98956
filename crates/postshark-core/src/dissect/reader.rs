use std::io::BufRead;

use serde::Deserialize;

use super::error::DissectError;
use super::layout;
use crate::record::DissectedPacketRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    BeforeFirst,
    AfterElement,
    Closed,
    Truncated,
    Failed,
}

/// Incremental reader for the top-level JSON array `tshark -T json` writes.
///
/// Decodes one packet object at a time, so memory use is bounded by the
/// largest single packet rather than the whole capture. The iterator is
/// single-pass and fuses after the first error.
///
/// # Examples
/// ```
/// use postshark_core::PacketArrayReader;
///
/// let json = br#"[{"_source":{"layers":{"http.request.method":["POST"]}}}]"#;
/// let mut reader = PacketArrayReader::open(&json[..]).unwrap();
/// let records: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();
/// assert_eq!(records.len(), 1);
/// reader.finish().unwrap();
/// ```
pub struct PacketArrayReader<R> {
    inner: R,
    state: ArrayState,
    position: usize,
}

impl<R: BufRead> PacketArrayReader<R> {
    /// Consume the opening `[` and prepare to yield packets.
    ///
    /// # Errors
    /// Returns `DissectError::MissingOpeningDelimiter` when the stream does
    /// not begin with a JSON array.
    pub fn open(mut inner: R) -> Result<Self, DissectError> {
        skip_whitespace(&mut inner)?;
        match peek_byte(&mut inner)? {
            Some(layout::ARRAY_OPEN) => inner.consume(1),
            found => {
                return Err(DissectError::MissingOpeningDelimiter {
                    found: found.map(char::from),
                });
            }
        }
        Ok(Self {
            inner,
            state: ArrayState::BeforeFirst,
            position: 0,
        })
    }

    /// Number of array elements the reader has attempted to decode.
    pub fn records_read(&self) -> usize {
        self.position
    }

    /// True once the closing `]` has been consumed.
    pub fn is_closed(&self) -> bool {
        self.state == ArrayState::Closed
    }

    /// Validate that the array was closed and return the element count.
    ///
    /// # Errors
    /// Returns `DissectError::MissingClosingDelimiter` if the stream ended, or
    /// iteration stopped, before the closing `]`.
    pub fn finish(mut self) -> Result<usize, DissectError> {
        if matches!(self.state, ArrayState::BeforeFirst | ArrayState::AfterElement) {
            // Caller stopped early; only an immediately following `]` counts.
            skip_whitespace(&mut self.inner)?;
            if peek_byte(&mut self.inner)? == Some(layout::ARRAY_CLOSE) {
                self.inner.consume(1);
                self.state = ArrayState::Closed;
            }
        }
        if self.state == ArrayState::Closed {
            Ok(self.position)
        } else {
            Err(DissectError::MissingClosingDelimiter)
        }
    }

    fn read_next(&mut self) -> Result<Option<DissectedPacketRecord>, DissectError> {
        skip_whitespace(&mut self.inner)?;
        let Some(byte) = peek_byte(&mut self.inner)? else {
            self.state = ArrayState::Truncated;
            return Ok(None);
        };

        if byte == layout::ARRAY_CLOSE {
            self.inner.consume(1);
            self.state = ArrayState::Closed;
            return Ok(None);
        }

        if self.state == ArrayState::AfterElement {
            if byte != layout::ELEMENT_SEPARATOR {
                return Err(DissectError::UnexpectedToken {
                    position: self.position,
                    found: char::from(byte),
                });
            }
            self.inner.consume(1);
        }

        self.position += 1;
        let mut de = serde_json::Deserializer::from_reader(&mut self.inner);
        let record =
            DissectedPacketRecord::deserialize(&mut de).map_err(|source| DissectError::Decode {
                position: self.position,
                source,
            })?;
        self.state = ArrayState::AfterElement;
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for PacketArrayReader<R> {
    type Item = Result<DissectedPacketRecord, DissectError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(
            self.state,
            ArrayState::Closed | ArrayState::Truncated | ArrayState::Failed
        ) {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.state = ArrayState::Failed;
                Some(Err(err))
            }
        }
    }
}

/// Peek at the next byte without consuming it.
pub fn peek_byte<R: BufRead>(reader: &mut R) -> Result<Option<u8>, DissectError> {
    let buf = reader.fill_buf()?;
    Ok(buf.first().copied())
}

/// Consume ASCII whitespace, refilling the buffer as needed.
pub fn skip_whitespace<R: BufRead>(reader: &mut R) -> Result<(), DissectError> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(());
        }
        let skipped = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        let exhausted = skipped == buf.len();
        reader.consume(skipped);
        if !exhausted {
            return Ok(());
        }
    }
}
