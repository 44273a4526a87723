//! Streaming envelope framing.
//!
//! Every message in either direction travels in an envelope:
//!
//! ```text
//! [flags:1][length:4][payload:length]
//! ```
//!
//! The last frame of a response carries the `END_STREAM` flag and a JSON
//! payload holding the terminal status.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{EnvelopeError, ErrorResponseBody, Status};

/// Envelope flags.
pub mod envelope_flags {
    /// Regular message.
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message. Compression is not supported; receiving it is an error.
    pub const COMPRESSED: u8 = 0x01;
    /// End of stream.
    pub const END_STREAM: u8 = 0x02;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// One decoded envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A message payload, still encoded.
    Message(Bytes),
    /// End of stream, carrying the terminal status of the call.
    End(Status),
}

/// Wrap payload in an envelope with the given flags.
pub fn wrap_envelope(payload: &[u8], flags: u8) -> Bytes {
    let mut frame = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&[flags]);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame.freeze()
}

/// Wrap an encoded message in a message envelope.
pub fn message_frame(payload: &[u8]) -> Bytes {
    wrap_envelope(payload, envelope_flags::MESSAGE)
}

/// Build the end-of-stream frame for a terminal status.
///
/// Success is encoded as `{}`, failure as `{"error":{"code":..,"message":..}}`.
pub fn end_stream_frame(status: &Status) -> Bytes {
    let json = if status.is_ok() {
        serde_json::json!({})
    } else {
        serde_json::json!({ "error": status })
    };
    wrap_envelope(json.to_string().as_bytes(), envelope_flags::END_STREAM)
}

#[derive(serde::Deserialize)]
struct EndStreamBody {
    #[serde(default)]
    error: Option<ErrorResponseBody>,
}

/// Parse the payload of an end-of-stream frame into the terminal status.
pub fn parse_end_stream(payload: &[u8]) -> Result<Status, EnvelopeError> {
    if payload.is_empty() {
        return Ok(Status::ok());
    }
    let body: EndStreamBody = serde_json::from_slice(payload)
        .map_err(|e| EnvelopeError::MalformedEndStream(e.to_string()))?;
    Ok(body.error.map(Status::from).unwrap_or_else(Status::ok))
}

/// Parse envelope header from bytes.
///
/// Returns `(flags, length)` if successful.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Incremental envelope decoder.
///
/// Transport chunks are pushed in as they arrive; complete frames are pulled
/// out in order. Chunk boundaries need not align with frame boundaries.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_message_size: Option<usize>,
}

impl FrameDecoder {
    /// Create a decoder that rejects frames larger than `max_message_size`.
    pub fn new(max_message_size: Option<usize>) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_message_size,
        }
    }

    /// Append a chunk received from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Try to take the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, EnvelopeError> {
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        let length = length as usize;

        match flags {
            envelope_flags::MESSAGE | envelope_flags::END_STREAM => {}
            other => return Err(EnvelopeError::InvalidFlags(other)),
        }

        if flags == envelope_flags::MESSAGE
            && let Some(max) = self.max_message_size
            && length > max
        {
            return Err(EnvelopeError::MessageTooLarge { size: length, max });
        }

        if self.buffer.len() < ENVELOPE_HEADER_SIZE + length {
            return Ok(None);
        }

        self.buffer.advance(ENVELOPE_HEADER_SIZE);
        let payload = self.buffer.split_to(length).freeze();

        if flags == envelope_flags::END_STREAM {
            return parse_end_stream(&payload).map(|status| Some(Frame::End(status)));
        }
        Ok(Some(Frame::Message(payload)))
    }

    /// Check that the transport ended on a frame boundary.
    pub fn finish(&self) -> Result<(), EnvelopeError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(EnvelopeError::Truncated(self.buffer.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[test]
    fn test_wrap_envelope() {
        let frame = message_frame(b"hello");

        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let result = parse_envelope_header(&[0x00, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(EnvelopeError::IncompleteHeader {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn test_end_stream_success_is_empty_object() {
        let frame = end_stream_frame(&Status::ok());
        assert_eq!(frame[0], envelope_flags::END_STREAM);
        assert_eq!(&frame[5..], b"{}");
    }

    #[test]
    fn test_end_stream_error_payload() {
        let frame = end_stream_frame(&Status::invalid_argument("negative"));
        let json: serde_json::Value = serde_json::from_slice(&frame[5..]).unwrap();

        assert_eq!(json["error"]["code"], "invalid_argument");
        assert_eq!(json["error"]["message"], "negative");
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut wire = message_frame(b"first").to_vec();
        wire.extend_from_slice(&message_frame(b"second"));
        wire.extend_from_slice(&end_stream_frame(&Status::deadline_exceeded("late")));

        let mut decoder = FrameDecoder::new(None);
        let mut frames = Vec::new();
        for chunk in wire.chunks(3) {
            decoder.push(chunk);
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(
            frames,
            vec![
                Frame::Message(Bytes::from_static(b"first")),
                Frame::Message(Bytes::from_static(b"second")),
                Frame::End(Status::deadline_exceeded("late")),
            ]
        );
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_decoder_rejects_compressed_flag() {
        let mut decoder = FrameDecoder::new(None);
        decoder.push(&wrap_envelope(b"zz", envelope_flags::COMPRESSED));
        assert_eq!(
            decoder.next_frame(),
            Err(EnvelopeError::InvalidFlags(envelope_flags::COMPRESSED))
        );
    }

    #[test]
    fn test_decoder_enforces_size_limit_before_buffering() {
        let mut decoder = FrameDecoder::new(Some(4));
        // Header only: the limit is checked as soon as the length is known.
        decoder.push(&[0x00, 0x00, 0x00, 0x00, 0x10]);
        assert_eq!(
            decoder.next_frame(),
            Err(EnvelopeError::MessageTooLarge { size: 16, max: 4 })
        );
    }

    #[test]
    fn test_decoder_reports_truncated_frame() {
        let mut decoder = FrameDecoder::new(None);
        let frame = message_frame(b"hello");
        decoder.push(&frame[..7]);

        assert_eq!(decoder.next_frame(), Ok(None));
        assert_eq!(decoder.finish(), Err(EnvelopeError::Truncated(7)));
    }

    #[test]
    fn test_parse_end_stream() {
        assert_eq!(parse_end_stream(b"{}"), Ok(Status::ok()));
        assert_eq!(parse_end_stream(b""), Ok(Status::ok()));

        let status = parse_end_stream(br#"{"error":{"code":"internal"}}"#).unwrap();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), None);

        assert!(matches!(
            parse_end_stream(b"not json"),
            Err(EnvelopeError::MalformedEndStream(_))
        ));
    }
}
