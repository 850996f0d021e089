//! Newline-delimited JSON-RPC framing.
//!
//! [`RpcCodec`] wraps [`tokio_util::codec::LinesCodec`] with a configurable
//! maximum line length and decodes each line straight into a [`Message`].
//! Decoding is defensive: a line that is not a valid JSON-RPC message, is
//! not UTF-8, or exceeds the length limit yields `Ok(Some(Err(..)))` so the
//! surrounding [`FramedRead`](tokio_util::codec::FramedRead) keeps running.
//! Only real I/O failures surface as decoder errors.
//!
//! [`Framer`] drives the same codec over caller-supplied chunks for code that
//! does not own an `AsyncRead`.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::rpc::message::Message;
use crate::{ClientError, Result};

/// Default maximum accepted line length: 16 MiB.
///
/// Aggregated command output and cumulative diffs travel inline, so the
/// limit is generous; it only guards against a peer that never sends `\n`.
pub const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Result of decoding one wire unit: a message or a non-fatal framing error.
pub type Frame = Result<Message>;

/// NDJSON codec for JSON-RPC messages.
#[derive(Debug)]
pub struct RpcCodec {
    lines: LinesCodec,
    max_line_bytes: usize,
}

impl RpcCodec {
    /// Create a codec with [`DEFAULT_MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_bytes),
            max_line_bytes,
        }
    }

    fn map_line(&self, decoded: std::result::Result<Option<String>, LinesCodecError>) -> DecodeStep {
        match decoded {
            Ok(None) => DecodeStep::NeedMore,
            Ok(Some(line)) if line.trim().is_empty() => DecodeStep::Skip,
            Ok(Some(line)) => DecodeStep::Frame(Message::parse(line.trim_end_matches('\r'))),
            Err(LinesCodecError::MaxLineLengthExceeded) => DecodeStep::Frame(Err(
                ClientError::Framing(format!("line too long: exceeded {} bytes", self.max_line_bytes)),
            )),
            Err(LinesCodecError::Io(err)) if err.kind() == std::io::ErrorKind::InvalidData => {
                DecodeStep::Frame(Err(ClientError::Framing(format!("invalid utf-8: {err}"))))
            }
            Err(LinesCodecError::Io(err)) => DecodeStep::Fatal(ClientError::Io(err.to_string())),
        }
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

enum DecodeStep {
    NeedMore,
    Skip,
    Frame(Frame),
    Fatal(ClientError),
}

impl Decoder for RpcCodec {
    type Item = Frame;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let step = self.lines.decode(src);
            match self.map_line(step) {
                DecodeStep::NeedMore => return Ok(None),
                DecodeStep::Skip => {}
                DecodeStep::Frame(frame) => return Ok(Some(frame)),
                DecodeStep::Fatal(err) => return Err(err),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let step = self.lines.decode_eof(src);
            match self.map_line(step) {
                DecodeStep::NeedMore => return Ok(None),
                DecodeStep::Skip => {}
                DecodeStep::Frame(frame) => return Ok(Some(frame)),
                DecodeStep::Fatal(err) => return Err(err),
            }
        }
    }
}

impl<'a> Encoder<&'a Message> for RpcCodec {
    type Error = ClientError;

    /// Encode `item` as one `\n`-terminated line. The length limit applies
    /// to decoding only.
    fn encode(&mut self, item: &'a Message, dst: &mut BytesMut) -> Result<()> {
        let line = item.to_json()?;
        dst.reserve(line.len() + 1);
        dst.put(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Serialize one message into its wire form (JSON plus `\n`).
///
/// # Errors
///
/// Returns [`ClientError::Protocol`] if serialization fails.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    RpcCodec::new().encode(message, &mut buf)?;
    Ok(buf.to_vec())
}

/// Incremental decoder over caller-supplied byte chunks.
///
/// Chunk boundaries never affect the decoded sequence: an incomplete trailing
/// fragment is buffered until the next [`feed`](Self::feed) or flushed by
/// [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct Framer {
    codec: RpcCodec,
    buffer: BytesMut,
}

impl Framer {
    /// Create a framer with [`DEFAULT_MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a framer with a custom line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            codec: RpcCodec::with_max_line_bytes(max_line_bytes),
            buffer: BytesMut::new(),
        }
    }

    /// Consume `chunk` and return every unit it completes.
    ///
    /// # Errors
    ///
    /// Never fails for in-memory input; the `Result` mirrors the codec.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.codec.decode(&mut self.buffer)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Flush the buffered remainder at end of input as one final unit.
    ///
    /// # Errors
    ///
    /// Never fails for in-memory input; the `Result` mirrors the codec.
    pub fn finish(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.codec.decode_eof(&mut self.buffer)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered bytes not yet forming a complete unit.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
