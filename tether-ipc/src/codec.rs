//! Wire framings for JSON documents

use bytes::BytesMut;
use tether_config::Framing;
use tether_json::{Document, DEFAULT_SEPARATOR};

use crate::error::IpcError;

/// Line terminator written after every line-framed message
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Encoder/decoder for one framing variant.
///
/// `decode` consumes the bytes of at most one frame from the front of `src`
/// and returns `Ok(None)` when no complete frame is buffered yet. A frame that
/// fails to parse is consumed and reported as an error, so the caller can log
/// it and keep decoding.
pub trait FrameCodec: Send + Sync {
    fn encode(&self, document: &Document, dst: &mut BytesMut) -> Result<(), IpcError>;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Document>, IpcError>;
}

/// Default for the largest frame a decoder buffers
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Codec for the configured framing
pub fn codec_for(framing: Framing, max_frame_size: usize) -> Box<dyn FrameCodec> {
    match framing {
        Framing::Line => Box::new(LineCodec::new(max_frame_size)),
        Framing::Concatenated => Box::new(BraceCodec::new(max_frame_size)),
    }
}

/// Parse one frame; flattened `a:b` keys are nested on the way in
fn decode_frame(raw: &[u8]) -> Result<Document, IpcError> {
    let mut document = Document::from_bytes(raw)?;
    document.nest(DEFAULT_SEPARATOR)?;
    Ok(document)
}

/// One compact JSON object per line
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_frame_size: usize,
    scanned: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.max(1),
            scanned: 0,
            discarding: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec for LineCodec {
    fn encode(&self, document: &Document, dst: &mut BytesMut) -> Result<(), IpcError> {
        dst.extend_from_slice(&document.to_bytes()?);
        dst.extend_from_slice(LINE_TERMINATOR);
        Ok(())
    }

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Document>, IpcError> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|byte| *byte == b'\n') else {
                if self.discarding {
                    src.clear();
                    self.scanned = 0;
                    return Ok(None);
                }
                if src.len() > self.max_frame_size {
                    let size = src.len();
                    src.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Err(IpcError::FrameTooLarge {
                        size,
                        limit: self.max_frame_size,
                    });
                }
                self.scanned = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > self.max_frame_size {
                return Err(IpcError::FrameTooLarge {
                    size: line.len(),
                    limit: self.max_frame_size,
                });
            }
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return decode_frame(line).map(Some);
        }
    }
}

/// Objects written back to back with no delimiter.
///
/// A frame ends where the braces opened by its first `{` are balanced again.
/// Braces inside JSON strings are not counted. Bytes between frames are
/// skipped; anything other than whitespace there is reported. An object
/// growing past the frame limit is dropped as it streams in.
#[derive(Debug, Clone)]
pub struct BraceCodec {
    max_frame_size: usize,
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    discarding: bool,
}

impl Default for BraceCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl BraceCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.max(1),
            scanned: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            discarding: false,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.max_frame_size);
    }

    /// Drop bytes in front of the next `{`
    fn skip_to_object(&mut self, src: &mut BytesMut) -> Result<(), IpcError> {
        let start = src.iter().position(|byte| *byte == b'{').unwrap_or(src.len());
        if start == 0 {
            return Ok(());
        }
        let skipped = src.split_to(start);
        if skipped.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        Err(IpcError::InvalidMessage(format!(
            "discarded {} bytes outside of any object",
            skipped.len()
        )))
    }
}

impl FrameCodec for BraceCodec {
    fn encode(&self, document: &Document, dst: &mut BytesMut) -> Result<(), IpcError> {
        dst.extend_from_slice(&document.to_bytes()?);
        Ok(())
    }

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Document>, IpcError> {
        if self.depth == 0 {
            self.reset();
            self.skip_to_object(src)?;
        }

        while self.scanned < src.len() {
            let byte = src[self.scanned];
            self.scanned += 1;

            if self.in_string {
                match byte {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        let frame = src.split_to(self.scanned);
                        let discarded = self.discarding;
                        self.reset();
                        if discarded {
                            return self.decode(src);
                        }
                        if frame.len() > self.max_frame_size {
                            return Err(IpcError::FrameTooLarge {
                                size: frame.len(),
                                limit: self.max_frame_size,
                            });
                        }
                        return decode_frame(&frame).map(Some);
                    }
                }
                _ => {}
            }
        }

        if self.discarding {
            let _ = src.split_to(self.scanned);
            self.scanned = 0;
        } else if self.scanned > self.max_frame_size {
            let size = self.scanned;
            let _ = src.split_to(self.scanned);
            self.scanned = 0;
            self.discarding = true;
            return Err(IpcError::FrameTooLarge {
                size,
                limit: self.max_frame_size,
            });
        }

        Ok(None)
    }
}
