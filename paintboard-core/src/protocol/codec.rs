//! Fixed-size frame codec.
//!
//! Frames carry no length prefix: the leading opcode determines the
//! size. Each inbound transmission is decoded on its own, so a frame
//! that runs past the end of its transmission is a protocol error
//! rather than something to buffer for later.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::PaintError;
use crate::protocol::{
    MAX_OWNER_ID, OP_PAINT, OP_PAINT_RESULT, OP_PING, OP_PONG, Outcome, PAINT_FRAME_LEN, Point,
    RESULT_FRAME_LEN, Rgb,
};

// ── PaintRequest ─────────────────────────────────────────────────

/// One "paint this pixel" request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintRequest {
    owner_id: u32,
    credential: [u8; 16],
    point: Point,
    color: Rgb,
    request_id: u32,
}

impl PaintRequest {
    /// Build a request, rejecting owner ids wider than the 3-byte field.
    pub fn new(
        owner_id: u32,
        credential: [u8; 16],
        point: Point,
        color: Rgb,
        request_id: u32,
    ) -> Result<Self, PaintError> {
        if owner_id > MAX_OWNER_ID {
            return Err(PaintError::InvalidRequest("owner id exceeds 24 bits"));
        }
        Ok(Self {
            owner_id,
            credential,
            point,
            color,
            request_id,
        })
    }

    pub fn owner_id(&self) -> u32 {
        self.owner_id
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Append the 31-byte wire frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(PAINT_FRAME_LEN);
        dst.put_u8(OP_PAINT);
        dst.put_u16_le(self.point.x);
        dst.put_u16_le(self.point.y);
        dst.put_slice(&[self.color.r, self.color.g, self.color.b]);
        dst.put_uint_le(u64::from(self.owner_id), 3);
        dst.put_slice(&self.credential);
        dst.put_u32_le(self.request_id);
    }

    /// Encode into a standalone frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PAINT_FRAME_LEN);
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

/// The heartbeat reply frame.
pub fn pong() -> Bytes {
    Bytes::from_static(&[OP_PONG])
}

/// Encode a server-side paint result frame.
///
/// The client never sends this; loopback servers use it to answer.
pub fn encode_result(request_id: u32, outcome: Outcome) -> Bytes {
    let mut buf = BytesMut::with_capacity(RESULT_FRAME_LEN);
    buf.put_u8(OP_PAINT_RESULT);
    buf.put_u32_le(request_id);
    buf.put_u8(outcome.code());
    buf.freeze()
}

// ── InboundFrame ─────────────────────────────────────────────────

/// A decoded server → client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame {
    /// Heartbeat; must be answered with a pong.
    Ping,
    /// Result for a previously submitted request.
    PaintResult { request_id: u32, outcome: Outcome },
}

// ── PaintCodec ───────────────────────────────────────────────────

/// `tokio_util` codec for the paintboard protocol.
///
/// Tracks how many bytes it has consumed so desync errors can report
/// where in the transmission decoding stopped.
#[derive(Debug, Default)]
pub struct PaintCodec {
    offset: usize,
}

impl PaintCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes consumed since construction.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Decoder for PaintCodec {
    type Item = InboundFrame;
    type Error = PaintError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&opcode) = src.first() else {
            return Ok(None);
        };

        match opcode {
            OP_PING => {
                src.advance(1);
                self.offset += 1;
                Ok(Some(InboundFrame::Ping))
            }
            OP_PAINT_RESULT => {
                if src.len() < RESULT_FRAME_LEN {
                    return Ok(None);
                }
                src.advance(1);
                let request_id = src.get_u32_le();
                let outcome = Outcome::from(src.get_u8());
                self.offset += RESULT_FRAME_LEN;
                Ok(Some(InboundFrame::PaintResult {
                    request_id,
                    outcome,
                }))
            }
            other => Err(PaintError::ProtocolDesync {
                opcode: other,
                offset: self.offset,
            }),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(PaintError::TruncatedFrame {
                opcode: buf[0],
                needed: RESULT_FRAME_LEN,
                remaining: buf.len(),
            }),
        }
    }
}

impl Encoder<PaintRequest> for PaintCodec {
    type Error = PaintError;

    fn encode(&mut self, item: PaintRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

// ── Frames ───────────────────────────────────────────────────────

/// Lazy iterator over the frames of one inbound transmission.
///
/// Yields at most one error, after which iteration stops: the rest of
/// the transmission cannot be re-synchronized.
#[derive(Debug)]
pub struct Frames {
    buf: BytesMut,
    codec: PaintCodec,
    done: bool,
}

impl Frames {
    pub fn new(transmission: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(transmission),
            codec: PaintCodec::new(),
            done: false,
        }
    }
}

impl Iterator for Frames {
    type Item = Result<InboundFrame, PaintError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.codec.decode_eof(&mut self.buf) {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.buf.clear();
                Some(Err(e))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
