//! Wire format for manager/worker connections.
//!
//! Every frame is a one-byte kind tag, a big-endian `u32` payload length, and
//! the payload itself:
//!
//! ```text
//! +------+----------------+---------------------+
//! | kind | length (u32 BE)| payload (length B)  |
//! +------+----------------+---------------------+
//! ```
//!
//! Payloads are MessagePack. The `Shutdown` sentinel carries no payload, so it
//! can never be mistaken for a task regardless of what the application's task
//! type looks like.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::DispatchError;
use crate::task::WorkerId;

/// Bytes of framing before each payload.
pub const HEADER_LEN: usize = 5;

/// Default upper bound on a single frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Discriminant carried in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Manager → worker, once, first: the worker's id.
    Assign = 1,
    /// Manager → worker: one encoded task.
    Task = 2,
    /// Worker → manager: the result of the last task.
    Result = 3,
    /// Manager → worker, once, last: no further work.
    Shutdown = 4,
}

impl FrameKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = DispatchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Assign),
            2 => Ok(Self::Task),
            3 => Ok(Self::Result),
            4 => Ok(Self::Shutdown),
            other => Err(DispatchError::UnknownFrameKind(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Assign => "assign",
            Self::Task => "task",
            Self::Result => "result",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// One undecoded frame: kind tag plus raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Length-prefixed codec for [`Frame`]s.
///
/// Rejects payloads above `max_payload` in both directions so a corrupt or
/// hostile length prefix cannot make the reader allocate without bound.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = DispatchError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, DispatchError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let kind = FrameKind::try_from(src[0])?;
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_payload {
            return Err(DispatchError::FrameTooLarge {
                len,
                limit: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame { kind, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = DispatchError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), DispatchError> {
        let len = frame.payload.len();
        if len > self.max_payload || len > u32::MAX as usize {
            return Err(DispatchError::FrameTooLarge {
                len,
                limit: self.max_payload,
            });
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u8(frame.kind.as_u8());
        dst.put_u32(len as u32);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

/// Typed view of a frame for task type `T` and result type `R`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message<T, R> {
    Assign(WorkerId),
    Task(T),
    Result(R),
    Shutdown,
}

impl<T, R> Message<T, R> {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Assign(_) => FrameKind::Assign,
            Self::Task(_) => FrameKind::Task,
            Self::Result(_) => FrameKind::Result,
            Self::Shutdown => FrameKind::Shutdown,
        }
    }
}

impl<T: Serialize, R: Serialize> Message<T, R> {
    /// Encode the payload with MessagePack and wrap it in a frame.
    pub fn to_frame(&self) -> Result<Frame, DispatchError> {
        let payload = match self {
            Self::Assign(id) => rmp_serde::to_vec(id)?,
            Self::Task(task) => rmp_serde::to_vec(task)?,
            Self::Result(result) => rmp_serde::to_vec(result)?,
            Self::Shutdown => Vec::new(),
        };
        Ok(Frame::new(self.kind(), payload))
    }
}

impl<T: DeserializeOwned, R: DeserializeOwned> Message<T, R> {
    /// Decode a frame's payload according to its kind tag.
    pub fn from_frame(frame: &Frame) -> Result<Self, DispatchError> {
        let bytes = frame.payload.as_ref();
        match frame.kind {
            FrameKind::Assign => Ok(Self::Assign(rmp_serde::from_slice(bytes)?)),
            FrameKind::Task => Ok(Self::Task(rmp_serde::from_slice(bytes)?)),
            FrameKind::Result => Ok(Self::Result(rmp_serde::from_slice(bytes)?)),
            FrameKind::Shutdown if bytes.is_empty() => Ok(Self::Shutdown),
            FrameKind::Shutdown => Err(DispatchError::Protocol(format!(
                "shutdown frame carried {} payload bytes",
                bytes.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        index: u32,
        scale: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct RowOut {
        index: u32,
        values: Vec<u32>,
    }

    type Msg = Message<Row, RowOut>;

    fn encode(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::default().encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn header_layout() {
        let buf = encode(Frame::new(FrameKind::Result, vec![0xaa, 0xbb, 0xcc]));
        assert_eq!(&buf[..], &[3, 0, 0, 0, 3, 0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn shutdown_is_header_only() {
        let frame = Msg::Shutdown.to_frame().unwrap();
        assert_eq!(&encode(frame)[..], &[4, 0, 0, 0, 0]);
    }

    #[test]
    fn task_roundtrip_through_codec() {
        let task = Row {
            index: 12,
            scale: -0.25,
        };
        let mut buf = encode(Msg::Task(task.clone()).to_frame().unwrap());

        let frame = FrameCodec::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.kind, FrameKind::Task);
        assert_eq!(Msg::from_frame(&frame).unwrap(), Msg::Task(task));
        assert!(buf.is_empty());
    }

    #[test]
    fn result_roundtrip_through_codec() {
        let result = RowOut {
            index: 3,
            values: vec![0, 1, 200, 7],
        };
        let mut buf = encode(Msg::Result(result.clone()).to_frame().unwrap());

        let frame = FrameCodec::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(Msg::from_frame(&frame).unwrap(), Msg::Result(result));
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let full = encode(Msg::Assign(WorkerId(9)).to_frame().unwrap());
        let mut codec = FrameCodec::default();

        let mut partial = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[3..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[full.len() - 1..]);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(Msg::from_frame(&frame).unwrap(), Msg::Assign(WorkerId(9)));
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut buf = encode(Msg::Assign(WorkerId(0)).to_frame().unwrap());
        buf.extend_from_slice(&encode(Msg::Shutdown.to_frame().unwrap()));

        let mut codec = FrameCodec::default();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.kind, FrameKind::Assign);
        assert_eq!(second.kind, FrameKind::Shutdown);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut buf = BytesMut::from(&[0x7f, 0, 0, 0, 0][..]);
        match FrameCodec::default().decode(&mut buf) {
            Err(DispatchError::UnknownFrameKind(0x7f)) => {}
            other => panic!("expected UnknownFrameKind, got {other:?}"),
        }
    }

    #[test]
    fn oversized_length_is_rejected_before_buffering() {
        let mut buf = BytesMut::from(&[2, 0, 0, 1, 0][..]);
        match FrameCodec::new(128).decode(&mut buf) {
            Err(DispatchError::FrameTooLarge { len: 256, limit: 128 }) => {}
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn oversized_payload_is_not_encoded() {
        let mut buf = BytesMut::new();
        let result = FrameCodec::new(2).encode(Frame::new(FrameKind::Task, vec![0; 3]), &mut buf);
        assert!(matches!(result, Err(DispatchError::FrameTooLarge { len: 3, limit: 2 })));
        assert!(buf.is_empty());
    }

    #[test]
    fn shutdown_with_payload_is_a_protocol_error() {
        let frame = Frame::new(FrameKind::Shutdown, vec![1]);
        assert!(matches!(
            Msg::from_frame(&frame),
            Err(DispatchError::Protocol(_))
        ));
    }

    #[test]
    fn result_bytes_do_not_decode_as_task() {
        let frame = Msg::Result(RowOut {
            index: 1,
            values: vec![],
        })
        .to_frame()
        .unwrap();
        let retagged = Frame::new(FrameKind::Task, frame.payload);
        assert!(matches!(
            Msg::from_frame(&retagged),
            Err(DispatchError::Deserialization(_))
        ));
    }
}
