use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, StrandLinkError};

/// Frame type identifiers used by the sequenced-ack variant.
///
/// 0x01–0x02 open the session, 0x03–0x04 carry data and its
/// acknowledgement, 0x05–0x06 close the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Syn = 0x01,
    SynAck = 0x02,
    Data = 0x03,
    Ack = 0x04,
    Fin = 0x05,
    FinAck = 0x06,
}

impl TryFrom<u8> for FrameType {
    type Error = StrandLinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(FrameType::Syn),
            0x02 => Ok(FrameType::SynAck),
            0x03 => Ok(FrameType::Data),
            0x04 => Ok(FrameType::Ack),
            0x05 => Ok(FrameType::Fin),
            0x06 => Ok(FrameType::FinAck),
            other => Err(StrandLinkError::UnknownFrameType(other)),
        }
    }
}

/// StrandLink wire frame.
///
/// Binary layout (all fields big-endian):
///
/// ```text
/// +-------+----------------------------+
/// | type  |  ... fields per type ...   |
/// | (1B)  |                            |
/// +-------+----------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// SYN: no body
    Syn,
    /// SYN_ACK: no body
    SynAck,
    /// DATA: seq(4) + payload_len(4) + payload(N), N <= `u32::MAX`
    Data { seq: u32, payload: Bytes },
    /// ACK: seq(4)
    Ack { seq: u32 },
    /// FIN: no body
    Fin,
    /// FIN_ACK: no body
    FinAck,
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Syn => FrameType::Syn,
            Frame::SynAck => FrameType::SynAck,
            Frame::Data { .. } => FrameType::Data,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Fin => FrameType::Fin,
            Frame::FinAck => FrameType::FinAck,
        }
    }

    /// Encode this frame into a byte buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.frame_type() as u8);
        match self {
            Frame::Data { seq, payload } => {
                buf.put_u32(*seq);
                debug_assert!(payload.len() <= crate::config::MAX_CHUNK_SIZE);
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
            }
            Frame::Ack { seq } => buf.put_u32(*seq),
            Frame::Syn | Frame::SynAck | Frame::Fin | Frame::FinAck => {}
        }
    }

    /// The total number of bytes this frame will occupy when encoded.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Frame::Data { payload, .. } => 4 + 4 + payload.len(),
            Frame::Ack { .. } => 4,
            Frame::Syn | Frame::SynAck | Frame::Fin | Frame::FinAck => 0,
        }
    }

    /// Decode a frame from the given byte buffer.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let Some((&tag, data)) = data.split_first() else {
            return Err(StrandLinkError::FrameTooShort {
                expected: 1,
                actual: 0,
            });
        };

        match FrameType::try_from(tag)? {
            FrameType::Syn => Ok(Frame::Syn),
            FrameType::SynAck => Ok(Frame::SynAck),
            FrameType::Fin => Ok(Frame::Fin),
            FrameType::FinAck => Ok(Frame::FinAck),
            FrameType::Ack => {
                Self::ensure_len(data, 4)?;
                Ok(Frame::Ack {
                    seq: (&data[0..4]).get_u32(),
                })
            }
            FrameType::Data => {
                Self::ensure_len(data, 8)?;
                let seq = (&data[0..4]).get_u32();
                let payload_len = (&data[4..8]).get_u32() as usize;
                let data = &data[8..];
                Self::ensure_len(data, payload_len)?;
                Ok(Frame::Data {
                    seq,
                    payload: Bytes::copy_from_slice(&data[..payload_len]),
                })
            }
        }
    }

    fn ensure_len(data: &[u8], needed: usize) -> Result<()> {
        if data.len() < needed {
            Err(StrandLinkError::FrameTooShort {
                expected: needed,
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    }
}
