//! Datagram wire format for the UDP engine.
//!
//! One frame per datagram: `[opcode: u8][body]`.
//!
//! | opcode | frame     | body                                   |
//! |--------|-----------|----------------------------------------|
//! | `0x01` | HELLO     | empty                                  |
//! | `0x02` | DATA      | `[channel: u8][payload]`               |
//! | `0x03` | BYE       | empty                                  |
//! | `0x04` | WELCOME   | `[session id: u32 little-endian]`      |

use crate::error::TransportError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use peerlink_core::SessionId;

const OP_HELLO: u8 = 0x01;
const OP_DATA: u8 = 0x02;
const OP_BYE: u8 = 0x03;
const OP_WELCOME: u8 = 0x04;

/// Largest datagram the engine sends or accepts.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Peer asks to connect.
    Hello,
    /// Application payload.
    Data {
        /// Channel the payload travels on.
        channel: u8,
        /// Payload bytes.
        payload: Bytes,
    },
    /// Either side closes the session.
    Bye,
    /// Server accepts a peer and tells it its session ID.
    Welcome {
        /// Session ID assigned to the peer.
        session_id: SessionId,
    },
}

impl Frame {
    /// Encodes the frame into `dst`.
    ///
    /// # Errors
    /// Returns [`TransportError::FrameTooLarge`] if the frame does not fit
    /// in one datagram.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), TransportError> {
        let len = self.encoded_len();
        if len > MAX_DATAGRAM {
            return Err(TransportError::frame_too_large(len, MAX_DATAGRAM));
        }
        dst.reserve(len);

        match self {
            Self::Hello => dst.put_u8(OP_HELLO),
            Self::Data { channel, payload } => {
                dst.put_u8(OP_DATA);
                dst.put_u8(*channel);
                dst.put_slice(payload);
            }
            Self::Bye => dst.put_u8(OP_BYE),
            Self::Welcome { session_id } => {
                dst.put_u8(OP_WELCOME);
                dst.put_u32_le(*session_id);
            }
        }
        Ok(())
    }

    /// Decodes one datagram.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidFrame`] for empty, truncated or
    /// unknown datagrams.
    pub fn decode(datagram: &[u8]) -> Result<Self, TransportError> {
        let mut src = datagram;
        if !src.has_remaining() {
            return Err(TransportError::invalid_frame("empty datagram"));
        }

        match src.get_u8() {
            OP_HELLO => Ok(Self::Hello),
            OP_DATA => {
                if !src.has_remaining() {
                    return Err(TransportError::invalid_frame("data frame without channel"));
                }
                let channel = src.get_u8();
                Ok(Self::Data {
                    channel,
                    payload: Bytes::copy_from_slice(src),
                })
            }
            OP_BYE => Ok(Self::Bye),
            OP_WELCOME => {
                if src.remaining() < 4 {
                    return Err(TransportError::invalid_frame("truncated welcome frame"));
                }
                Ok(Self::Welcome {
                    session_id: src.get_u32_le(),
                })
            }
            op => Err(TransportError::invalid_frame(format!(
                "unknown opcode {op:#04x}"
            ))),
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Hello | Self::Bye => 1,
            Self::Data { payload, .. } => 2 + payload.len(),
            Self::Welcome { .. } => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_data_layout() {
        let buf = encode(&Frame::Data {
            channel: 3,
            payload: Bytes::from_static(b"ping"),
        });
        assert_eq!(&buf[..], &[0x02, 3, b'p', b'i', b'n', b'g']);
    }

    #[test]
    fn test_welcome_layout() {
        let buf = encode(&Frame::Welcome { session_id: 0x0102_0304 });
        assert_eq!(&buf[..], &[0x04, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(
            Frame::decode(&buf).unwrap(),
            Frame::Welcome { session_id: 0x0102_0304 }
        );
    }

    #[test]
    fn test_data_with_empty_payload() {
        let frame = Frame::decode(&[0x02, 9]).unwrap();
        assert_eq!(
            frame,
            Frame::Data {
                channel: 9,
                payload: Bytes::new(),
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Frame::decode(&[]).is_err());
        assert!(Frame::decode(&[0x02]).is_err());
        assert!(Frame::decode(&[0x04, 1, 2]).is_err());

        let err = Frame::decode(&[0x7f]).unwrap_err();
        assert_eq!(err.to_string(), "invalid frame: unknown opcode 0x7f");
    }

    #[test]
    fn test_encode_too_large() {
        let frame = Frame::Data {
            channel: 0,
            payload: Bytes::from(vec![0u8; MAX_DATAGRAM]),
        };
        let mut buf = BytesMut::new();
        assert!(matches!(
            frame.encode(&mut buf),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}
