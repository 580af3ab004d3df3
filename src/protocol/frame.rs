//! Request and response frame headers.
//!
//! A request is `RequestHeader ++ meta ++ payload`; a response is
//! `ResponseHeader ++ message ++ body`. Every length is declared up front and
//! checked against the bytes actually present.

use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::{Action, CODE_SUCCESS};
use crate::error::{Error, Result, ServerError};
use crate::protocol::primitive::len_u32;

/// Request header (zero-copy)
///
/// Layout:
/// - action: 2 bytes
/// - req_id: 8 bytes
/// - meta_len: 4 bytes
/// - payload_len: 4 bytes
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct RequestHeader {
    action: U16LE,
    req_id: U64LE,
    meta_len: U32LE,
    payload_len: U32LE,
}

pub const REQUEST_HEADER_LEN: usize = size_of::<RequestHeader>();

impl RequestHeader {
    pub fn encode(action: Action, req_id: u64, meta_len: u32, payload_len: u32) -> Self {
        Self {
            action: U16LE::new(action as u16),
            req_id: U64LE::new(req_id),
            meta_len: U32LE::new(meta_len),
            payload_len: U32LE::new(payload_len),
        }
    }

    pub fn action_code(&self) -> u16 {
        self.action.get()
    }

    pub fn req_id(&self) -> u64 {
        self.req_id.get()
    }

    pub fn meta_len(&self) -> usize {
        self.meta_len.get() as usize
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len.get() as usize
    }
}

/// Encode the fixed request header
pub fn encode_request_header(
    action: Action,
    req_id: u64,
    meta_len: u32,
    payload_len: u32,
) -> [u8; REQUEST_HEADER_LEN] {
    let mut out = [0u8; REQUEST_HEADER_LEN];
    out.copy_from_slice(RequestHeader::encode(action, req_id, meta_len, payload_len).as_bytes());
    out
}

/// An encoded request body awaiting a correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub meta: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(action: Action, meta: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            action,
            meta,
            payload,
        }
    }

    /// Frame this command under `req_id`
    pub fn write(&self, out: &mut Vec<u8>, req_id: u64) -> Result<()> {
        write_request(out, self.action, req_id, &self.meta, &self.payload)
    }
}

/// Write a complete request frame
pub fn write_request(
    out: &mut Vec<u8>,
    action: Action,
    req_id: u64,
    meta: &[u8],
    payload: &[u8],
) -> Result<()> {
    let header = encode_request_header(action, req_id, len_u32(meta.len())?, len_u32(payload.len())?);
    out.reserve(REQUEST_HEADER_LEN + meta.len() + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(meta);
    out.extend_from_slice(payload);
    Ok(())
}

/// A decoded request frame, borrowing the frame bytes
#[derive(Debug)]
pub struct RequestFrame<'a> {
    pub action: Action,
    pub req_id: u64,
    pub meta: &'a [u8],
    pub payload: &'a [u8],
}

/// Decode a request frame; used by servers and test doubles
pub fn decode_request(frame: &[u8]) -> Result<RequestFrame<'_>> {
    let (header, rest) = RequestHeader::ref_from_prefix(frame)
        .map_err(|_| Error::malformed("request shorter than its header"))?;
    let action = Action::from_u16(header.action_code()).ok_or_else(|| {
        Error::MalformedFrame(format!("unknown action 0x{:04X}", header.action_code()))
    })?;
    if header.meta_len() + header.payload_len() != rest.len() {
        return Err(Error::MalformedFrame(format!(
            "request declares {} + {} bytes, frame carries {}",
            header.meta_len(),
            header.payload_len(),
            rest.len()
        )));
    }
    let (meta, payload) = rest.split_at(header.meta_len());
    Ok(RequestFrame {
        action,
        req_id: header.req_id(),
        meta,
        payload,
    })
}

/// Response header (zero-copy)
///
/// Layout:
/// - action: 2 bytes
/// - req_id: 8 bytes
/// - code: 4 bytes
/// - message_len: 4 bytes
/// - body_len: 4 bytes
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct ResponseHeader {
    action: U16LE,
    req_id: U64LE,
    code: U32LE,
    message_len: U32LE,
    body_len: U32LE,
}

pub const RESPONSE_HEADER_LEN: usize = size_of::<ResponseHeader>();

impl ResponseHeader {
    pub fn req_id(&self) -> u64 {
        self.req_id.get()
    }

    pub fn code(&self) -> u32 {
        self.code.get()
    }

    pub fn message_len(&self) -> usize {
        self.message_len.get() as usize
    }

    pub fn body_len(&self) -> usize {
        self.body_len.get() as usize
    }
}

/// A decoded response frame, borrowing the frame bytes
#[derive(Debug)]
pub struct ResponseFrame<'a> {
    pub action: Action,
    pub req_id: u64,
    pub code: u32,
    pub message: &'a [u8],
    pub body: &'a [u8],
}

impl ResponseFrame<'_> {
    pub fn message_lossy(&self) -> String {
        String::from_utf8_lossy(self.message).into_owned()
    }

    /// Split into the body on success or the server's error
    pub fn into_result(self) -> std::result::Result<Response, ServerError> {
        if self.code == CODE_SUCCESS {
            Ok(Response {
                action: self.action,
                req_id: self.req_id,
                body: self.body.to_vec(),
            })
        } else {
            Err(ServerError {
                code: self.code,
                message: self.message_lossy(),
            })
        }
    }
}

/// Decode a response frame header and split message and body
pub fn decode_response(frame: &[u8]) -> Result<ResponseFrame<'_>> {
    let (header, rest) = ResponseHeader::ref_from_prefix(frame)
        .map_err(|_| Error::malformed("response shorter than its header"))?;
    let code = header.action.get();
    let action = Action::from_u16(code)
        .ok_or_else(|| Error::MalformedFrame(format!("unknown action 0x{code:04X}")))?;
    if header.message_len() + header.body_len() != rest.len() {
        return Err(Error::MalformedFrame(format!(
            "response declares {} + {} bytes, frame carries {}",
            header.message_len(),
            header.body_len(),
            rest.len()
        )));
    }
    let (message, body) = rest.split_at(header.message_len());
    Ok(ResponseFrame {
        action,
        req_id: header.req_id(),
        code: header.code(),
        message,
        body,
    })
}

/// Encode a complete response frame; used by servers and test doubles
pub fn encode_response(
    action: Action,
    req_id: u64,
    code: u32,
    message: &str,
    body: &[u8],
) -> Result<Vec<u8>> {
    let header = ResponseHeader {
        action: U16LE::new(action as u16),
        req_id: U64LE::new(req_id),
        code: U32LE::new(code),
        message_len: U32LE::new(len_u32(message.len())?),
        body_len: U32LE::new(len_u32(body.len())?),
    };
    let mut out = Vec::with_capacity(RESPONSE_HEADER_LEN + message.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// A successful reply, owned by the waiting caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub action: Action,
    pub req_id: u64,
    pub body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_sizes() {
        assert_eq!(REQUEST_HEADER_LEN, 18);
        assert_eq!(RESPONSE_HEADER_LEN, 22);
    }

    #[test]
    fn request_header_layout() {
        let header = encode_request_header(Action::BinaryQuery, 0x1, 6, 21);
        assert_eq!(
            header.to_vec(),
            vec![
                0x06, 0x00, // action
                0x01, 0, 0, 0, 0, 0, 0, 0, // req_id
                0x06, 0, 0, 0, // meta_len
                0x15, 0, 0, 0, // payload_len
            ]
        );
    }

    #[test]
    fn request_frame_decodes() {
        let mut out = Vec::new();
        write_request(&mut out, Action::Fetch, 42, &[1, 2, 3], b"abc").unwrap();
        let frame = decode_request(&out).unwrap();
        assert_eq!(frame.action, Action::Fetch);
        assert_eq!(frame.req_id, 42);
        assert_eq!(frame.meta, &[1, 2, 3]);
        assert_eq!(frame.payload, b"abc");
    }

    #[test]
    fn response_decodes_error_status() {
        let bytes = encode_response(Action::BinaryQuery, 9, 0x2603, "Table does not exist", &[])
            .unwrap();
        let frame = decode_response(&bytes).unwrap();
        assert_eq!(frame.req_id, 9);
        assert_eq!(frame.code, 0x2603);
        let err = frame.into_result().unwrap_err();
        assert_eq!(err.message, "Table does not exist");
    }

    #[test]
    fn response_length_mismatch_is_malformed() {
        let mut bytes = encode_response(Action::Fetch, 1, 0, "", &[1, 2, 3, 4]).unwrap();
        bytes.pop();
        assert!(matches!(decode_response(&bytes), Err(Error::MalformedFrame(_))));
        bytes.extend_from_slice(&[4, 5]);
        assert!(matches!(decode_response(&bytes), Err(Error::MalformedFrame(_))));
        assert!(matches!(
            decode_response(&bytes[..10]),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn unknown_action_is_malformed() {
        let mut bytes = encode_response(Action::Fetch, 1, 0, "", &[]).unwrap();
        bytes[0] = 0xEE;
        assert!(matches!(decode_response(&bytes), Err(Error::MalformedFrame(_))));
    }
}
