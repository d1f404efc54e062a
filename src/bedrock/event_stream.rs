// AWS event-stream framing (application/vnd.amazon.eventstream), decode side.
//
// Frame: total_len u32 | headers_len u32 | prelude_crc u32 | headers | payload | message_crc u32
// All integers big-endian; both CRCs are CRC-32 (IEEE).

use bytes::{Buf, Bytes, BytesMut};

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventStreamError {
    #[error("prelude checksum mismatch (expected {expected:#010x}, got {actual:#010x})")]
    PreludeChecksum { expected: u32, actual: u32 },

    #[error("message checksum mismatch (expected {expected:#010x}, got {actual:#010x})")]
    MessageChecksum { expected: u32, actual: u32 },

    #[error("invalid frame length {total} (headers {headers})")]
    FrameLength { total: usize, headers: usize },

    #[error("malformed header: {0}")]
    Header(String),

    #[error("stream ended inside a frame ({0} bytes left)")]
    Truncated(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Bytes(Bytes),
    String(String),
    /// Milliseconds since the epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Bytes,
}

impl Message {
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        match self.header(name)? {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// `:message-type` ("event", "exception" or "error").
    pub fn message_type(&self) -> Option<&str> {
        self.header_str(":message-type")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }

    pub fn exception_type(&self) -> Option<&str> {
        self.header_str(":exception-type")
    }
}

/// Incremental decoder: feed body chunks as they arrive, pull complete messages.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buffer: BytesMut,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete message, `Ok(None)` when more bytes are needed.
    pub fn next_message(&mut self) -> Result<Option<Message>, EventStreamError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let mut prelude = &self.buffer[..PRELUDE_LEN];
        let total = prelude.get_u32() as usize;
        let headers = prelude.get_u32() as usize;
        let prelude_crc = prelude.get_u32();

        let actual = crc32fast::hash(&self.buffer[..8]);
        if actual != prelude_crc {
            return Err(EventStreamError::PreludeChecksum {
                expected: prelude_crc,
                actual,
            });
        }
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total) || headers > total - MIN_FRAME_LEN {
            return Err(EventStreamError::FrameLength { total, headers });
        }
        if self.buffer.len() < total {
            return Ok(None);
        }

        let frame = self.buffer.split_to(total).freeze();
        let body_end = total - CRC_LEN;
        let message_crc = (&frame[body_end..]).get_u32();
        let actual = crc32fast::hash(&frame[..body_end]);
        if actual != message_crc {
            return Err(EventStreamError::MessageChecksum {
                expected: message_crc,
                actual,
            });
        }

        let header_end = PRELUDE_LEN + headers;
        Ok(Some(Message {
            headers: parse_headers(frame.slice(PRELUDE_LEN..header_end))?,
            payload: frame.slice(header_end..body_end),
        }))
    }

    /// Fails when the stream stopped mid-frame.
    pub fn finish(&self) -> Result<(), EventStreamError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(EventStreamError::Truncated(self.buffer.len()))
        }
    }
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<(), EventStreamError> {
    if buf.remaining() < n {
        return Err(EventStreamError::Header(format!(
            "{what}: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn parse_headers(mut buf: Bytes) -> Result<Vec<(String, HeaderValue)>, EventStreamError> {
    let mut headers = Vec::new();
    while buf.has_remaining() {
        let name_len = buf.get_u8() as usize;
        need(&buf, name_len + 1, "header name")?;
        let name = String::from_utf8(buf.split_to(name_len).to_vec())
            .map_err(|e| EventStreamError::Header(format!("header name: {e}")))?;
        let value = match buf.get_u8() {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => {
                need(&buf, 1, &name)?;
                HeaderValue::Byte(buf.get_i8())
            }
            3 => {
                need(&buf, 2, &name)?;
                HeaderValue::Int16(buf.get_i16())
            }
            4 => {
                need(&buf, 4, &name)?;
                HeaderValue::Int32(buf.get_i32())
            }
            5 => {
                need(&buf, 8, &name)?;
                HeaderValue::Int64(buf.get_i64())
            }
            6 => {
                need(&buf, 2, &name)?;
                let len = buf.get_u16() as usize;
                need(&buf, len, &name)?;
                HeaderValue::Bytes(buf.split_to(len))
            }
            7 => {
                need(&buf, 2, &name)?;
                let len = buf.get_u16() as usize;
                need(&buf, len, &name)?;
                let raw = buf.split_to(len);
                HeaderValue::String(
                    String::from_utf8(raw.to_vec())
                        .map_err(|e| EventStreamError::Header(format!("{name}: {e}")))?,
                )
            }
            8 => {
                need(&buf, 8, &name)?;
                HeaderValue::Timestamp(buf.get_i64())
            }
            9 => {
                need(&buf, 16, &name)?;
                let mut uuid = [0u8; 16];
                buf.copy_to_slice(&mut uuid);
                HeaderValue::Uuid(uuid)
            }
            other => {
                return Err(EventStreamError::Header(format!(
                    "{name}: unknown value type {other}"
                )));
            }
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// Frame encoder used by the unit tests.
#[cfg(test)]
pub(crate) fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    use bytes::BufMut;

    let mut header_bytes = BytesMut::new();
    for (name, value) in headers {
        header_bytes.put_u8(name.len() as u8);
        header_bytes.put_slice(name.as_bytes());
        header_bytes.put_u8(7);
        header_bytes.put_u16(value.len() as u16);
        header_bytes.put_slice(value.as_bytes());
    }
    let total = MIN_FRAME_LEN + header_bytes.len() + payload.len();
    let mut out = BytesMut::with_capacity(total);
    out.put_u32(total as u32);
    out.put_u32(header_bytes.len() as u32);
    let prelude_crc = crc32fast::hash(&out[..8]);
    out.put_u32(prelude_crc);
    out.put_slice(&header_bytes);
    out.put_slice(payload);
    let message_crc = crc32fast::hash(&out);
    out.put_u32(message_crc);
    out.to_vec()
}
