// Length-delimited framing for the relay connection: a 4-byte big-endian
// length prefix followed by one JSON message. Blocking readers use
// `read_frame`; the non-blocking server and client sockets feed raw bytes
// into a `FrameDecoder` and pull complete frames out of it.

use std::io::{self, Read, Write};

/// Upper bound on a single message. Nothing in the protocol comes close; the
/// cap stops a corrupt length prefix from triggering a huge allocation.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

const HEADER_LEN: usize = 4;

pub fn encode_frame(payload: &[u8]) -> io::Result<Vec<u8>> {
    let len = payload.len();
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + len);
    frame.extend_from_slice(&(len as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()
}

/// Returns `UnexpectedEof` if the stream ends before a whole frame arrives.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    check_len(len)?;

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn check_len(len: u32) -> io::Result<()> {
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    Ok(())
}

/// Reassembles frames from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete frame, or `None` if more bytes are needed. An oversized
    /// length prefix is an error; the stream cannot be resynchronised after it.
    pub fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut len_buf = [0u8; HEADER_LEN];
        len_buf.copy_from_slice(&self.buffer[..HEADER_LEN]);
        let len = u32::from_be_bytes(len_buf);
        check_len(len)?;

        let end = HEADER_LEN + len as usize;
        if self.buffer.len() < end {
            return Ok(None);
        }

        let frame = self.buffer[HEADER_LEN..end].to_vec();
        self.buffer.drain(..end);
        Ok(Some(frame))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
