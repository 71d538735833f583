//! Frame codec for the storage protocol.
//!
//! # Frame Format
//!
//! Each frame consists of:
//! - 4 bytes: length of (code + payload), big-endian
//! - 1 byte: operation or status code
//! - N bytes: payload
//!
//! The declared length is checked against the configured maximum before any
//! payload byte is read, so a reader never buffers more than one bounded
//! frame. File content travels as a sequence of DATA frames rather than one
//! large frame.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Frame header size: 4 (length) + 1 (code) = 5 bytes.
pub const FRAME_HEADER_SIZE: usize = 5;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Operation code for requests, status code for responses.
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(code: u8, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    /// Create a frame with no payload.
    pub fn empty(code: u8) -> Self {
        Self {
            code,
            payload: Vec::new(),
        }
    }

    /// Value written into the length prefix.
    pub fn wire_length(&self) -> usize {
        1 + self.payload.len()
    }
}

/// Reads frames from the receiving half of a connection.
pub struct FrameReader<R> {
    inner: R,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly between
    /// frames. A close in the middle of a frame is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];

        // Distinguish a clean close from a truncated header
        let first = self.inner.read(&mut prefix[..1]).await?;
        if first == 0 {
            return Ok(None);
        }
        self.read_exact_or_closed(&mut prefix[1..]).await?;

        let length = u32::from_be_bytes(prefix) as usize;
        if length == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if length > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        let mut code = [0u8; 1];
        self.read_exact_or_closed(&mut code).await?;

        let mut payload = vec![0u8; length - 1];
        self.read_exact_or_closed(&mut payload).await?;

        Ok(Some(Frame::new(code[0], payload)))
    }

    /// Read the next frame, treating a clean close as an error.
    pub async fn expect_frame(&mut self) -> Result<Frame, ProtocolError> {
        self.read_frame()
            .await?
            .ok_or_else(|| ProtocolError::ConnectionClosed("peer closed the connection".into()))
    }

    async fn read_exact_or_closed(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
                ProtocolError::ConnectionClosed("connection closed mid-frame".into()),
            ),
            Err(e) => Err(ProtocolError::Io(e)),
        }
    }
}

/// Writes frames to the sending half of a connection.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one frame and flush it.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        self.write_parts(frame.code, &frame.payload).await
    }

    /// Write a frame from its parts without building a `Frame`.
    pub async fn write_parts(&mut self, code: u8, payload: &[u8]) -> Result<(), ProtocolError> {
        let length = u32::try_from(1 + payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: 1 + payload.len(),
            max: u32::MAX as usize,
        })?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[..LENGTH_PREFIX_SIZE].copy_from_slice(&length.to_be_bytes());
        header[LENGTH_PREFIX_SIZE] = code;

        self.inner.write_all(&header).await?;
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Builds operation-specific payloads.
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    buf: BytesMut,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string as `u16` length + UTF-8 bytes.
    ///
    /// Strings longer than `u16::MAX` bytes are truncated at a character
    /// boundary.
    pub fn put_str(mut self, value: &str) -> Self {
        let mut end = value.len().min(u16::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.put_u16(end as u16);
        self.buf.put_slice(&value.as_bytes()[..end]);
        self
    }

    pub fn put_u64(mut self, value: u64) -> Self {
        self.buf.put_u64(value);
        self
    }

    pub fn put_u32(mut self, value: u32) -> Self {
        self.buf.put_u32(value);
        self
    }

    pub fn put_u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Parses operation-specific payloads with bounds checks.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Malformed(format!(
                "truncated {what}: need {needed} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn get_str(&mut self) -> Result<String, ProtocolError> {
        self.ensure(2, "string length")?;
        let len = self.buf.get_u16() as usize;
        self.ensure(len, "string")?;
        let value = std::str::from_utf8(&self.buf[..len])
            .map_err(|_| ProtocolError::Malformed("string is not valid UTF-8".into()))?
            .to_string();
        self.buf.advance(len);
        Ok(value)
    }

    pub fn get_u64(&mut self) -> Result<u64, ProtocolError> {
        self.ensure(8, "u64")?;
        Ok(self.buf.get_u64())
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    /// Fail if unread bytes remain.
    pub fn finish(self) -> Result<(), ProtocolError> {
        if self.buf.has_remaining() {
            return Err(ProtocolError::Malformed(format!(
                "{} trailing bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frame_survives_the_wire() {
        let (client, server) = duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, 256);

        writer
            .write_frame(&Frame::new(0x02, b"hello".to_vec()))
            .await
            .unwrap();
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.code, 0x02);
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn oversized_length_is_rejected_before_payload() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server, 16);

        // Declares 1000 bytes but sends none of them
        client.write_all(&1000u32.to_be_bytes()).await.unwrap();
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FrameTooLarge { size: 1000, max: 16 }
        ));
    }

    #[tokio::test]
    async fn zero_length_is_rejected() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server, 16);
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        assert!(matches!(
            reader.read_frame().await,
            Err(ProtocolError::EmptyFrame)
        ));
    }

    #[tokio::test]
    async fn clean_close_yields_none() {
        let (client, server) = duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server, 16);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_mid_frame_is_an_error() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server, 64);
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0x01, 0xAA]).await.unwrap();
        drop(client);
        assert!(matches!(
            reader.read_frame().await,
            Err(ProtocolError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn payload_reader_rejects_truncated_string() {
        let payload = PayloadBuilder::new().put_u16_raw(10).build();
        let mut reader = PayloadReader::new(&payload);
        assert!(matches!(reader.get_str(), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn payload_reader_reads_fields_in_order() {
        let payload = PayloadBuilder::new()
            .put_str("docs/a.txt")
            .put_u64(42)
            .put_u8(1)
            .build();
        let mut reader = PayloadReader::new(&payload);
        assert_eq!(reader.get_str().unwrap(), "docs/a.txt");
        assert_eq!(reader.get_u64().unwrap(), 42);
        assert_eq!(reader.get_u8().unwrap(), 1);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let payload = PayloadBuilder::new().put_u8(1).put_u8(2).build();
        let mut reader = PayloadReader::new(&payload);
        reader.get_u8().unwrap();
        assert!(reader.finish().is_err());
    }

    impl PayloadBuilder {
        fn put_u16_raw(mut self, value: u16) -> Self {
            self.buf.put_u16(value);
            self
        }
    }
}
