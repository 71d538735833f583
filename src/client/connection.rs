//! Library client for the storage protocol.
//!
//! One request in flight at a time, matching the server's strict
//! request/response ordering.

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::auth::Role;
use crate::config::ServerConfig;
use crate::error::{ClientError, ProtocolError};
use crate::protocol::codec::{Frame, FrameReader, FrameWriter};
use crate::protocol::commands::{OpCode, Request};
use crate::protocol::responses::{
    Status, decode_list, decode_login_ok, decode_message, decode_path, decode_size,
    decode_status,
};
use crate::storage::FileEntry;

pub struct FileClient<S> {
    reader: FrameReader<ReadHalf<S>>,
    writer: FrameWriter<WriteHalf<S>>,
    chunk_size: usize,
}

impl FileClient<TcpStream> {
    /// Connect with the default frame limits.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, ServerConfig::default().max_frame_size))
    }
}

impl<S: AsyncRead + AsyncWrite> FileClient<S> {
    pub fn new(stream: S, max_frame_size: usize) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read_half, max_frame_size),
            writer: FrameWriter::new(write_half),
            chunk_size: ServerConfig::default().transfer_chunk_size,
        }
    }

    /// Payload size of the DATA frames sent by [`FileClient::upload`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Read one response, turning any non-OK status into an error.
    async fn read_response(&mut self) -> Result<Frame, ClientError> {
        let frame = self.reader.expect_frame().await?;
        let status = decode_status(&frame)?;
        if !status.is_ok() {
            return Err(ClientError::Status {
                status,
                message: decode_message(&frame),
            });
        }
        Ok(frame)
    }

    async fn call(&mut self, request: &Request) -> Result<Frame, ClientError> {
        debug!("Sending {}", request.name());
        self.writer.write_frame(&request.to_frame()).await?;
        self.read_response().await
    }

    /// Log in. Returns the granted role and the session token.
    pub async fn login(&mut self, username: &str, secret: &str) -> Result<(Role, String), ClientError> {
        let frame = self
            .call(&Request::Login {
                username: username.to_string(),
                secret: secret.to_string(),
            })
            .await?;
        Ok(decode_login_ok(&frame)?)
    }

    pub async fn list(&mut self, path: &str) -> Result<Vec<FileEntry>, ClientError> {
        let frame = self.call(&Request::List { path: path.to_string() }).await?;
        Ok(decode_list(&frame)?)
    }

    /// Upload `size` bytes read from `source`. Returns the committed size.
    ///
    /// Everything `source` yields is sent; a source that does not yield
    /// exactly `size` bytes makes the server reject the upload.
    pub async fn upload<R>(&mut self, path: &str, source: &mut R, size: u64) -> Result<u64, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        // Server answers OK when it is ready for the stream
        self.call(&Request::Upload {
            path: path.to_string(),
            size,
        })
        .await?;

        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let n = source.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            self.writer
                .write_parts(OpCode::Data.code(), &buffer[..n])
                .await?;
        }
        self.writer.write_parts(OpCode::Data.code(), &[]).await?;

        let frame = self.read_response().await?;
        Ok(decode_size(&frame)?)
    }

    pub async fn upload_bytes(&mut self, path: &str, data: &[u8]) -> Result<u64, ClientError> {
        let mut source = data;
        self.upload(path, &mut source, data.len() as u64).await
    }

    /// Download a file into `sink`. Returns the number of bytes received.
    pub async fn download<W>(&mut self, path: &str, sink: &mut W) -> Result<u64, ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.call(&Request::Download { path: path.to_string() }).await?;
        let size = decode_size(&frame)?;

        let mut received = 0u64;
        loop {
            let frame = self.reader.expect_frame().await?;
            if frame.code != OpCode::Data.code() {
                return Err(ProtocolError::UnexpectedFrame(format!(
                    "expected DATA during download, got {:#04x}",
                    frame.code
                ))
                .into());
            }
            if frame.payload.is_empty() {
                break;
            }
            received += frame.payload.len() as u64;
            sink.write_all(&frame.payload).await?;
        }
        sink.flush().await?;

        if received != size {
            return Err(ClientError::Status {
                status: Status::TransferIncomplete,
                message: format!("expected {size} bytes, received {received}"),
            });
        }
        Ok(received)
    }

    pub async fn download_bytes(&mut self, path: &str) -> Result<Vec<u8>, ClientError> {
        let mut content = Vec::new();
        self.download(path, &mut content).await?;
        Ok(content)
    }

    pub async fn delete(&mut self, path: &str) -> Result<(), ClientError> {
        self.call(&Request::Delete { path: path.to_string() }).await?;
        Ok(())
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> Result<(), ClientError> {
        self.call(&Request::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Change the working directory. Returns the new virtual path.
    pub async fn chdir(&mut self, path: &str) -> Result<String, ClientError> {
        let frame = self.call(&Request::Chdir { path: path.to_string() }).await?;
        Ok(decode_path(&frame)?)
    }

    pub async fn mkdir(&mut self, path: &str) -> Result<(), ClientError> {
        self.call(&Request::Mkdir { path: path.to_string() }).await?;
        Ok(())
    }

    /// Log out; the server closes the connection afterwards.
    pub async fn logout(mut self) -> Result<(), ClientError> {
        self.call(&Request::Logout).await?;
        let _ = self.writer.shutdown().await;
        Ok(())
    }
}
