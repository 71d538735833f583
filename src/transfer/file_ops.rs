//! Module `file_ops`
//!
//! Moves file content over the control connection as DATA frames. Uploads
//! land in a staging file and are committed atomically; downloads stream
//! exactly the number of bytes announced in the OK frame.

use std::time::Duration;

use log::{error, info, warn};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::timeout;

use crate::error::{ProtocolError, StorageError};
use crate::protocol::codec::{FrameReader, FrameWriter};
use crate::protocol::commands::OpCode;
use crate::storage::{CommitReceipt, ResolvedPath};
use crate::transfer::results::UploadOutcome;
use crate::transfer::staging::StagingFile;

/// Receive an upload stream and commit it to `target`.
///
/// Reads DATA frames up to the empty terminator. Once a chunk fails to
/// write or the stream overruns `declared_size`, the rest of the stream is
/// still drained so the connection stays in sync. Any frame other than DATA
/// is a protocol error and the staging file is discarded. So is a stream
/// that goes quiet for longer than `idle`.
pub async fn receive_upload<R>(
    reader: &mut FrameReader<R>,
    staging: StagingFile,
    target: &ResolvedPath,
    declared_size: u64,
    idle: Duration,
) -> Result<UploadOutcome, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    info!(
        "Receiving upload {} ({} bytes declared) via {}",
        target.virtual_path,
        declared_size,
        staging.path().display()
    );

    let mut staging = Some(staging);
    let mut received = 0u64;
    let mut failure: Option<StorageError> = None;

    loop {
        let frame = match timeout(idle, reader.expect_frame()).await {
            Ok(frame) => frame?,
            Err(_) => {
                warn!(
                    "Upload {} stalled after {} of {} bytes",
                    target.virtual_path, received, declared_size
                );
                return Err(ProtocolError::Timeout(format!(
                    "no upload data for {idle:?}"
                )));
            }
        };
        if frame.code != OpCode::Data.code() {
            return Err(ProtocolError::UnexpectedFrame(format!(
                "expected DATA during upload, got {:#04x}",
                frame.code
            )));
        }

        // Empty DATA frame terminates the stream
        if frame.payload.is_empty() {
            break;
        }

        received += frame.payload.len() as u64;
        if failure.is_some() {
            continue;
        }

        if received > declared_size {
            warn!(
                "Upload {} overran declared size ({} > {})",
                target.virtual_path, received, declared_size
            );
            staging.take();
            failure = Some(StorageError::TransferIncomplete {
                declared: declared_size,
                received,
            });
            continue;
        }

        if let Some(file) = staging.as_mut() {
            if let Err(e) = file.write_chunk(&frame.payload).await {
                error!("Failed to write upload chunk for {}: {}", target.virtual_path, e);
                staging.take();
                failure = Some(e);
            }
        }
    }

    if let Some(err) = failure {
        if let StorageError::TransferIncomplete { declared, .. } = err {
            return Ok(UploadOutcome::Failed(StorageError::TransferIncomplete {
                declared,
                received,
            }));
        }
        return Ok(UploadOutcome::Failed(err));
    }

    if received != declared_size {
        warn!(
            "Upload {} ended short ({} of {} bytes)",
            target.virtual_path, received, declared_size
        );
        return Ok(UploadOutcome::Failed(StorageError::TransferIncomplete {
            declared: declared_size,
            received,
        }));
    }

    let Some(file) = staging else {
        return Ok(UploadOutcome::Failed(StorageError::TransferIncomplete {
            declared: declared_size,
            received,
        }));
    };

    match file.commit(&target.absolute).await {
        Ok(size) => {
            info!(
                "Upload committed: {} ({} bytes)",
                target.virtual_path, size
            );
            Ok(UploadOutcome::Committed(CommitReceipt {
                virtual_path: target.virtual_path.clone(),
                size,
            }))
        }
        Err(e) => {
            error!("Failed to commit upload {}: {}", target.virtual_path, e);
            Ok(UploadOutcome::Failed(e))
        }
    }
}

/// Stream `size` bytes of `file` as DATA frames followed by the empty
/// terminator. Returns the number of bytes sent.
///
/// A file that turns out shorter than `size` cannot be completed without
/// breaking framing, so it is reported as a fatal error.
pub async fn stream_file<W>(
    writer: &mut FrameWriter<W>,
    mut file: File,
    size: u64,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;

    while sent < size {
        let want = ((size - sent) as usize).min(buffer.len());
        let n = file.read(&mut buffer[..want]).await?;
        if n == 0 {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file shrank during download: sent {sent} of {size} bytes"),
            )));
        }
        writer.write_parts(OpCode::Data.code(), &buffer[..n]).await?;
        sent += n as u64;
    }

    writer.write_parts(OpCode::Data.code(), &[]).await?;
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::protocol::commands::data_frame;
    use crate::protocol::codec::Frame;
    use crate::session::Session;
    use crate::storage::{Access, StorageManager};
    use tempfile::TempDir;
    use tokio::io::duplex;

    const IDLE: Duration = Duration::from_secs(5);

    struct Fixture {
        _dir: TempDir,
        manager: StorageManager,
        session: Session,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::open(dir.path()).unwrap();
        let session = Session::new(
            "alice".into(),
            Role::Standard,
            "t".into(),
            "127.0.0.1:7000".parse().unwrap(),
        );
        Fixture {
            _dir: dir,
            manager,
            session,
        }
    }

    async fn send_all(frames: Vec<Frame>) -> FrameReader<tokio::io::DuplexStream> {
        let (client, server) = duplex(1 << 16);
        let mut writer = FrameWriter::new(client);
        for frame in frames {
            writer.write_frame(&frame).await.unwrap();
        }
        // Keep the client half open so the reader sees frames, not EOF
        std::mem::forget(writer);
        FrameReader::new(server, 1024)
    }

    async fn staging(f: &Fixture) -> StagingFile {
        StagingFile::create(f.manager.staging_path().unwrap())
            .await
            .unwrap()
    }

    fn staging_is_empty(f: &Fixture) -> bool {
        std::fs::read_dir(f.manager.base().join(".staging"))
            .unwrap()
            .next()
            .is_none()
    }

    #[tokio::test]
    async fn complete_upload_is_committed() {
        let f = fixture();
        let target = f.manager.resolve(&f.session, "a.txt", Access::Write).unwrap();
        let mut reader = send_all(vec![
            data_frame(b"hello "),
            data_frame(b"world"),
            data_frame(b""),
        ])
        .await;

        let outcome = receive_upload(&mut reader, staging(&f).await, &target, 11, IDLE)
            .await
            .unwrap();
        match outcome {
            UploadOutcome::Committed(receipt) => {
                assert_eq!(receipt.size, 11);
                assert_eq!(receipt.virtual_path, "/a.txt");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(std::fs::read(&target.absolute).unwrap(), b"hello world");
        assert!(staging_is_empty(&f));
    }

    #[tokio::test]
    async fn short_upload_leaves_target_untouched() {
        let f = fixture();
        let target = f.manager.resolve(&f.session, "a.txt", Access::Write).unwrap();
        std::fs::write(&target.absolute, b"original").unwrap();

        let mut reader = send_all(vec![data_frame(b"abc"), data_frame(b"")]).await;
        let outcome = receive_upload(&mut reader, staging(&f).await, &target, 10, IDLE)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            UploadOutcome::Failed(StorageError::TransferIncomplete {
                declared: 10,
                received: 3
            })
        ));
        assert_eq!(std::fs::read(&target.absolute).unwrap(), b"original");
        assert!(staging_is_empty(&f));
    }

    #[tokio::test]
    async fn overrun_is_drained_and_rejected() {
        let f = fixture();
        let target = f.manager.resolve(&f.session, "a.txt", Access::Write).unwrap();
        let mut reader = send_all(vec![
            data_frame(b"1234"),
            data_frame(b"5678"),
            data_frame(b"9"),
            data_frame(b""),
            Frame::empty(OpCode::Logout.code()),
        ])
        .await;

        let outcome = receive_upload(&mut reader, staging(&f).await, &target, 5, IDLE)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            UploadOutcome::Failed(StorageError::TransferIncomplete {
                declared: 5,
                received: 9
            })
        ));
        assert!(!target.absolute.exists());

        // The next request is still readable
        let next = reader.expect_frame().await.unwrap();
        assert_eq!(next.code, OpCode::Logout.code());
    }

    #[tokio::test]
    async fn foreign_frame_mid_stream_is_fatal() {
        let f = fixture();
        let target = f.manager.resolve(&f.session, "a.txt", Access::Write).unwrap();
        let mut reader = send_all(vec![
            data_frame(b"12"),
            Frame::empty(OpCode::List.code()),
        ])
        .await;

        let result = receive_upload(&mut reader, staging(&f).await, &target, 4, IDLE).await;
        assert!(matches!(result, Err(ProtocolError::UnexpectedFrame(_))));
        assert!(!target.absolute.exists());
        assert!(staging_is_empty(&f));
    }

    #[tokio::test]
    async fn disconnect_mid_stream_discards_staging() {
        let f = fixture();
        let target = f.manager.resolve(&f.session, "a.txt", Access::Write).unwrap();

        let (client, server) = duplex(1024);
        let mut writer = FrameWriter::new(client);
        writer.write_frame(&data_frame(b"12")).await.unwrap();
        drop(writer);

        let mut reader = FrameReader::new(server, 1024);
        let result = receive_upload(&mut reader, staging(&f).await, &target, 4, IDLE).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed(_))));
        assert!(!target.absolute.exists());
        assert!(staging_is_empty(&f));
    }

    #[tokio::test]
    async fn stalled_stream_times_out_and_discards_staging() {
        let f = fixture();
        let target = f.manager.resolve(&f.session, "a.txt", Access::Write).unwrap();
        let mut reader = send_all(vec![data_frame(b"12")]).await;

        let result = receive_upload(
            &mut reader,
            staging(&f).await,
            &target,
            1000,
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
        assert!(!target.absolute.exists());
        assert!(staging_is_empty(&f));
    }

    #[tokio::test]
    async fn download_streams_exact_size_then_terminator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..250u8).collect();
        std::fs::write(&path, &content).unwrap();

        let (client, server) = duplex(1 << 16);
        let mut writer = FrameWriter::new(server);
        let file = File::open(&path).await.unwrap();
        let sent = stream_file(&mut writer, file, 250, 100).await.unwrap();
        assert_eq!(sent, 250);

        let mut reader = FrameReader::new(client, 1024);
        let mut received = Vec::new();
        let mut chunks = 0;
        loop {
            let frame = reader.expect_frame().await.unwrap();
            assert_eq!(frame.code, OpCode::Data.code());
            if frame.payload.is_empty() {
                break;
            }
            chunks += 1;
            received.extend_from_slice(&frame.payload);
        }
        assert_eq!(chunks, 3);
        assert_eq!(received, content);
    }
}
