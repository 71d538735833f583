//! Request handlers for authenticated sessions.
//!
//! Each handler resolves its paths through the storage manager, performs
//! the operation and writes exactly one response (plus the DATA stream for
//! downloads). Request-scoped failures become a status frame and leave the
//! connection open; a returned `ProtocolError` ends the connection.

use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::handlers::{storage_message, storage_status};
use crate::error::{ProtocolError, StorageError};
use crate::middleware::logging::log_request;
use crate::navigate::change_directory;
use crate::protocol::codec::{FrameReader, FrameWriter};
use crate::protocol::commands::{CommandStatus, Request};
use crate::protocol::responses::{
    Status, list_frame, ok_frame, path_frame, size_frame, status_frame,
};
use crate::server::ServerContext;
use crate::session::Session;
use crate::storage::operations::{
    check_upload_target, delete_path, list_directory, make_directory, open_for_download,
    rename_path,
};
use crate::storage::{Access, ResolvedPath};
use crate::transfer::{StagingFile, UploadOutcome, receive_upload, stream_file};

/// Dispatches a request from an authenticated session to its handler.
pub async fn handle_command<R, W>(
    session: &mut Session,
    request: Request,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    log_request(session.peer_addr(), session.username(), &request);

    match request {
        Request::Login { .. } => {
            respond(writer, Status::PermissionDenied, "Already authenticated").await
        }
        Request::List { path } => handle_list(session, &path, writer, ctx).await,
        Request::Upload { path, size } => {
            handle_upload(session, &path, size, reader, writer, ctx).await
        }
        Request::Download { path } => handle_download(session, &path, writer, ctx).await,
        Request::Delete { path } => handle_delete(session, &path, writer, ctx).await,
        Request::Rename { from, to } => handle_rename(session, &from, &to, writer, ctx).await,
        Request::Chdir { path } => handle_chdir(session, &path, writer, ctx).await,
        Request::Mkdir { path } => handle_mkdir(session, &path, writer, ctx).await,
        Request::Logout => handle_logout(session, writer).await,
    }
}

async fn respond<W>(
    writer: &mut FrameWriter<W>,
    status: Status,
    message: &str,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_frame(&status_frame(status, message)).await?;
    Ok(CommandStatus::Failure(status))
}

/// Sends the status frame for a failed request.
///
/// Path violations are counted on the session; from the configured
/// threshold on, each one is reported to the audit sink.
async fn respond_error<W>(
    session: &mut Session,
    requested: &str,
    err: StorageError,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let status = storage_status(&err);

    if status == Status::PathViolation {
        let count = session.record_path_violation();
        warn!(
            "Path violation by {} from {}: {:?}",
            session.username(),
            session.peer_addr(),
            requested
        );
        if count >= ctx.config.path_violation_alert_threshold {
            ctx.audit
                .path_violation(session.peer_addr(), session.username(), requested, count);
        }
    } else {
        info!(
            "Request on {:?} by {} failed: {}",
            requested,
            session.username(),
            err
        );
    }

    respond(writer, status, &storage_message(&err)).await
}

/// Handles LIST: sends the entries of a directory.
async fn handle_list<W>(
    session: &mut Session,
    path: &str,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    // 1. Resolve directory
    let target = match ctx.storage.resolve(session, path, Access::Read) {
        Ok(target) => target,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    // 2. Read entries
    let entries = match list_directory(&target).await {
        Ok(entries) => entries,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    // 3. Listing must fit in one frame
    let frame = list_frame(&entries);
    if frame.wire_length() > ctx.config.max_frame_size {
        warn!(
            "Listing of {} has {} entries and exceeds the frame limit",
            target.virtual_path,
            entries.len()
        );
        return respond(writer, Status::TooLarge, "Directory listing too large").await;
    }

    writer.write_frame(&frame).await?;
    Ok(CommandStatus::Success)
}

/// Handles UPLOAD: stages the incoming stream and commits it atomically.
async fn handle_upload<R, W>(
    session: &mut Session,
    path: &str,
    size: u64,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // 1. Resolve target path
    let target = match ctx.storage.resolve(session, path, Access::Write) {
        Ok(target) => target,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    // 2. Size limit, parent directory, no directory in the way
    if let Err(e) = check_upload_target(&target, size, ctx.config.max_file_size_bytes()).await {
        return respond_error(session, path, e, writer, ctx).await;
    }

    // 3. Open staging file
    let staging = match ctx.storage.staging_path() {
        Ok(staging_path) => StagingFile::create(staging_path).await,
        Err(e) => Err(e),
    };
    let staging = match staging {
        Ok(staging) => staging,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    // 4. Tell the client to start streaming
    writer.write_frame(&ok_frame()).await?;

    // 5. Receive and commit
    match receive_upload(reader, staging, &target, size, ctx.config.idle_timeout()).await? {
        UploadOutcome::Committed(receipt) => {
            writer.write_frame(&size_frame(receipt.size)).await?;
            Ok(CommandStatus::Success)
        }
        UploadOutcome::Failed(e) => respond_error(session, path, e, writer, ctx).await,
    }
}

/// Handles DOWNLOAD: announces the size, then streams the content.
async fn handle_download<W>(
    session: &mut Session,
    path: &str,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    // 1. Resolve file
    let target = match ctx.storage.resolve(session, path, Access::Read) {
        Ok(target) => target,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    // 2. Open it; the size is fixed from here on
    let (file, size) = match open_for_download(&target).await {
        Ok(opened) => opened,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    // 3. Announce and stream
    writer.write_frame(&size_frame(size)).await?;
    let sent = stream_file(writer, file, size, ctx.config.transfer_chunk_size).await?;

    info!(
        "Download completed: {} ({} bytes) to {}",
        target.virtual_path,
        sent,
        session.username()
    );
    Ok(CommandStatus::Success)
}

async fn handle_delete<W>(
    session: &mut Session,
    path: &str,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let target = match ctx.storage.resolve(session, path, Access::Manage) {
        Ok(target) => target,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    if let Err(e) = delete_path(&target).await {
        return respond_error(session, path, e, writer, ctx).await;
    }

    writer.write_frame(&ok_frame()).await?;
    Ok(CommandStatus::Success)
}

async fn handle_rename<W>(
    session: &mut Session,
    from: &str,
    to: &str,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let source = match ctx.storage.resolve(session, from, Access::Write) {
        Ok(source) => source,
        Err(e) => return respond_error(session, from, e, writer, ctx).await,
    };
    let destination = match ctx.storage.resolve(session, to, Access::Write) {
        Ok(destination) => destination,
        Err(e) => return respond_error(session, to, e, writer, ctx).await,
    };

    if let Err(e) = rename_path(&source, &destination).await {
        let failed = failed_rename_operand(&e, from, to, &destination);
        return respond_error(session, failed, e, writer, ctx).await;
    }

    writer.write_frame(&ok_frame()).await?;
    Ok(CommandStatus::Success)
}

/// The operand of a RENAME that `err` is about. Errors that name no path
/// are charged to the source.
fn failed_rename_operand<'a>(
    err: &StorageError,
    from: &'a str,
    to: &'a str,
    destination: &ResolvedPath,
) -> &'a str {
    if err.path() == Some(destination.virtual_path.as_str()) {
        to
    } else {
        from
    }
}

/// Handles CHDIR: answers with the new working directory.
async fn handle_chdir<W>(
    session: &mut Session,
    path: &str,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    match change_directory(&ctx.storage, session, path) {
        Ok(new_path) => {
            writer.write_frame(&path_frame(&new_path)).await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => respond_error(session, path, e, writer, ctx).await,
    }
}

async fn handle_mkdir<W>(
    session: &mut Session,
    path: &str,
    writer: &mut FrameWriter<W>,
    ctx: &ServerContext,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let target = match ctx.storage.resolve(session, path, Access::Write) {
        Ok(target) => target,
        Err(e) => return respond_error(session, path, e, writer, ctx).await,
    };

    if let Err(e) = make_directory(&target).await {
        return respond_error(session, path, e, writer, ctx).await;
    }

    writer.write_frame(&ok_frame()).await?;
    Ok(CommandStatus::Success)
}

/// Handles LOGOUT: acknowledges and signals connection close.
async fn handle_logout<W>(
    session: &Session,
    writer: &mut FrameWriter<W>,
) -> Result<CommandStatus, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    info!("User {} logged out", session.username());
    writer.write_frame(&ok_frame()).await?;
    Ok(CommandStatus::CloseConnection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, Role};
    use crate::config::ServerConfig;
    use crate::error::AuthError;
    use crate::middleware::AuditSink;
    use crate::protocol::codec::Frame;
    use crate::protocol::commands::data_frame;
    use crate::protocol::responses::{decode_list, decode_message, decode_path, decode_size};
    use crate::storage::StorageManager;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::io::{DuplexStream, duplex};

    struct NoStore;

    impl CredentialStore for NoStore {
        fn verify(&self, _: &str, _: &str) -> Result<Role, AuthError> {
            Err(AuthError::Failure(crate::error::AuthFailureReason::UnknownUser))
        }
        fn reload(&self) -> Result<(), AuthError> {
            Ok(())
        }
        fn has_account(&self, _: &str) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        violations: Mutex<Vec<u32>>,
    }

    impl AuditSink for RecordingAudit {
        fn path_violation(&self, _: SocketAddr, _: &str, _: &str, count: u32) {
            self.violations.lock().unwrap().push(count);
        }
        fn login_lockout(&self, _: SocketAddr, _: u32) {}
    }

    struct Harness {
        _dir: TempDir,
        ctx: ServerContext,
        audit: Arc<RecordingAudit>,
        session: Session,
        // Server side of the connection
        reader: FrameReader<DuplexStream>,
        writer: FrameWriter<DuplexStream>,
        // Client side of the connection
        client_reader: FrameReader<DuplexStream>,
        client_writer: FrameWriter<DuplexStream>,
    }

    fn harness(role: Role) -> Harness {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path()).unwrap();
        let audit = Arc::new(RecordingAudit::default());
        let config = ServerConfig {
            path_violation_alert_threshold: 2,
            ..ServerConfig::default()
        };
        let ctx = ServerContext {
            config,
            credentials: Arc::new(NoStore),
            storage,
            audit: audit.clone(),
        };
        let session = Session::new(
            "alice".into(),
            role,
            "t".into(),
            "127.0.0.1:9000".parse().unwrap(),
        );
        let (c2s_client, c2s_server) = duplex(1 << 20);
        let (s2c_server, s2c_client) = duplex(1 << 20);
        Harness {
            _dir: dir,
            ctx,
            audit,
            session,
            reader: FrameReader::new(c2s_server, 1 << 20),
            writer: FrameWriter::new(s2c_server),
            client_reader: FrameReader::new(s2c_client, 1 << 20),
            client_writer: FrameWriter::new(c2s_client),
        }
    }

    impl Harness {
        async fn run(&mut self, request: Request) -> CommandStatus {
            handle_command(
                &mut self.session,
                request,
                &mut self.reader,
                &mut self.writer,
                &self.ctx,
            )
            .await
            .unwrap()
        }

        async fn response(&mut self) -> Frame {
            self.client_reader.expect_frame().await.unwrap()
        }
    }

    #[tokio::test]
    async fn upload_then_download_round_trip() {
        let mut h = harness(Role::Standard);

        for frame in [data_frame(b"hello"), data_frame(b"")] {
            h.client_writer.write_frame(&frame).await.unwrap();
        }
        let status = h
            .run(Request::Upload {
                path: "greeting.txt".into(),
                size: 5,
            })
            .await;
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(h.response().await, ok_frame());
        assert_eq!(decode_size(&h.response().await).unwrap(), 5);

        let status = h
            .run(Request::Download {
                path: "/greeting.txt".into(),
            })
            .await;
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(decode_size(&h.response().await).unwrap(), 5);
        assert_eq!(h.response().await.payload, b"hello");
        assert!(h.response().await.payload.is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_refused_before_streaming() {
        let mut h = harness(Role::Standard);
        let max = h.ctx.config.max_file_size_bytes();

        let status = h
            .run(Request::Upload {
                path: "big.bin".into(),
                size: max + 1,
            })
            .await;
        assert_eq!(status, CommandStatus::Failure(Status::TooLarge));
        assert_eq!(h.response().await.code, Status::TooLarge.code());
    }

    #[tokio::test]
    async fn list_reports_entries() {
        let mut h = harness(Role::Standard);
        let root = h.ctx.storage.user_root("alice").unwrap();
        std::fs::write(root.join("b.txt"), b"bb").unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();

        h.run(Request::List { path: "".into() }).await;
        let entries = decode_list(&h.response().await).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(entries[1].size, 2);
    }

    #[tokio::test]
    async fn repeated_violations_reach_the_audit_sink() {
        let mut h = harness(Role::Standard);

        for _ in 0..3 {
            let status = h
                .run(Request::Download {
                    path: "../../etc/passwd".into(),
                })
                .await;
            assert_eq!(status, CommandStatus::Failure(Status::PathViolation));
            assert_eq!(h.response().await.code, Status::PathViolation.code());
        }

        assert_eq!(h.session.path_violations(), 3);
        assert_eq!(*h.audit.violations.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn chdir_changes_relative_resolution() {
        let mut h = harness(Role::Standard);
        let root = h.ctx.storage.user_root("alice").unwrap();
        std::fs::create_dir(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/n.txt"), b"note").unwrap();

        h.run(Request::Chdir { path: "docs".into() }).await;
        assert_eq!(decode_path(&h.response().await).unwrap(), "/docs");

        h.run(Request::Download { path: "n.txt".into() }).await;
        assert_eq!(decode_size(&h.response().await).unwrap(), 4);
    }

    #[tokio::test]
    async fn second_login_is_denied() {
        let mut h = harness(Role::Standard);
        let status = h
            .run(Request::Login {
                username: "alice".into(),
                secret: "x".into(),
            })
            .await;
        assert_eq!(status, CommandStatus::Failure(Status::PermissionDenied));
        let frame = h.response().await;
        assert_eq!(decode_message(&frame), "Already authenticated");
    }

    #[tokio::test]
    async fn logout_closes() {
        let mut h = harness(Role::Standard);
        assert_eq!(h.run(Request::Logout).await, CommandStatus::CloseConnection);
        assert_eq!(h.response().await, ok_frame());
    }

    #[tokio::test]
    async fn rename_failures_name_the_failing_operand() {
        let h = harness(Role::Standard);
        let root = h.ctx.storage.user_root("alice").unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();

        let source = h.ctx.storage.resolve(&h.session, "a.txt", Access::Write).unwrap();
        let taken = h.ctx.storage.resolve(&h.session, "b.txt", Access::Write).unwrap();
        let err = rename_path(&source, &taken).await.unwrap_err();
        assert_eq!(failed_rename_operand(&err, "a.txt", "b.txt", &taken), "b.txt");

        let orphan = h
            .ctx
            .storage
            .resolve(&h.session, "missing/c.txt", Access::Write)
            .unwrap();
        let err = rename_path(&source, &orphan).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert_eq!(
            failed_rename_operand(&err, "a.txt", "missing/c.txt", &orphan),
            "missing/c.txt"
        );

        let absent = h.ctx.storage.resolve(&h.session, "gone.txt", Access::Write).unwrap();
        let free = h.ctx.storage.resolve(&h.session, "c.txt", Access::Write).unwrap();
        let err = rename_path(&absent, &free).await.unwrap_err();
        assert_eq!(failed_rename_operand(&err, "gone.txt", "c.txt", &free), "gone.txt");
    }

    #[tokio::test]
    async fn rename_onto_existing_target_is_a_conflict() {
        let mut h = harness(Role::Standard);
        let root = h.ctx.storage.user_root("alice").unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();

        let status = h
            .run(Request::Rename {
                from: "a.txt".into(),
                to: "b.txt".into(),
            })
            .await;
        assert_eq!(status, CommandStatus::Failure(Status::Conflict));
        let frame = h.response().await;
        assert!(decode_message(&frame).contains("/b.txt"));
        assert_eq!(std::fs::read(root.join("b.txt")).unwrap(), b"b");
    }

    #[tokio::test]
    async fn admin_cannot_write_into_foreign_root() {
        let mut h = harness(Role::Admin);
        h.ctx.storage.user_root("bob").unwrap();

        let status = h
            .run(Request::Mkdir {
                path: "~bob/new".into(),
            })
            .await;
        assert_eq!(status, CommandStatus::Failure(Status::PermissionDenied));
        assert_eq!(h.response().await.code, Status::PermissionDenied.code());
    }
}
