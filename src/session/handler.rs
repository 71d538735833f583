//! Connection handler
//!
//! Drives one connection from accept to close: the login phase under a
//! single deadline, then the request loop of the authenticated session.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::time::{Instant, timeout, timeout_at};

use crate::auth::{Authenticator, LoginOutcome};
use crate::error::ProtocolError;
use crate::error::handlers::{auth_status, protocol_status};
use crate::middleware::logging::{log_connection, log_disconnect};
use crate::protocol::responses::{auth_failed_frame, login_ok_frame, status_frame};
use crate::protocol::{CommandStatus, FrameReader, FrameWriter, Request, Status, handle_command};
use crate::server::ServerContext;
use crate::session::Session;

type Reader<S> = FrameReader<ReadHalf<S>>;
type Writer<S> = FrameWriter<WriteHalf<S>>;

/// Handles one client connection until it closes.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    log_connection(peer);

    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half, ctx.config.max_frame_size);
    let mut writer = FrameWriter::new(write_half);

    let username = match authenticate(&mut reader, &mut writer, peer, &ctx).await {
        Ok(Some(session)) => {
            let username = session.username().to_string();
            if let Err(e) = run_session(session, &mut reader, &mut writer, &ctx).await {
                warn!("Closing session of {} ({}): {}", username, peer, e);
                send_fatal(&mut writer, &e).await;
            }
            Some(username)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Closing connection {} during login: {}", peer, e);
            send_fatal(&mut writer, &e).await;
            None
        }
    };

    let _ = writer.shutdown().await;
    log_disconnect(peer, username.as_deref());
}

/// Runs the login phase.
///
/// Returns `Ok(None)` when the connection should close without a session:
/// clean disconnect, login timeout, or exhausted attempts.
async fn authenticate<S>(
    reader: &mut Reader<S>,
    writer: &mut Writer<S>,
    peer: SocketAddr,
    ctx: &ServerContext,
) -> Result<Option<Session>, ProtocolError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut authenticator = Authenticator::new(
        Arc::clone(&ctx.credentials),
        ctx.config.max_login_attempts,
    );
    let deadline = Instant::now() + ctx.config.login_timeout();

    loop {
        let frame = match timeout_at(deadline, reader.read_frame()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => return Ok(None),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                info!("Login timed out for {}", peer);
                authenticator.close();
                writer
                    .write_frame(&status_frame(Status::Timeout, "Login timed out"))
                    .await?;
                return Ok(None);
            }
        };

        let Request::Login { username, secret } = Request::parse(&frame)? else {
            writer
                .write_frame(&status_frame(Status::PermissionDenied, "Login required"))
                .await?;
            continue;
        };

        match authenticator.login(&username, &secret).await {
            Ok(LoginOutcome::Success { role, token }) => {
                writer.write_frame(&login_ok_frame(role, &token)).await?;
                info!("Session opened for {} from {}", username, peer);
                return Ok(Some(Session::new(username, role, token, peer)));
            }
            Ok(LoginOutcome::Rejected { attempts_left }) => {
                info!(
                    "Failed login from {} ({} attempt(s) left)",
                    peer, attempts_left
                );
                writer.write_frame(&auth_failed_frame()).await?;
            }
            Ok(LoginOutcome::Locked) => {
                ctx.audit
                    .login_lockout(peer, authenticator.failed_attempts());
                writer.write_frame(&auth_failed_frame()).await?;
                return Ok(None);
            }
            Err(e) => {
                error!("Login from {} could not be checked: {}", peer, e);
                let frame = match auth_status(&e) {
                    Status::AuthFailed => auth_failed_frame(),
                    status => status_frame(status, "Internal server error"),
                };
                writer.write_frame(&frame).await?;
            }
        }
    }
}

/// Serves requests until logout, disconnect, idle timeout or a fatal error.
async fn run_session<S>(
    mut session: Session,
    reader: &mut Reader<S>,
    writer: &mut Writer<S>,
    ctx: &ServerContext,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite,
{
    let idle = ctx.config.idle_timeout();

    loop {
        let frame = match timeout(idle, reader.read_frame()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                info!(
                    "Session of {} idle for {:?}, closing",
                    session.username(),
                    idle
                );
                writer
                    .write_frame(&status_frame(Status::Timeout, "Session idle timeout"))
                    .await?;
                return Ok(());
            }
        };

        let request = Request::parse(&frame)?;
        match handle_command(&mut session, request, reader, writer, ctx).await? {
            CommandStatus::CloseConnection => return Ok(()),
            CommandStatus::Success | CommandStatus::Failure(_) => {}
        }
    }
}

/// Best effort final status (PROTOCOL_ERROR, or TIMEOUT for a stalled
/// transfer) before closing. Nothing is sent when the transport itself
/// failed.
async fn send_fatal<W>(writer: &mut FrameWriter<W>, err: &ProtocolError)
where
    W: AsyncWrite + Unpin,
{
    if matches!(
        err,
        ProtocolError::ConnectionClosed(_) | ProtocolError::Io(_)
    ) {
        return;
    }
    let frame = status_frame(protocol_status(err), &err.to_string());
    if let Err(e) = writer.write_frame(&frame).await {
        warn!("Failed to send protocol error: {}", e);
    }
}
