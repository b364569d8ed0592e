//! Connection task: pumps bytes between a stream and its [`Session`].
//!
//! The read half appends to a buffer and decodes as many whole frames as the
//! buffer holds, dispatching each inline in arrival order. The write half
//! drains the session's queue whenever it is signalled. Both halves stop once
//! the session starts closing; the writer flushes first only for a requested
//! close.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Decoder;
use tracing::{debug, instrument, warn};

use crate::core::codec::FrameCodec;
use crate::core::frame::MAX_PAYLOAD_SIZE;
use crate::error::constants::ERR_WRITE_ZERO;
use crate::protocol::dispatcher::ServiceDispatcher;
use crate::session::session::{CloseReason, Session};
use crate::utils::metrics::Metrics;

const READ_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub max_payload: usize,
    /// Upper bound on flushing queued replies after a requested close.
    pub linger: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_SIZE,
            linger: Duration::from_secs(2),
        }
    }
}

pub struct SessionDriver {
    dispatcher: Arc<ServiceDispatcher>,
    metrics: Arc<Metrics>,
    options: DriverOptions,
}

impl SessionDriver {
    pub fn new(
        dispatcher: Arc<ServiceDispatcher>,
        metrics: Arc<Metrics>,
        options: DriverOptions,
    ) -> Self {
        Self {
            dispatcher,
            metrics,
            options,
        }
    }

    pub fn dispatcher(&self) -> &Arc<ServiceDispatcher> {
        &self.dispatcher
    }

    /// Drive `session` over `stream` until it closes. Leaves the session in
    /// `Closed`; the caller removes it from the registry.
    #[instrument(level = "debug", skip_all, fields(session = session.id()))]
    pub async fn run<S>(&self, session: Arc<Session>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let (reader, writer) = tokio::io::split(stream);
        tokio::join!(
            self.read_loop(&session, reader),
            self.write_loop(&session, writer)
        );
        session.mark_closed();
        debug!(reason = ?session.close_reason(), "connection task finished");
    }

    async fn read_loop<R>(&self, session: &Arc<Session>, mut reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut codec = FrameCodec::new(self.options.max_payload);
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            let read = tokio::select! {
                _ = session.cancelled() => return,
                read = reader.read_buf(&mut buf) => read,
            };
            match read {
                Ok(0) => {
                    session.close(CloseReason::PeerClosed);
                    return;
                }
                Ok(n) => {
                    session.touch();
                    self.metrics.bytes_read(n);
                }
                Err(err) => {
                    debug!(error = %err, "read failed");
                    self.metrics.connection_error();
                    session.close(CloseReason::TransportError);
                    return;
                }
            }

            loop {
                match codec.decode(&mut buf) {
                    Ok(Some(frame)) => {
                        self.metrics.frame_received();
                        self.dispatcher.dispatch(session, frame);
                        if !session.is_open() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "framing violation");
                        self.metrics.protocol_error();
                        session.close(CloseReason::ProtocolViolation);
                        return;
                    }
                }
            }
        }
    }

    async fn write_loop<W>(&self, session: &Arc<Session>, mut writer: W)
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            if !session.is_open() {
                if session.close_reason().is_some_and(CloseReason::flushes_queue) {
                    let flushed =
                        tokio::time::timeout(self.options.linger, self.drain(session, &mut writer))
                            .await;
                    if !matches!(flushed, Ok(Ok(_))) {
                        debug!("queue not flushed before linger expired");
                    }
                }
                break;
            }

            let drained = tokio::select! {
                _ = session.cancelled() => continue,
                drained = self.drain(session, &mut writer) => drained,
            };
            if let Err(err) = drained {
                debug!(error = %err, "write failed");
                self.metrics.connection_error();
                session.close(CloseReason::TransportError);
                break;
            }

            tokio::select! {
                _ = session.write_ready() => {}
                _ = session.cancelled() => {}
            }
        }
        // a peer that stopped reading must not hold the socket open
        if tokio::time::timeout(self.options.linger, writer.shutdown())
            .await
            .is_err()
        {
            debug!("shutdown did not complete before linger expired");
        }
    }

    async fn drain<W>(&self, session: &Session, writer: &mut W) -> io::Result<Drained>
    where
        W: AsyncWrite + Unpin,
    {
        let drained = drain_outbound(session, writer).await?;
        if drained.bytes > 0 {
            self.metrics.bytes_written(drained.bytes);
        }
        for _ in 0..drained.frames {
            self.metrics.frame_sent();
        }
        Ok(drained)
    }
}

/// What one [`drain_outbound`] pass put on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    pub bytes: usize,
    /// Frames whose last byte was written.
    pub frames: usize,
}

/// Write out the session's queue, honoring partial writes, then flush.
pub async fn drain_outbound<W>(session: &Session, writer: &mut W) -> io::Result<Drained>
where
    W: AsyncWrite + Unpin,
{
    let mut drained = Drained::default();
    while let Some(chunk) = session.outbound_peek() {
        let n = writer.write(&chunk).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, ERR_WRITE_ZERO));
        }
        drained.frames += session.outbound_advance(n);
        drained.bytes += n;
    }
    writer.flush().await?;
    if drained.bytes > 0 {
        session.touch();
    }
    Ok(drained)
}
