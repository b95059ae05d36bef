//! X11 Async Event Stream
//!
//! The X socket is watched from a blocking mio thread that wakes the main
//! loop through a [`Notify`]. The loop can then sleep on the socket and on
//! fade or redraw timers at the same time.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Notify, oneshot};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

/// How often the poll thread checks whether the stream was dropped
const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const X11_TOKEN: mio::Token = mio::Token(0);

/// Event source for the main loop
pub struct X11EventStream {
    conn: Arc<RustConnection>,
    readable: Arc<Notify>,
    /// Dropping this stops the poll thread
    _alive: oneshot::Receiver<()>,
}

impl X11EventStream {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let readable = Arc::new(Notify::new());
        let alive = watch_fd(conn.stream().as_raw_fd(), readable.clone())?;
        Ok(Self {
            conn,
            readable,
            _alive: alive,
        })
    }

    /// Next buffered or readable event with its sequence number, without
    /// blocking
    pub fn poll_next_event(&self) -> Result<Option<(Event, u64)>> {
        Ok(self.conn.poll_for_event_with_sequence()?)
    }

    /// Wait until the socket is readable or `timeout` elapses. Returns
    /// `true` when the socket woke us.
    pub async fn wait_readable_for(&self, timeout: Option<Duration>) -> bool {
        let readable = self.readable.notified();
        match timeout {
            Some(t) => tokio::time::timeout(t, readable).await.is_ok(),
            None => {
                readable.await;
                true
            }
        }
    }

    /// Send all queued requests
    pub fn flush(&self) -> Result<()> {
        self.conn.flush().context("Failed to flush X11 requests")
    }
}

/// Register `fd` with a mio poll running on the blocking pool and notify
/// `readable` whenever it has data. The thread exits once the returned
/// receiver is dropped.
fn watch_fd(fd: RawFd, readable: Arc<Notify>) -> Result<oneshot::Receiver<()>> {
    let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
    poll.registry()
        .register(&mut mio::unix::SourceFd(&fd), X11_TOKEN, mio::Interest::READABLE)
        .context("Failed to register X11 FD with mio")?;

    let (alive, alive_rx) = oneshot::channel::<()>();
    tokio::task::spawn_blocking(move || {
        let mut events = mio::Events::with_capacity(1);
        while !alive.is_closed() {
            if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                tracing::warn!("X11 socket poll failed: {:?}", err);
                continue;
            }
            if events.iter().any(|e| e.token() == X11_TOKEN) {
                readable.notify_one();
            }
        }
        tracing::debug!("X11 socket polling thread shutting down");
    });
    Ok(alive_rx)
}
