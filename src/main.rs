//! Area Compositor
//!
//! A standalone X11 compositing manager: redirects every top-level window
//! off-screen and paints them back with XRender, adding drop shadows,
//! translucency and fade animations.

mod compositor;
mod config;
mod shared;
mod x11_async;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compositor::Compositor;
use compositor::atoms::Atoms;
use compositor::renderer::XRenderPainter;
use compositor::x11::X11Server;
use config::Config;
use x11_async::X11EventStream;

type XCompositor = Compositor<X11Server, XRenderPainter>;

/// Command line arguments
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Option<Self>> {
        let mut args = Args::default();
        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    let path = it.next().context("--config needs a path")?;
                    args.config = Some(PathBuf::from(path));
                }
                "-h" | "--help" => {
                    println!("Usage: area-comp [--config PATH]");
                    return Ok(None);
                }
                other => bail!("Unknown argument: {}", other),
            }
        }
        Ok(Some(args))
    }
}

/// Handle every event queued on the connection, returning how many there were
fn drain_events(comp: &mut XCompositor, stream: &X11EventStream) -> Result<usize> {
    let mut count = 0;
    while let Some((event, sequence)) = stream.poll_next_event()? {
        count += 1;
        if let Some(ev) = comp.server().translate(event) {
            comp.handle_event(sequence, ev);
        }
    }
    Ok(count)
}

fn reload(comp: &mut XCompositor, path: Option<&Path>) {
    match Config::load(path).and_then(|c| c.resolve()) {
        Ok(options) => comp.reload(options),
        Err(e) => warn!("Keeping current configuration: {:#}", e),
    }
}

/// Main loop: events, fades, paint, then sleep until the socket or a timer
/// needs attention
async fn run(comp: &mut XCompositor, stream: &X11EventStream, config: Option<&Path>) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut last_redraw = Instant::now();

    info!("Starting main event loop");
    loop {
        drain_events(comp, stream)?;

        let now = Instant::now();
        comp.run_fades(now);
        let redraw = comp.options().redraw_interval;
        if let Some(interval) = redraw {
            if now.duration_since(last_redraw) >= interval {
                comp.force_redraw();
                last_redraw = now;
            }
        }

        match comp.update_redirection(now) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("Switching redirection failed: {}", e),
        }
        match comp.paint_all() {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("Paint failed: {}", e),
        }
        stream.flush()?;

        // Replies read while painting may have queued events behind the socket
        if drain_events(comp, stream)? > 0 {
            continue;
        }

        let now = Instant::now();
        let redraw_left = redraw.map(|i| i.saturating_sub(now.duration_since(last_redraw)));
        let timeout: Option<Duration> = [
            comp.fade_deadline(now),
            comp.unredirect_deadline(now),
            redraw_left,
        ]
        .into_iter()
        .flatten()
        .min();

        tokio::select! {
            _ = stream.wait_readable_for(timeout) => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                return Ok(());
            }
            _ = sigusr1.recv() => {
                info!("Received SIGUSR1, reloading configuration");
                reload(comp, config);
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_comp=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(args) = Args::parse()? else {
        return Ok(());
    };

    info!("Starting Area Compositor");
    let config = Config::load(args.config.as_deref())?;
    let options = config.resolve()?;

    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
    let conn = Arc::new(conn);
    let atoms = Atoms::new(conn.as_ref(), screen_num).context("Failed to intern atoms")?;
    let server = X11Server::new(conn.clone(), screen_num, &atoms)?;
    let painter = XRenderPainter::new(conn.clone(), screen_num, server.overlay(), &atoms)?;
    let stream = X11EventStream::new(conn)?;

    let mut comp = Compositor::new(server, painter, atoms, options);
    comp.server().grab()?;
    let scanned = comp.scan();
    comp.server().ungrab()?;
    scanned?;

    let result = run(&mut comp, &stream, args.config.as_deref()).await;
    if let Err(e) = &result {
        error!("Compositor error: {:#}", e);
    }

    comp.shutdown();
    if let Err(e) = comp.server().release() {
        warn!("Failed to release the screen: {}", e);
    }
    result
}
