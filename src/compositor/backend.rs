//! Seams between the engine and the outside world
//!
//! [`XServer`] covers the queries and resource requests the engine issues
//! against the display; [`Painter`] covers drawing into the back buffer and
//! presenting it. The x11rb implementations live in `x11.rs` and
//! `renderer.rs`; tests drive the engine through in-memory fakes.

use x11rb::protocol::xproto::{Atom, Window};

use crate::compositor::c_window::{MapState, Opacity};
use crate::compositor::error::CompResult;
use crate::compositor::region::Region;
use crate::compositor::shadow::ShadowImage;
use crate::shared::{Geometry, Rect};

/// Attributes of a window as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttrs {
    pub geometry: Geometry,
    pub border_width: u16,
    pub map_state: MapState,
    pub override_redirect: bool,
    pub input_only: bool,
    pub visual: u32,
    /// Visual format carries an alpha channel
    pub argb_visual: bool,
}

/// Requests against the display server.
///
/// Void requests that may race with the destruction of their target return
/// the sequence numbers of every request they sent, so the caller can mark
/// the expected errors as ignorable.
pub trait XServer {
    fn root(&self) -> Window;

    fn screen_size(&self) -> (u32, u32);

    /// Children of `window`, bottom to top
    fn query_tree(&self, window: Window) -> CompResult<Vec<Window>>;

    fn window_attributes(&self, window: Window) -> CompResult<WindowAttrs>;

    /// Listen for property and shape changes on a top-level window
    fn track_window(&self, window: Window) -> CompResult<Vec<u64>>;

    /// Stop listening on a top-level window
    fn untrack_window(&self, window: Window) -> CompResult<Vec<u64>>;

    /// Listen for property changes on a client window
    fn track_client(&self, window: Window) -> CompResult<Vec<u64>>;

    /// New damage object for `window` and the sequence of its creation
    fn create_damage(&self, window: Window) -> CompResult<(u32, u64)>;

    fn destroy_damage(&self, damage: u32) -> CompResult<u64>;

    /// Clear all pending damage without reading it
    fn subtract_damage(&self, damage: u32) -> CompResult<u64>;

    /// Clear pending damage and return it in window coordinates, with the
    /// sequence of the subtract request
    fn fetch_damage(&self, damage: u32) -> CompResult<(Region, u64)>;

    /// Name the off-screen pixmap currently backing `window`
    fn name_window_pixmap(&self, window: Window) -> CompResult<u32>;

    fn free_pixmap(&self, pixmap: u32) -> CompResult<u64>;

    /// 32-bit values of a property, empty when unset
    fn get_property32(&self, window: Window, property: Atom) -> CompResult<Vec<u32>>;

    /// Raw bytes of an 8-bit property, `None` when unset
    fn get_text_property(&self, window: Window, property: Atom) -> CompResult<Option<Vec<u8>>>;

    /// Bounding shape rectangles relative to the window origin, `None` when
    /// the window is not shaped
    fn bounding_shape(&self, window: Window) -> CompResult<Option<Vec<Rect>>>;

    /// Redirect the root's children and show the overlay, or hand both back
    /// to the server
    fn set_redirected(&self, redirected: bool) -> CompResult<()>;
}

/// What a draw call samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Window contents picture
    Window(u32),
    /// Shadow alpha mask, filled with the shadow color
    Shadow(u32),
}

/// One composite operation into the back buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawOp {
    pub source: Source,
    /// Offset into the source picture
    pub src_x: i32,
    pub src_y: i32,
    /// Destination on screen
    pub dst: Rect,
    pub opacity: Opacity,
    /// Blend over the destination instead of copying
    pub blend: bool,
}

/// Rendering backend
pub trait Painter {
    /// Wrap the named pixmap of `window` in a picture
    fn bind_window(&mut self, window: Window, pixmap: u32, visual: u32) -> CompResult<u32>;

    /// Upload a shadow mask
    fn create_shadow(&mut self, image: &ShadowImage) -> CompResult<u32>;

    fn free_picture(&mut self, picture: u32);

    /// Fill `region` with the root background
    fn paint_root(&mut self, region: &Region) -> CompResult<()>;

    /// Root background changed; refetch it on next use
    fn reset_root(&mut self);

    fn draw(&mut self, op: &DrawOp, clip: &Region) -> CompResult<()>;

    /// Darken `dst` by `alpha`
    fn dim(&mut self, dst: Rect, alpha: f64, clip: &Region) -> CompResult<()>;

    /// Copy `region` of the back buffer to the screen
    fn present(&mut self, region: &Region) -> CompResult<()>;

    fn resize(&mut self, width: u32, height: u32);

    fn set_shadow_color(&mut self, color: [f64; 3]);

    /// Release every resource held by the backend
    fn release(&mut self);
}
