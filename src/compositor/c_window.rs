use x11rb::protocol::xproto::Window;

use crate::compositor::region::Region;
use crate::compositor::wintype::WinType;
use crate::shared::{Geometry, Rect};

/// Window opacity in `0..=OPAQUE`
pub type Opacity = u32;

/// Fully opaque
pub const OPAQUE: Opacity = 0xff;

/// Convert a `_NET_WM_WINDOW_OPACITY` value (0xffffffff = opaque)
pub fn opacity_from_prop(value: u32) -> Opacity {
    ((value as u64 * OPAQUE as u64 + 0x7fff_ffff) / 0xffff_ffff) as Opacity
}

/// Convert a `0.0..=1.0` fraction, clamping out-of-range input
pub fn opacity_from_fraction(f: f64) -> Opacity {
    (f.clamp(0.0, 1.0) * OPAQUE as f64).round() as Opacity
}

pub fn opacity_fraction(o: Opacity) -> f64 {
    o.min(OPAQUE) as f64 / OPAQUE as f64
}

/// Stable identity of a window record.
///
/// X ids are recycled by the server; a destroyed window that is still fading
/// out and a new window with the same id are different records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WinKey(pub u64);

/// How the window contents have to be blended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinMode {
    /// Opaque contents, can be copied without blending
    Solid,
    /// Opaque visual painted with reduced opacity (window or frame)
    Trans,
    /// Visual with an alpha channel
    Argb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapState {
    #[default]
    Unmapped,
    Unviewable,
    Viewable,
}

/// `_NET_FRAME_EXTENTS` insets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameExtents {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl FrameExtents {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

/// Geometry carried by a ConfigureNotify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureGeometry {
    pub geometry: Geometry,
    pub border_width: u16,
    pub above: Option<Window>,
    pub override_redirect: bool,
}

/// Cached shadow picture and the size it was rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowPicture {
    pub picture: u32,
    pub width: u32,
    pub height: u32,
}

/// Compositor window state
///
/// Every server-side handle stored here (damage, pixmap, pictures) is owned
/// by this record and released exactly once when the record gives it up.
#[derive(Debug)]
pub struct CWindow {
    pub key: WinKey,

    /// Top-level window (frame, when a reparenting WM runs)
    pub id: Window,

    /// Client window carrying `WM_STATE`, if one was found
    pub client_win: Option<Window>,
    /// Window this one is grouped under for focus
    pub leader: Option<Window>,

    pub geometry: Geometry,
    pub border_width: u16,
    pub map_state: MapState,
    pub override_redirect: bool,
    pub input_only: bool,
    pub visual: u32,
    /// Visual carries an alpha channel
    pub argb_visual: bool,

    pub mode: WinMode,

    /// Damage object for change tracking
    pub damage: Option<u32>,
    /// Received its first damage since it was mapped
    pub damaged: bool,

    /// Pixmap naming the redirected contents
    pub pixmap: Option<u32>,
    pub picture: Option<u32>,
    /// Binding the contents failed; painted as contentless until remapped
    pub bind_failed: bool,

    pub shadow: bool,
    pub shadow_picture: Option<ShadowPicture>,

    /// Screen area covered by the window and its shadow
    pub extents: Option<Region>,
    /// Bounding shape in screen coordinates
    pub border_size: Option<Region>,
    pub bounding_shaped: bool,
    /// Clip computed during the top-down paint pass
    pub border_clip: Option<Region>,

    pub opacity: Opacity,
    /// Cached `_NET_WM_WINDOW_OPACITY`, `None` when unset
    pub opacity_prop: Option<Opacity>,
    pub dim: bool,
    pub window_type: WinType,
    pub focused: bool,
    pub fade: bool,
    pub frame_extents: FrameExtents,

    pub name: Option<String>,
    pub class_instance: Option<String>,
    pub class_general: Option<String>,

    /// A ConfigureNotify arrived while unmapped and waits for the next map
    pub need_configure: bool,
    pub queued_configure: Option<ConfigureGeometry>,

    pub destroyed: bool,
}

impl CWindow {
    pub fn new(key: WinKey, id: Window, geometry: Geometry, border_width: u16) -> Self {
        Self {
            key,
            id,
            client_win: None,
            leader: None,
            geometry,
            border_width,
            map_state: MapState::Unmapped,
            override_redirect: false,
            input_only: false,
            visual: 0,
            argb_visual: false,
            mode: WinMode::Solid,
            damage: None,
            damaged: false,
            pixmap: None,
            picture: None,
            bind_failed: false,
            shadow: false,
            shadow_picture: None,
            extents: None,
            border_size: None,
            bounding_shaped: false,
            border_clip: None,
            opacity: OPAQUE,
            opacity_prop: None,
            dim: false,
            window_type: WinType::Unknown,
            focused: false,
            fade: true,
            frame_extents: FrameExtents::default(),
            name: None,
            class_instance: None,
            class_general: None,
            need_configure: false,
            queued_configure: None,
            destroyed: false,
        }
    }

    /// Bounding box including the X border
    pub fn outer_rect(&self) -> Rect {
        self.geometry.outer_rect(self.border_width)
    }

    pub fn outer_size(&self) -> (u32, u32) {
        let bw = self.border_width as u32 * 2;
        (self.geometry.width + bw, self.geometry.height + bw)
    }

    pub fn is_viewable(&self) -> bool {
        self.map_state == MapState::Viewable
    }

    /// Client window, or the window itself when it has none
    pub fn client_or_self(&self) -> Window {
        self.client_win.unwrap_or(self.id)
    }

    pub fn is_offscreen(&self, screen_width: u32, screen_height: u32) -> bool {
        let r = self.outer_rect();
        r.x2 < 1 || r.y2 < 1 || r.x1 >= screen_width as i32 || r.y1 >= screen_height as i32
    }

    /// Drop cached regions after geometry, shape or frame changes
    pub fn invalidate_regions(&mut self) {
        self.extents = None;
        self.border_size = None;
        self.border_clip = None;
    }

    /// Blend mode for the current opacity and visual
    pub fn compute_mode(&self, frame_translucent: bool) -> WinMode {
        if self.argb_visual {
            WinMode::Argb
        } else if self.opacity < OPAQUE || (frame_translucent && !self.frame_extents.is_empty()) {
            WinMode::Trans
        } else {
            WinMode::Solid
        }
    }
}
