//! In-memory display server and recording painter for engine tests

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use x11rb::errors::ConnectionError;
use x11rb::protocol::xproto::{Atom, Window};

use crate::compositor::Compositor;
use crate::compositor::atoms::Atoms;
use crate::compositor::backend::{DrawOp, Painter, WindowAttrs, XServer};
use crate::compositor::c_window::{ConfigureGeometry, MapState};
use crate::compositor::error::{CompError, CompResult};
use crate::compositor::events::CompEvent;
use crate::compositor::region::Region;
use crate::compositor::shadow::ShadowImage;
use crate::config::{Config, Options};
use crate::shared::{Geometry, Rect};

const ROOT: Window = 0x1;

#[derive(Debug, Default)]
struct FakeWindow {
    attrs: Option<WindowAttrs>,
    children: Vec<Window>,
    shape: Option<Vec<Rect>>,
}

#[derive(Debug, Default)]
struct FakeState {
    windows: BTreeMap<Window, FakeWindow>,
    props32: HashMap<(Window, Atom), Vec<u32>>,
    text: HashMap<(Window, Atom), Vec<u8>>,
    /// damage id -> (window, pending window-relative damage)
    damage: BTreeMap<u32, (Window, Region)>,
    pixmaps: BTreeSet<u32>,
    tracked: BTreeSet<Window>,
    unredirected: bool,
    next_id: u32,
    sequence: u64,
}

impl FakeState {
    fn request(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        0x0040_0000 + self.next_id
    }
}

/// Display server double: windows, properties and resources live in memory
#[derive(Debug)]
pub struct FakeServer {
    width: u32,
    height: u32,
    state: RefCell<FakeState>,
}

fn bad(what: &str) -> CompError {
    CompError::Protocol(what.to_string())
}

impl FakeServer {
    pub fn new(width: u32, height: u32) -> Self {
        let mut state = FakeState::default();
        state.windows.insert(ROOT, FakeWindow::default());
        Self {
            width,
            height,
            state: RefCell::new(state),
        }
    }

    /// Add a top-level window above all others
    pub fn add_window(&self, id: Window, geometry: Geometry, mapped: bool) {
        let mut s = self.state.borrow_mut();
        let attrs = WindowAttrs {
            geometry,
            border_width: 0,
            map_state: if mapped {
                MapState::Viewable
            } else {
                MapState::Unmapped
            },
            override_redirect: false,
            input_only: false,
            visual: 0x21,
            argb_visual: false,
        };
        s.windows.insert(
            id,
            FakeWindow {
                attrs: Some(attrs),
                ..Default::default()
            },
        );
        if let Some(root) = s.windows.get_mut(&ROOT) {
            root.children.push(id);
        }
    }

    pub fn set_children(&self, parent: Window, children: Vec<Window>) {
        let mut s = self.state.borrow_mut();
        s.windows.entry(parent).or_default().children = children;
    }

    pub fn set_shape(&self, window: Window, rects: Option<Vec<Rect>>) {
        let mut s = self.state.borrow_mut();
        s.windows.entry(window).or_default().shape = rects;
    }

    pub fn set_property32(&self, window: Window, atom: Atom, value: Vec<u32>) {
        self.state.borrow_mut().props32.insert((window, atom), value);
    }

    pub fn set_text(&self, window: Window, atom: Atom, value: &[u8]) {
        self.state.borrow_mut().text.insert((window, atom), value.to_vec());
    }

    /// Report damage in window coordinates on the damage object of `window`
    pub fn queue_damage(&self, window: Window, rect: Rect) {
        let mut s = self.state.borrow_mut();
        for (w, pending) in s.damage.values_mut() {
            if *w == window {
                *pending = pending.union_rect(rect);
            }
        }
    }

    pub fn live_damage(&self) -> Vec<u32> {
        self.state.borrow().damage.keys().copied().collect()
    }

    pub fn live_pixmaps(&self) -> Vec<u32> {
        self.state.borrow().pixmaps.iter().copied().collect()
    }

    pub fn is_tracked(&self, window: Window) -> bool {
        self.state.borrow().tracked.contains(&window)
    }

    pub fn last_sequence(&self) -> u64 {
        self.state.borrow().sequence
    }

    pub fn is_redirected(&self) -> bool {
        !self.state.borrow().unredirected
    }

    /// Give `window` a visual with an alpha channel
    pub fn set_argb(&self, window: Window) {
        let mut s = self.state.borrow_mut();
        if let Some(attrs) = s.windows.get_mut(&window).and_then(|w| w.attrs.as_mut()) {
            attrs.argb_visual = true;
        }
    }

    pub fn set_override_redirect(&self, window: Window) {
        let mut s = self.state.borrow_mut();
        if let Some(attrs) = s.windows.get_mut(&window).and_then(|w| w.attrs.as_mut()) {
            attrs.override_redirect = true;
        }
    }
}

impl XServer for FakeServer {
    fn root(&self) -> Window {
        ROOT
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn query_tree(&self, window: Window) -> CompResult<Vec<Window>> {
        let s = self.state.borrow();
        s.windows
            .get(&window)
            .map(|w| w.children.clone())
            .ok_or_else(|| bad("BadWindow"))
    }

    fn window_attributes(&self, window: Window) -> CompResult<WindowAttrs> {
        let s = self.state.borrow();
        s.windows
            .get(&window)
            .and_then(|w| w.attrs)
            .ok_or_else(|| bad("BadWindow"))
    }

    fn track_window(&self, window: Window) -> CompResult<Vec<u64>> {
        let mut s = self.state.borrow_mut();
        s.tracked.insert(window);
        // event mask, then shape input
        Ok(vec![s.request(), s.request()])
    }

    fn untrack_window(&self, window: Window) -> CompResult<Vec<u64>> {
        let mut s = self.state.borrow_mut();
        s.tracked.remove(&window);
        Ok(vec![s.request(), s.request()])
    }

    fn track_client(&self, window: Window) -> CompResult<Vec<u64>> {
        let mut s = self.state.borrow_mut();
        s.tracked.insert(window);
        Ok(vec![s.request()])
    }

    fn create_damage(&self, window: Window) -> CompResult<(u32, u64)> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc();
        s.damage.insert(id, (window, Region::new()));
        Ok((id, s.request()))
    }

    fn destroy_damage(&self, damage: u32) -> CompResult<u64> {
        let mut s = self.state.borrow_mut();
        s.damage.remove(&damage);
        Ok(s.request())
    }

    fn subtract_damage(&self, damage: u32) -> CompResult<u64> {
        let mut s = self.state.borrow_mut();
        if let Some((_, pending)) = s.damage.get_mut(&damage) {
            *pending = Region::new();
        }
        Ok(s.request())
    }

    fn fetch_damage(&self, damage: u32) -> CompResult<(Region, u64)> {
        let mut s = self.state.borrow_mut();
        let seq = s.request();
        let parts = s
            .damage
            .get_mut(&damage)
            .map(|(_, pending)| std::mem::take(pending))
            .unwrap_or_default();
        Ok((parts, seq))
    }

    fn name_window_pixmap(&self, window: Window) -> CompResult<u32> {
        let mut s = self.state.borrow_mut();
        if !s.windows.contains_key(&window) {
            return Err(bad("BadWindow"));
        }
        let id = s.alloc();
        s.pixmaps.insert(id);
        s.request();
        Ok(id)
    }

    fn free_pixmap(&self, pixmap: u32) -> CompResult<u64> {
        let mut s = self.state.borrow_mut();
        if !s.pixmaps.remove(&pixmap) {
            return Err(bad("BadPixmap"));
        }
        Ok(s.request())
    }

    fn get_property32(&self, window: Window, property: Atom) -> CompResult<Vec<u32>> {
        let s = self.state.borrow();
        Ok(s.props32.get(&(window, property)).cloned().unwrap_or_default())
    }

    fn get_text_property(&self, window: Window, property: Atom) -> CompResult<Option<Vec<u8>>> {
        let s = self.state.borrow();
        Ok(s.text.get(&(window, property)).cloned())
    }

    fn bounding_shape(&self, window: Window) -> CompResult<Option<Vec<Rect>>> {
        let s = self.state.borrow();
        Ok(s.windows.get(&window).and_then(|w| w.shape.clone()))
    }

    fn set_redirected(&self, redirected: bool) -> CompResult<()> {
        let mut s = self.state.borrow_mut();
        s.unredirected = !redirected;
        s.request();
        Ok(())
    }
}

/// A call observed by [`RecordingPainter`]
#[derive(Debug, Clone, PartialEq)]
pub enum PaintCall {
    Root(Region),
    Draw(DrawOp, Region),
    Dim(Rect, f64, Region),
    Present(Region),
}

#[derive(Debug, Default)]
pub struct RecordingPainter {
    pub calls: Vec<PaintCall>,
    pub root_resets: usize,
    pub shadow_uploads: usize,
    pub fail_bind: bool,
    /// Shadow uploads fail with a protocol error
    pub fail_shadow: bool,
    /// Presenting fails as if the connection dropped
    pub fail_present: bool,
    pub released: bool,
    pictures: BTreeSet<u32>,
    next: u32,
}

impl RecordingPainter {
    fn alloc(&mut self) -> u32 {
        self.next += 1;
        let id = 0x0080_0000 + self.next;
        self.pictures.insert(id);
        id
    }

    pub fn live_pictures(&self) -> Vec<u32> {
        self.pictures.iter().copied().collect()
    }
}

impl Painter for RecordingPainter {
    fn bind_window(&mut self, window: Window, _pixmap: u32, _visual: u32) -> CompResult<u32> {
        if self.fail_bind {
            return Err(CompError::BindFailed {
                window,
                reason: "BadMatch".into(),
            });
        }
        Ok(self.alloc())
    }

    fn create_shadow(&mut self, _image: &ShadowImage) -> CompResult<u32> {
        if self.fail_shadow {
            return Err(bad("BadAlloc"));
        }
        self.shadow_uploads += 1;
        Ok(self.alloc())
    }

    fn free_picture(&mut self, picture: u32) {
        assert!(self.pictures.remove(&picture), "picture {:#x} freed twice", picture);
    }

    fn paint_root(&mut self, region: &Region) -> CompResult<()> {
        self.calls.push(PaintCall::Root(region.clone()));
        Ok(())
    }

    fn reset_root(&mut self) {
        self.root_resets += 1;
    }

    fn draw(&mut self, op: &DrawOp, clip: &Region) -> CompResult<()> {
        self.calls.push(PaintCall::Draw(*op, clip.clone()));
        Ok(())
    }

    fn dim(&mut self, dst: Rect, alpha: f64, clip: &Region) -> CompResult<()> {
        self.calls.push(PaintCall::Dim(dst, alpha, clip.clone()));
        Ok(())
    }

    fn present(&mut self, region: &Region) -> CompResult<()> {
        if self.fail_present {
            return Err(CompError::Connection(ConnectionError::UnknownError));
        }
        self.calls.push(PaintCall::Present(region.clone()));
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) {}

    fn set_shadow_color(&mut self, _color: [f64; 3]) {}

    fn release(&mut self) {
        self.released = true;
    }
}

pub fn default_options() -> Options {
    Config::with_defaults()
        .resolve()
        .expect("default options resolve")
}

pub fn compositor(server: FakeServer) -> Compositor<FakeServer, RecordingPainter> {
    Compositor::new(server, RecordingPainter::default(), Atoms::fake(), default_options())
}

pub fn configure(window: Window, geometry: Geometry, above: Option<Window>) -> CompEvent {
    CompEvent::Configure {
        window,
        config: ConfigureGeometry {
            geometry,
            border_width: 0,
            above,
            override_redirect: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaped_windows_lose_shadow_when_configured() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(0, 0, 50, 50), true);
        server.set_shape(0x10, Some(vec![Rect::new(0, 0, 25, 50)]));
        let mut options = default_options();
        options.shadow_ignore_shaped = true;
        let mut comp = Compositor::new(server, RecordingPainter::default(), Atoms::fake(), options);
        comp.scan().unwrap();
        assert!(comp.window(0x10).unwrap().bounding_shaped);
        assert!(!comp.window(0x10).unwrap().shadow);

        comp.server().set_shape(0x10, None);
        comp.handle_event(1, CompEvent::Shape { window: 0x10, bounding_shaped: false });
        assert!(comp.window(0x10).unwrap().shadow);
    }

    #[test]
    fn client_window_found_below_frame() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(0, 0, 50, 50), false);
        server.set_children(0x10, vec![0x11, 0x12]);
        server.set_children(0x12, vec![0x13]);
        let atoms = Atoms::fake();
        server.set_property32(0x13, atoms.wm_state, vec![1, 0]);
        server.set_property32(0x13, atoms.net_wm_window_type, vec![
            atoms.window_type_atom(crate::compositor::wintype::WinType::Dialog).unwrap(),
        ]);
        server.set_text(0x13, atoms.net_wm_name, b"settings");
        server.set_text(0x13, x11rb::protocol::xproto::AtomEnum::WM_CLASS.into(), b"prefs\0Prefs\0");
        let mut comp = Compositor::new(server, RecordingPainter::default(), atoms, default_options());
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Map { window: 0x10 });

        let w = comp.window(0x10).unwrap();
        assert_eq!(w.client_win, Some(0x13));
        assert_eq!(w.window_type, crate::compositor::wintype::WinType::Dialog);
        assert_eq!(w.name.as_deref(), Some("settings"));
        assert_eq!(w.class_general.as_deref(), Some("Prefs"));
        assert!(comp.server().is_tracked(0x13));
    }
}
