//! Event dispatch and window lifecycle
//!
//! Server notifications arrive translated into [`CompEvent`] together with
//! the sequence number the server attached to them. Every handler tolerates
//! windows that vanished in the meantime: an unknown id is a no-op, and
//! requests that may race with destruction have their sequence queued in the
//! ignore tracker.

use tracing::{debug, trace, warn};
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};

use crate::compositor::Compositor;
use crate::compositor::backend::{Painter, XServer};
use crate::compositor::c_window::{CWindow, ConfigureGeometry, MapState, OPAQUE, WinKey};
use crate::compositor::error::CompResult;
use crate::compositor::fade::FadeCallback;
use crate::shared::Rect;

/// Notifications the engine reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompEvent {
    Create { window: Window, parent: Window },
    Configure { window: Window, config: ConfigureGeometry },
    Destroy { window: Window },
    Map { window: Window },
    Unmap { window: Window },
    Reparent { window: Window, parent: Window },
    Circulate { window: Window, place_on_top: bool },
    /// Contents of a top-level changed
    Damage { window: Window },
    Property { window: Window, atom: Atom },
    Shape { window: Window, bounding_shaped: bool },
    /// Part of the screen needs repainting (root or overlay exposure)
    Expose { rect: Rect },
    /// The server rejected a request
    Error {
        kind: String,
        major_opcode: u8,
        minor_opcode: u16,
        bad_value: u32,
    },
}

impl<S: XServer, P: Painter> Compositor<S, P> {
    /// Dispatch one event carrying server sequence `sequence`
    pub fn handle_event(&mut self, sequence: u64, event: CompEvent) {
        self.ignore.discard_before(sequence);
        trace!("event #{}: {:?}", sequence, event);

        match event {
            CompEvent::Create { window, parent } => {
                if parent == self.root {
                    let top = self.registry.top(None);
                    self.add_win(window, top);
                }
            }
            CompEvent::Configure { window, config } => self.configure_win(window, config),
            CompEvent::Destroy { window } => self.destroy_win(window),
            CompEvent::Map { window } => self.map_win(window),
            CompEvent::Unmap { window } => self.unmap_win(window),
            CompEvent::Reparent { window, parent } => self.reparent_win(window, parent),
            CompEvent::Circulate {
                window,
                place_on_top,
            } => self.circulate_win(window, place_on_top),
            CompEvent::Damage { window } => self.damage_win(window),
            CompEvent::Property { window, atom } => self.property_changed(window, atom),
            CompEvent::Shape {
                window,
                bounding_shaped,
            } => self.shape_changed(window, bounding_shaped),
            CompEvent::Expose { rect } => self.damage.add_rect(rect),
            CompEvent::Error {
                kind,
                major_opcode,
                minor_opcode,
                bad_value,
            } => {
                if self.ignore.should_ignore(sequence) {
                    trace!(
                        "ignored X error {} for request {}.{} #{}",
                        kind, major_opcode, minor_opcode, sequence
                    );
                } else {
                    warn!(
                        "X error {} for request {}.{} #{} (resource {:#x})",
                        kind, major_opcode, minor_opcode, sequence, bad_value
                    );
                }
            }
        }
    }

    /// Queue the sequences of requests whose errors are expected should
    /// `window` vanish first
    fn ignore_result<I>(&mut self, what: &str, window: Window, result: CompResult<I>)
    where
        I: IntoIterator<Item = u64>,
    {
        match result {
            Ok(sequences) => sequences.into_iter().for_each(|seq| self.ignore.set_ignore(seq)),
            Err(e) => debug!("{} on {:#x} failed: {}", what, window, e),
        }
    }

    /// Start tracking `id` directly above `above` (bottom when `None`).
    ///
    /// Returns the record key, or `None` when the window is already gone.
    pub(crate) fn add_win(&mut self, id: Window, above: Option<Window>) -> Option<WinKey> {
        if id == self.root {
            return None;
        }
        if let Some(key) = self.registry.find(id) {
            return Some(key);
        }
        let attrs = match self.server.window_attributes(id) {
            Ok(a) => a,
            Err(e) => {
                debug!("Window {:#x} vanished before it could be tracked: {}", id, e);
                return None;
            }
        };

        let key = self.registry.allocate_key();
        let mut w = CWindow::new(key, id, attrs.geometry, attrs.border_width);
        w.override_redirect = attrs.override_redirect;
        w.input_only = attrs.input_only;
        w.visual = attrs.visual;
        w.argb_visual = attrs.argb_visual;
        w.opacity = if self.fades.enabled() { 0 } else { OPAQUE };
        w.mode = w.compute_mode(self.options.frame_translucent());
        if !attrs.input_only {
            match self.server.create_damage(id) {
                Ok((d, seq)) => {
                    w.damage = Some(d);
                    self.ignore.set_ignore(seq);
                }
                Err(e) => warn!("damage_create failed for window {:#x}: {}", id, e),
            }
        }
        self.registry.insert(w, above);
        debug!("Compositor: Added window {:#x}", id);

        if attrs.map_state == MapState::Viewable {
            self.map_win(id);
        }
        Some(key)
    }

    pub(crate) fn map_win(&mut self, id: Window) {
        let Some(key) = self.registry.find(id) else {
            return;
        };
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
        if w.is_viewable() {
            return;
        }
        w.map_state = MapState::Viewable;
        w.damaged = false;
        w.bind_failed = false;
        if w.input_only {
            return;
        }
        let known_client = w.client_win;

        let tracked = self.server.track_window(id);
        self.ignore_result("track_window", id, tracked);

        if known_client.is_none() {
            if let Some(client) = self.find_client(id) {
                if client != id {
                    let tracked = self.server.track_client(client);
                    self.ignore_result("track_client", client, tracked);
                }
                if let Some(w) = self.registry.get_mut(key) {
                    w.client_win = Some(client);
                }
            }
        }

        let shaped = matches!(self.server.bounding_shape(id), Ok(Some(_)));
        if let Some(w) = self.registry.get_mut(key) {
            w.bounding_shaped = shaped;
        }
        self.determine_wintype(key);
        self.refresh_frame_extents(key);
        self.refresh_name(key);
        self.refresh_class(key);
        self.refresh_leader(key);
        self.determine_focus(key);
        self.determine_fade(key);
        self.determine_shadow(key);

        let queued = self.registry.get_mut(key).and_then(|w| {
            w.need_configure = false;
            w.queued_configure.take()
        });
        if let Some(config) = queued {
            self.apply_configure(key, config, false);
        }

        let frame_translucent = self.options.frame_translucent();
        let animate = self.fade_allowed(key, true);
        let fading = self.fades.is_fading(key);
        if let Some(w) = self.registry.get_mut(key) {
            if animate && !fading {
                w.opacity = 0;
            }
            w.mode = w.compute_mode(frame_translucent);
            w.invalidate_regions();
        }
        self.refetch_opacity_prop(key);
        self.retarget_opacity(key, true);
        self.calc_dim(key);
        // the group of the active window may only now be resolvable
        let active = self.registry.get(key).is_some_and(|w| self.is_active(w));
        if active && self.options.track_leader() {
            self.refocus_all();
        }
        debug!("Compositor: Mapped window {:#x}", id);
    }

    pub(crate) fn unmap_win(&mut self, id: Window) {
        let Some(key) = self.registry.find(id) else {
            return;
        };
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
        if !w.is_viewable() {
            return;
        }
        w.map_state = MapState::Unmapped;
        let painted = w.damaged;

        let untracked = self.server.untrack_window(id);
        self.ignore_result("untrack_window", id, untracked);

        let animate = painted && self.fade_allowed(key, true);
        let step = self.options.fade_out_step;
        self.fade_to(key, 0, step, FadeCallback::FinishUnmap, true, animate);
        debug!("Compositor: Unmapped window {:#x}", id);
    }

    pub(crate) fn destroy_win(&mut self, id: Window) {
        let Some(key) = self.registry.find(id) else {
            trace!("destroy of untracked window {:#x}", id);
            return;
        };
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
        w.destroyed = true;
        w.map_state = MapState::Unmapped;
        let painted = w.damaged;
        let framed_argb = w.argb_visual && w.client_win.is_some_and(|c| c != w.id);
        let skip_fade = self.options.no_fading_destroyed_argb && framed_argb;

        if !skip_fade && (self.fades.is_fading(key) || (painted && self.fade_allowed(key, true))) {
            let step = self.options.fade_out_step;
            self.fade_to(key, 0, step, FadeCallback::FinishDestroy, true, true);
        } else {
            self.finish_destroy(key);
        }
        debug!("Compositor: Destroyed window {:#x}", id);
    }

    pub(crate) fn configure_win(&mut self, id: Window, config: ConfigureGeometry) {
        if id == self.root {
            self.set_screen_size(config.geometry.width, config.geometry.height);
            return;
        }
        let Some(key) = self.registry.find(id) else {
            return;
        };
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
        if !w.is_viewable() {
            w.need_configure = true;
            w.queued_configure = Some(config);
            self.registry.restack(key, config.above);
            return;
        }
        self.apply_configure(key, config, true);
    }

    /// Move/resize a window, repainting both the old and new area
    pub(crate) fn apply_configure(&mut self, key: WinKey, config: ConfigureGeometry, restack: bool) {
        self.damage_window(key);
        if restack {
            self.registry.restack(key, config.above);
        }
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
        let resized = w.geometry.width != config.geometry.width
            || w.geometry.height != config.geometry.height
            || w.border_width != config.border_width;
        w.geometry = config.geometry;
        w.border_width = config.border_width;
        w.override_redirect = config.override_redirect;
        w.need_configure = false;
        w.queued_configure = None;
        w.invalidate_regions();
        if resized {
            trace!("window {:#x} resized, dropping contents", w.id);
            if let Some(picture) = w.picture.take() {
                self.painter.free_picture(picture);
            }
            if let Some(pixmap) = w.pixmap.take() {
                if let Err(e) = self.server.free_pixmap(pixmap) {
                    debug!("free_pixmap {:#x} failed: {}", pixmap, e);
                }
            }
            if let Some(sp) = w.shadow_picture.take() {
                self.painter.free_picture(sp.picture);
            }
            w.bind_failed = false;
        }
        self.damage_window(key);
    }

    pub(crate) fn circulate_win(&mut self, id: Window, place_on_top: bool) {
        let Some(key) = self.registry.find(id) else {
            return;
        };
        let above = if place_on_top {
            self.registry.top(Some(key))
        } else {
            None
        };
        if self.registry.restack(key, above) {
            self.damage_window(key);
        }
    }

    pub(crate) fn reparent_win(&mut self, id: Window, parent: Window) {
        if parent == self.root {
            let top = self.registry.top(None);
            self.add_win(id, top);
            return;
        }
        self.destroy_win(id);

        // A client reparented into a frame we track
        let Some(frame) = self.registry.find(parent) else {
            return;
        };
        let needs_client = self
            .registry
            .get(frame)
            .is_some_and(|w| w.client_win.is_none() || w.client_win == Some(w.id));
        if !needs_client || self.prop32(id, self.atoms.wm_state).is_empty() {
            return;
        }
        let tracked = self.server.track_client(id);
        self.ignore_result("track_client", id, tracked);
        if let Some(w) = self.registry.get_mut(frame) {
            debug!("Compositor: {:#x} is the client of {:#x}", id, w.id);
            w.client_win = Some(id);
        }
        self.determine_wintype(frame);
        self.refresh_frame_extents(frame);
        self.refresh_name(frame);
        self.refresh_class(frame);
        self.refresh_leader(frame);
        self.refetch_opacity_prop(frame);
        self.refresh_flags(frame);
    }

    pub(crate) fn damage_win(&mut self, id: Window) {
        let Some(key) = self.registry.find(id) else {
            return;
        };
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let Some(damage) = w.damage else {
            return;
        };

        if !w.is_viewable() {
            let result = self.server.subtract_damage(damage).map(Some);
            self.ignore_result("damage_subtract", id, result);
            return;
        }

        if !w.damaged {
            // First frame since map: the whole window is new
            if w.pixmap.is_some() || w.picture.is_some() {
                self.release_contents(key);
            }
            let result = self.server.subtract_damage(damage).map(Some);
            self.ignore_result("damage_subtract", id, result);
            if let Some(w) = self.registry.get_mut(key) {
                w.damaged = true;
            }
            self.damage_window(key);
            return;
        }

        let bw = w.border_width as i32;
        let (dx, dy) = (w.geometry.x + bw, w.geometry.y + bw);
        match self.server.fetch_damage(damage) {
            Ok((parts, seq)) => {
                self.ignore.set_ignore(seq);
                self.damage.add_region(&parts.translate(dx, dy));
            }
            Err(e) => debug!("damage fetch for {:#x} failed: {}", id, e),
        }
    }

    pub(crate) fn property_changed(&mut self, window: Window, atom: Atom) {
        if window == self.root {
            if self.atoms.is_root_background(atom) {
                debug!("Compositor: Root background changed");
                self.painter.reset_root();
                self.damage.add_screen();
            } else if atom == self.atoms.net_active_window {
                self.update_focus();
            }
            return;
        }

        let Some(key) = self.registry.find_toplevel(window) else {
            return;
        };
        let a = &self.atoms;
        if atom == a.net_wm_window_opacity {
            self.calc_opacity(key, true);
        } else if atom == a.net_frame_extents {
            self.refresh_frame_extents(key);
        } else if atom == a.net_wm_window_type {
            self.determine_wintype(key);
            self.refresh_flags(key);
        } else if atom == a.net_wm_name || atom == u32::from(AtomEnum::WM_NAME) {
            self.refresh_name(key);
            self.refresh_flags(key);
        } else if atom == u32::from(AtomEnum::WM_CLASS) {
            self.refresh_class(key);
            self.refresh_flags(key);
        } else if atom == a.wm_client_leader || atom == u32::from(AtomEnum::WM_TRANSIENT_FOR) {
            self.refresh_leader(key);
            if self.options.track_leader() {
                self.refocus_all();
            }
        }
    }

    /// `_NET_ACTIVE_WINDOW` changed
    pub(crate) fn update_focus(&mut self) {
        self.active_window = self.fetch_active_window();
        trace!("active window {:?}", self.active_window);
        self.refocus_all();
    }

    /// Re-evaluate focus of every shown window
    fn refocus_all(&mut self) {
        for key in self.registry.keys() {
            let live = self
                .registry
                .get(key)
                .is_some_and(|w| !w.destroyed && w.is_viewable());
            if live && self.determine_focus(key) {
                self.calc_opacity(key, false);
                self.calc_dim(key);
            }
        }
    }

    pub(crate) fn shape_changed(&mut self, id: Window, bounding_shaped: bool) {
        let Some(key) = self.registry.find(id) else {
            return;
        };
        self.damage_window(key);
        if let Some(w) = self.registry.get_mut(key) {
            w.bounding_shaped = bounding_shaped;
            w.invalidate_regions();
        }
        self.determine_shadow(key);
        self.damage_window(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::testing::{FakeServer, compositor, configure};
    use crate::shared::Geometry;
    use std::time::{Duration, Instant};

    fn geom() -> Geometry {
        Geometry::new(10, 10, 100, 80)
    }

    #[test]
    fn create_configure_circulate_mirror_server_stacking() {
        let server = FakeServer::new(800, 600);
        let root = server.root();
        let mut comp = compositor(server);
        for (seq, id) in [(1, 0x10), (2, 0x20), (3, 0x30)] {
            comp.server().add_window(id, geom(), false);
            comp.handle_event(seq, CompEvent::Create { window: id, parent: root });
        }
        assert_eq!(comp.registry().stacking(), vec![0x10, 0x20, 0x30]);

        comp.handle_event(4, configure(0x10, geom(), Some(0x30)));
        assert_eq!(comp.registry().stacking(), vec![0x20, 0x30, 0x10]);
        comp.handle_event(5, CompEvent::Circulate { window: 0x30, place_on_top: false });
        assert_eq!(comp.registry().stacking(), vec![0x30, 0x20, 0x10]);
        comp.handle_event(6, CompEvent::Circulate { window: 0x30, place_on_top: true });
        assert_eq!(comp.registry().stacking(), vec![0x20, 0x10, 0x30]);

        // duplicates change nothing
        comp.handle_event(7, CompEvent::Circulate { window: 0x30, place_on_top: true });
        comp.handle_event(8, CompEvent::Create { window: 0x20, parent: root });
        assert_eq!(comp.registry().stacking(), vec![0x20, 0x10, 0x30]);
    }

    #[test]
    fn configure_while_unmapped_is_applied_on_map() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), false);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        let moved = Geometry::new(200, 100, 50, 40);
        comp.handle_event(1, configure(0x10, moved, None));
        let w = comp.window(0x10).unwrap();
        assert!(w.need_configure);
        assert_eq!(w.geometry, geom());

        comp.handle_event(2, CompEvent::Map { window: 0x10 });
        let w = comp.window(0x10).unwrap();
        assert!(!w.need_configure);
        assert_eq!(w.geometry, moved);
    }

    #[test]
    fn damage_first_covers_window_then_translated_parts() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), true);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        comp.damage.take();

        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        let first = comp.damage.take();
        assert!(first.contains_region(&crate::compositor::region::Region::from_rect(Rect::new(
            10, 10, 100, 80
        ))));

        comp.server().queue_damage(0x10, Rect::new(5, 5, 10, 10));
        comp.handle_event(2, CompEvent::Damage { window: 0x10 });
        assert_eq!(comp.damage.take().rects(), &[Rect::new(15, 15, 10, 10)]);
    }

    #[test]
    fn destroy_during_fade_out_defers_release() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), true);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        let t0 = Instant::now();
        let mut t = t0;
        comp.run_fades(t);
        while !comp.fades().is_empty() {
            t += Duration::from_millis(10);
            comp.run_fades(t);
        }
        assert_eq!(comp.window(0x10).unwrap().opacity, OPAQUE);

        comp.handle_event(2, CompEvent::Unmap { window: 0x10 });
        assert!(comp.fades().len() == 1);
        comp.handle_event(3, CompEvent::Destroy { window: 0x10 });
        assert_eq!(comp.registry().len(), 1);
        assert!(comp.window(0x10).is_none());
        // a second destroy for the same id is a no-op
        comp.handle_event(4, CompEvent::Destroy { window: 0x10 });
        assert_eq!(comp.registry().len(), 1);

        while !comp.fades().is_empty() {
            t += Duration::from_millis(10);
            comp.run_fades(t);
        }
        assert!(comp.registry().is_empty());
        assert!(comp.server().live_damage().is_empty());
    }

    #[test]
    fn destroy_without_fade_releases_immediately() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), false);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Destroy { window: 0x10 });
        assert!(comp.registry().is_empty());
        comp.handle_event(2, CompEvent::Destroy { window: 0x10 });
        assert!(comp.registry().is_empty());
    }

    #[test]
    fn errors_for_raced_requests_are_suppressed_once() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), false);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        let next = comp.server().last_sequence() + 1;
        comp.handle_event(next, CompEvent::Destroy { window: 0x10 });
        let seq = comp.server().last_sequence();
        assert_eq!(comp.ignore.len(), 1);

        comp.handle_event(seq, error(143, 2));
        assert!(comp.ignore.is_empty());
        // an unrelated later error is not swallowed
        assert!(!comp.ignore.should_ignore(seq + 5));
    }

    fn error(major_opcode: u8, minor_opcode: u16) -> CompEvent {
        CompEvent::Error {
            kind: "BadWindow".into(),
            major_opcode,
            minor_opcode,
            bad_value: 0x10,
        }
    }

    #[test]
    fn every_request_of_an_untrack_is_ignored() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), true);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        let first = comp.server().last_sequence() + 1;
        comp.handle_event(first, CompEvent::Unmap { window: 0x10 });
        assert_eq!(comp.server().last_sequence(), first + 1);
        assert_eq!(comp.ignore.len(), 2);

        // ChangeWindowAttributes, then ShapeSelectInput
        comp.handle_event(first, error(2, 0));
        assert_eq!(comp.ignore.len(), 1);
        comp.handle_event(first + 1, error(129, 6));
        assert!(comp.ignore.is_empty());
    }

    #[test]
    fn damage_fetch_is_ignored_when_the_window_died() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), true);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        comp.server().queue_damage(0x10, Rect::new(0, 0, 5, 5));

        let next = comp.server().last_sequence() + 1;
        comp.handle_event(next, CompEvent::Damage { window: 0x10 });
        assert_eq!(comp.server().last_sequence(), next);
        assert_eq!(comp.ignore.len(), 1);
        comp.handle_event(next, error(143, 3));
        assert!(comp.ignore.is_empty());
    }

    #[test]
    fn stale_ignore_entries_expire_with_newer_events() {
        let server = FakeServer::new(800, 600);
        server.add_window(0x10, geom(), true);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Unmap { window: 0x10 });
        assert!(!comp.ignore.is_empty());
        let later = comp.server().last_sequence() + 1;
        comp.handle_event(later, CompEvent::Expose { rect: Rect::new(0, 0, 1, 1) });
        assert!(comp.ignore.is_empty());
    }

    #[test]
    fn reparent_moves_windows_in_and_out_of_tracking() {
        let server = FakeServer::new(800, 600);
        let root = server.root();
        server.add_window(0x10, geom(), true);
        server.add_window(0x20, geom(), false);
        let wm_state = comp_atoms().wm_state;
        server.set_property32(0x20, wm_state, vec![1, 0]);
        let mut comp = compositor(server);
        comp.scan().unwrap();

        comp.handle_event(1, CompEvent::Reparent { window: 0x20, parent: 0x10 });
        assert!(comp.window(0x20).is_none());
        assert_eq!(comp.window(0x10).unwrap().client_win, Some(0x20));
        assert_eq!(comp.registry().find_toplevel(0x20), comp.registry().find(0x10));

        comp.handle_event(2, CompEvent::Reparent { window: 0x30, parent: root });
        assert!(comp.window(0x30).is_none());
        comp.server().add_window(0x40, geom(), false);
        comp.handle_event(3, CompEvent::Reparent { window: 0x40, parent: root });
        assert_eq!(comp.registry().stacking(), vec![0x10, 0x40]);
    }

    #[test]
    fn root_events_resize_and_repaint() {
        let server = FakeServer::new(800, 600);
        let root = server.root();
        let mut comp = compositor(server);
        comp.scan().unwrap();
        comp.damage.take();
        comp.handle_event(1, CompEvent::Expose { rect: Rect::new(0, 0, 10, 10) });
        assert_eq!(comp.damage.pending().area(), 100);

        comp.handle_event(2, configure(root, Geometry::new(0, 0, 1024, 768), None));
        assert_eq!(comp.screen_size(), (1024, 768));
        assert_eq!(comp.damage.take().area(), 1024 * 768);

        let bg = comp_atoms().xrootpmap_id;
        comp.handle_event(3, CompEvent::Property { window: root, atom: bg });
        assert_eq!(comp.painter().root_resets, 1);
        assert_eq!(comp.damage.take().area(), 1024 * 768);
    }

    #[test]
    fn focus_changes_follow_active_window() {
        let server = FakeServer::new(800, 600);
        let root = server.root();
        server.add_window(0x10, geom(), true);
        server.add_window(0x20, geom(), true);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        assert!(!comp.window(0x10).unwrap().focused);

        let active = comp_atoms().net_active_window;
        comp.server().set_property32(root, active, vec![0x10]);
        comp.handle_event(1, CompEvent::Property { window: root, atom: active });
        assert!(comp.window(0x10).unwrap().focused);
        assert!(!comp.window(0x20).unwrap().focused);
    }

    fn comp_atoms() -> crate::compositor::atoms::Atoms {
        crate::compositor::atoms::Atoms::fake()
    }
}
