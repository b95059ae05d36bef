//! Compositor Module
//!
//! The compositing engine: a mirror of the root window's children, the
//! damage they produced, their opacity animations and the pipeline that
//! turns all of it into frames. `Compositor` is the single context object;
//! it talks to the display only through the [`XServer`] and [`Painter`]
//! seams so it can be driven without a running server.

pub mod atoms;
pub mod backend;
pub mod c_window;
pub mod damage;
pub mod error;
pub mod events;
pub mod fade;
pub mod ignore;
pub mod paint;
pub mod region;
pub mod registry;
pub mod renderer;
pub mod shadow;
pub mod wintype;
pub mod x11;

#[cfg(test)]
pub mod testing;

use std::time::{Duration, Instant};

use tracing::{debug, info, trace};
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};

use crate::config::{Options, any_match, rule_opacity};
use crate::shared::Rect;
use atoms::Atoms;
use backend::{Painter, XServer};
use c_window::{
    CWindow, FrameExtents, OPAQUE, Opacity, WinKey, WinMode, opacity_fraction, opacity_from_prop,
};
use damage::DamageAccumulator;
use error::CompResult;
use fade::{FadeCallback, FadeScheduler, FadeUpdate};
use ignore::IgnoreTracker;
use region::Region;
use registry::WindowRegistry;
use shadow::ShadowGenerator;
use wintype::WinType;

/// Longest leader chain followed when grouping windows
const LEADER_DEPTH: usize = 20;

pub struct Compositor<S: XServer, P: Painter> {
    server: S,
    painter: P,
    atoms: Atoms,
    options: Options,
    registry: WindowRegistry,
    damage: DamageAccumulator,
    fades: FadeScheduler,
    ignore: IgnoreTracker,
    shadows: ShadowGenerator,
    root: Window,
    screen_width: u32,
    screen_height: u32,
    /// Value of the root's `_NET_ACTIVE_WINDOW`
    active_window: Option<Window>,
    /// Top-level windows are redirected and painted by us
    redirected: bool,
    /// Since when the screen has been covered by a single solid window
    covered_since: Option<Instant>,
}

impl<S: XServer, P: Painter> Compositor<S, P> {
    /// Create a new compositor
    pub fn new(server: S, mut painter: P, atoms: Atoms, options: Options) -> Self {
        let root = server.root();
        let (screen_width, screen_height) = server.screen_size();
        painter.set_shadow_color(options.shadow_color);
        info!(
            "Initializing compositor for root {:#x} ({}x{})",
            root, screen_width, screen_height
        );

        Self {
            server,
            painter,
            atoms,
            registry: WindowRegistry::new(),
            damage: DamageAccumulator::new(screen_width, screen_height),
            fades: FadeScheduler::new(options.fading, options.fade_delta),
            ignore: IgnoreTracker::new(),
            shadows: ShadowGenerator::new(options.shadow_radius),
            options,
            root,
            screen_width,
            screen_height,
            active_window: None,
            redirected: true,
            covered_since: None,
        }
    }

    /// Adopt the windows that already exist, bottom to top
    pub fn scan(&mut self) -> CompResult<()> {
        self.active_window = self.fetch_active_window();
        let children = self.server.query_tree(self.root)?;
        let mut above = None;
        for id in children {
            if self.add_win(id, above).is_some() {
                above = Some(id);
            }
        }
        info!("Compositor: Adopted {} windows", self.registry.len());
        self.damage.add_screen();
        Ok(())
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    #[cfg(test)]
    pub fn painter(&self) -> &P {
        &self.painter
    }

    #[cfg(test)]
    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn damage(&self) -> &DamageAccumulator {
        &self.damage
    }

    #[cfg(test)]
    pub fn fades(&self) -> &FadeScheduler {
        &self.fades
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    #[cfg(test)]
    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    /// Live record of a top-level window
    #[cfg(test)]
    pub fn window(&self, id: Window) -> Option<&CWindow> {
        self.registry.find(id).and_then(|k| self.registry.get(k))
    }

    /// Repaint everything on the next pass
    pub fn force_redraw(&mut self) {
        self.damage.add_screen();
    }

    /// Time until the fade scheduler wants to run again
    pub fn fade_deadline(&self, now: Instant) -> Option<Duration> {
        self.fades.next_tick_deadline(now)
    }

    /// Time until a pending unredirection is due
    pub fn unredirect_deadline(&self, now: Instant) -> Option<Duration> {
        if !self.redirected {
            return None;
        }
        self.covered_since
            .map(|since| (since + self.options.unredir_delay).saturating_duration_since(now))
    }

    pub(crate) fn set_screen_size(&mut self, width: u32, height: u32) {
        if (width, height) == (self.screen_width, self.screen_height) {
            return;
        }
        info!("Compositor: Screen resized to {}x{}", width, height);
        self.screen_width = width;
        self.screen_height = height;
        self.damage.set_screen(width, height);
        self.painter.resize(width, height);
        self.damage.add_screen();
    }

    // Regions

    /// Screen area covered by a window and its shadow
    fn extents_of(&self, w: &CWindow) -> Region {
        let outer = w.outer_rect();
        let region = Region::from_rect(outer);
        if !w.shadow {
            return region;
        }
        let (ow, oh) = w.outer_size();
        let (sw, sh) = self.shadows.shadow_size(ow, oh);
        if sw == 0 || sh == 0 {
            return region;
        }
        region.union_rect(Rect::new(
            outer.x1 + self.options.shadow_offset_x,
            outer.y1 + self.options.shadow_offset_y,
            sw as i32,
            sh as i32,
        ))
    }

    /// Cached extents of `key`, computing them when stale
    pub(crate) fn ensure_extents(&mut self, key: WinKey) -> Region {
        let Some(w) = self.registry.get(key) else {
            return Region::new();
        };
        if let Some(e) = &w.extents {
            return e.clone();
        }
        let extents = self.extents_of(w);
        if let Some(w) = self.registry.get_mut(key) {
            w.extents = Some(extents.clone());
        }
        extents
    }

    /// Queue a repaint of everything `key` covers, if it is on screen
    pub(crate) fn damage_window(&mut self, key: WinKey) {
        if !self.registry.get(key).is_some_and(|w| w.damaged) {
            return;
        }
        let extents = self.ensure_extents(key);
        self.damage.add_region(&extents);
    }

    // Property access

    fn prop32(&self, window: Window, property: Atom) -> Vec<u32> {
        self.server
            .get_property32(window, property)
            .unwrap_or_else(|e| {
                debug!("property {} of {:#x} unavailable: {}", property, window, e);
                Vec::new()
            })
    }

    fn text_prop(&self, window: Window, property: Atom) -> Option<Vec<u8>> {
        self.server
            .get_text_property(window, property)
            .unwrap_or_else(|e| {
                debug!("text property {} of {:#x} unavailable: {}", property, window, e);
                None
            })
    }

    fn fetch_active_window(&self) -> Option<Window> {
        self.prop32(self.root, self.atoms.net_active_window)
            .first()
            .copied()
            .filter(|&w| w != 0)
    }

    /// Depth-first search below `window` for the window carrying `WM_STATE`,
    /// visiting the topmost children first
    pub(crate) fn find_client(&self, window: Window) -> Option<Window> {
        let mut stack = vec![window];
        while let Some(w) = stack.pop() {
            if !self.prop32(w, self.atoms.wm_state).is_empty() {
                return Some(w);
            }
            match self.server.query_tree(w) {
                Ok(children) => stack.extend(children),
                Err(e) => trace!("query_tree {:#x}: {}", w, e),
            }
        }
        None
    }

    fn fetch_wintype(&self, window: Window) -> Option<WinType> {
        let types = self.prop32(window, self.atoms.net_wm_window_type);
        wintype::classify(&types, &self.atoms.window_types)
    }

    /// Window type from the frame, then the client, then heuristics
    pub(crate) fn determine_wintype(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let (id, client, override_redirect) = (w.id, w.client_win, w.override_redirect);
        let found = self
            .fetch_wintype(id)
            .or_else(|| client.filter(|&c| c != id).and_then(|c| self.fetch_wintype(c)));
        let t = found.unwrap_or_else(|| {
            let transient = !self
                .prop32(client.unwrap_or(id), AtomEnum::WM_TRANSIENT_FOR.into())
                .is_empty();
            wintype::fallback(transient, override_redirect)
        });
        if let Some(w) = self.registry.get_mut(key) {
            if w.window_type != t {
                debug!("Compositor: Window {:#x} is {:?}", w.id, t);
            }
            w.window_type = t;
        }
    }

    pub(crate) fn refresh_frame_extents(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let v = self.prop32(w.client_or_self(), self.atoms.net_frame_extents);
        let extents = match v[..] {
            [left, right, top, bottom, ..] => FrameExtents {
                left,
                right,
                top,
                bottom,
            },
            _ => FrameExtents::default(),
        };
        if extents == w.frame_extents {
            return;
        }
        let frame_translucent = self.options.frame_translucent();
        if let Some(w) = self.registry.get_mut(key) {
            w.frame_extents = extents;
            w.mode = w.compute_mode(frame_translucent);
        }
        self.damage_window(key);
    }

    pub(crate) fn refresh_name(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let target = w.client_or_self();
        let name = self
            .text_prop(target, self.atoms.net_wm_name)
            .or_else(|| self.text_prop(target, AtomEnum::WM_NAME.into()))
            .map(|b| String::from_utf8_lossy(&b).into_owned());
        if let Some(w) = self.registry.get_mut(key) {
            w.name = name;
        }
    }

    pub(crate) fn refresh_class(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let raw = self
            .text_prop(w.client_or_self(), AtomEnum::WM_CLASS.into())
            .unwrap_or_default();
        let mut parts = raw
            .split(|&b| b == 0)
            .filter(|p| !p.is_empty())
            .map(|p| String::from_utf8_lossy(p).into_owned());
        let instance = parts.next();
        let general = parts.next();
        if let Some(w) = self.registry.get_mut(key) {
            w.class_instance = instance;
            w.class_general = general;
        }
    }

    /// Read the window this one is grouped under: `WM_CLIENT_LEADER`, then
    /// `WM_TRANSIENT_FOR`, each only when enabled
    pub(crate) fn refresh_leader(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let target = w.client_or_self();
        let o = &self.options;
        let read = |enabled: bool, property: Atom| {
            enabled
                .then(|| self.prop32(target, property).first().copied())
                .flatten()
                .filter(|&l| l != 0 && l != target)
        };
        let leader = read(o.detect_client_leader, self.atoms.wm_client_leader)
            .or_else(|| read(o.detect_transient, AtomEnum::WM_TRANSIENT_FOR.into()));
        if let Some(w) = self.registry.get_mut(key) {
            if w.leader != leader {
                trace!("window {:#x} leader {:?}", w.id, leader);
            }
            w.leader = leader;
        }
    }

    /// Root of the leader chain of `w`; a window without a leader leads
    /// itself through its client
    fn group_leader(&self, w: &CWindow) -> Window {
        let mut leader = w.leader.unwrap_or_else(|| w.client_or_self());
        for _ in 0..LEADER_DEPTH {
            let next = self
                .registry
                .find_toplevel(leader)
                .and_then(|k| self.registry.get(k))
                .and_then(|l| l.leader)
                .filter(|&n| n != leader);
            match next {
                Some(n) => leader = n,
                None => break,
            }
        }
        leader
    }

    /// Window without a client of its own that the WM put there
    fn is_wmwin(w: &CWindow) -> bool {
        !w.override_redirect && w.client_win.is_none()
    }

    fn is_active(&self, w: &CWindow) -> bool {
        self.active_window
            .is_some_and(|a| a == w.id || Some(a) == w.client_win)
    }

    // Per-window effect flags

    fn compute_focus(&self, w: &CWindow) -> bool {
        let o = &self.options;
        if o.wintype(w.window_type).focus
            || (o.mark_override_redirect_focused && w.override_redirect)
            || (o.mark_wmwin_focused && Self::is_wmwin(w))
            || any_match(&o.focus_exclude, w)
            || self.is_active(w)
        {
            return true;
        }
        if !o.track_leader() {
            return false;
        }
        let active = self
            .active_window
            .and_then(|a| self.registry.find_toplevel(a))
            .and_then(|k| self.registry.get(k));
        active.is_some_and(|a| a.key != w.key && self.group_leader(a) == self.group_leader(w))
    }

    pub(crate) fn determine_focus(&mut self, key: WinKey) -> bool {
        let Some(w) = self.registry.get(key) else {
            return false;
        };
        let focused = self.compute_focus(w);
        let changed = focused != w.focused;
        if let Some(w) = self.registry.get_mut(key) {
            w.focused = focused;
        }
        changed
    }

    pub(crate) fn determine_fade(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let fade = self.options.wintype(w.window_type).fade && !any_match(&self.options.fade_exclude, w);
        if let Some(w) = self.registry.get_mut(key) {
            w.fade = fade;
        }
    }

    pub(crate) fn determine_shadow(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let o = &self.options;
        let shadow = o.shadow
            && o.wintype(w.window_type).shadow
            && !(o.shadow_ignore_shaped && w.bounding_shaped)
            && !any_match(&o.shadow_exclude, w);
        if shadow == w.shadow {
            return;
        }
        self.damage_window(key);
        if let Some(w) = self.registry.get_mut(key) {
            w.shadow = shadow;
            w.extents = None;
            if let Some(sp) = w.shadow_picture.take() {
                self.painter.free_picture(sp.picture);
            }
        }
        self.damage_window(key);
    }

    /// Re-evaluate every rule-driven flag after a type, name or class change
    pub(crate) fn refresh_flags(&mut self, key: WinKey) {
        self.determine_shadow(key);
        self.determine_fade(key);
        self.determine_focus(key);
        self.calc_opacity(key, false);
        self.calc_dim(key);
    }

    // Opacity

    /// Fading is wanted for `key` right now
    fn fade_allowed(&self, key: WinKey, open_close: bool) -> bool {
        self.options.fading
            && !(open_close && self.options.no_fading_openclose)
            && self.registry.get(key).is_some_and(|w| w.fade)
    }

    /// Move the opacity of `key` to `target`, animated when `animate`
    pub(crate) fn fade_to(
        &mut self,
        key: WinKey,
        target: Opacity,
        step: f64,
        callback: FadeCallback,
        exec_callback: bool,
        animate: bool,
    ) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let update = if animate {
            self.fades.set_fade(
                key,
                w.opacity,
                target,
                step * OPAQUE as f64,
                callback,
                exec_callback,
                true,
            )
        } else {
            let callback = match self.fades.cancel(key).map(|f| f.callback) {
                Some(FadeCallback::FinishDestroy) => FadeCallback::FinishDestroy,
                _ => callback,
            };
            Some(FadeUpdate {
                key,
                opacity: target,
                completed: exec_callback.then_some(callback),
            })
        };
        if let Some(update) = update {
            self.apply_fade_update(update);
        }
    }

    /// Apply an opacity change decided by the scheduler and run its callback
    pub(crate) fn apply_fade_update(&mut self, update: FadeUpdate) {
        let frame_translucent = self.options.frame_translucent();
        let Some(w) = self.registry.get_mut(update.key) else {
            trace!("fade update for retired window {:?}", update.key);
            return;
        };
        if w.opacity != update.opacity {
            w.opacity = update.opacity;
            w.mode = w.compute_mode(frame_translucent);
            self.damage_window(update.key);
        }
        match update.completed {
            Some(FadeCallback::FinishUnmap) => self.finish_unmap(update.key),
            Some(FadeCallback::FinishDestroy) => self.finish_destroy(update.key),
            Some(FadeCallback::None) | None => {}
        }
    }

    /// Run the fade steps that are due; returns whether anything changed
    pub fn run_fades(&mut self, now: Instant) -> bool {
        let steps = self.fades.due_steps(now);
        if steps == 0 {
            return false;
        }
        let updates = self.fades.advance(steps);
        let changed = !updates.is_empty();
        for update in updates {
            self.apply_fade_update(update);
        }
        changed
    }

    fn target_opacity(&self, w: &CWindow) -> Opacity {
        let o = &self.options;
        if w.destroyed || !w.is_viewable() {
            return 0;
        }
        if !w.focused && o.inactive_opacity_override {
            return o.inactive_opacity;
        }
        if let Some(p) = w.opacity_prop {
            return p;
        }
        if let Some(r) = rule_opacity(&o.opacity_rules, w) {
            return r;
        }
        if let Some(t) = o.wintype(w.window_type).opacity {
            return t;
        }
        if w.focused {
            o.active_opacity
        } else {
            o.inactive_opacity
        }
    }

    /// Recompute the opacity target of a mapped window and fade towards it.
    ///
    /// With `refetch` the `_NET_WM_WINDOW_OPACITY` property is read again,
    /// from the frame first and then the client.
    pub(crate) fn calc_opacity(&mut self, key: WinKey, refetch: bool) {
        if refetch {
            self.refetch_opacity_prop(key);
        }
        self.retarget_opacity(key, false);
    }

    pub(crate) fn refetch_opacity_prop(&mut self, key: WinKey) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        let prop = [Some(w.id), w.client_win.filter(|&c| c != w.id)]
            .into_iter()
            .flatten()
            .find_map(|win| {
                self.prop32(win, self.atoms.net_wm_window_opacity)
                    .first()
                    .map(|&v| opacity_from_prop(v))
            });
        if let Some(w) = self.registry.get_mut(key) {
            w.opacity_prop = prop;
        }
    }

    /// Fade towards the current target; `open_close` marks map transitions
    pub(crate) fn retarget_opacity(&mut self, key: WinKey, open_close: bool) {
        let Some(w) = self.registry.get(key) else {
            return;
        };
        if !w.is_viewable() || w.destroyed {
            return;
        }
        let target = self.target_opacity(w);
        let unchanged = match self.fades.get(key) {
            Some(f) => f.finish == target as f64,
            None => w.opacity == target,
        };
        if unchanged {
            return;
        }
        let step = if target > w.opacity {
            self.options.fade_in_step
        } else {
            self.options.fade_out_step
        };
        let animate = self.fade_allowed(key, open_close);
        self.fade_to(key, target, step, FadeCallback::None, false, animate);
    }

    /// Darkening applied to a dimmed window, scaled by its opacity unless
    /// fixed
    pub(crate) fn dim_level(&self, w: &CWindow) -> f64 {
        if self.options.inactive_dim_fixed {
            self.options.inactive_dim
        } else {
            self.options.inactive_dim * opacity_fraction(w.opacity)
        }
    }

    /// Dim unfocused windows when configured; desktops are never dimmed
    pub(crate) fn calc_dim(&mut self, key: WinKey) {
        let dim_level = self.options.inactive_dim;
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
        let dim = dim_level > 0.0
            && w.is_viewable()
            && !w.focused
            && w.window_type != WinType::Desktop;
        if dim != w.dim {
            w.dim = dim;
            self.damage_window(key);
        }
    }

    // Unredirection

    /// Topmost window that will be painted covers the whole screen with
    /// solid contents
    fn screen_covered(&self) -> bool {
        let (sw, sh) = (self.screen_width, self.screen_height);
        let top = self.registry.keys().into_iter().rev().find_map(|k| {
            self.registry.get(k).filter(|w| {
                w.is_viewable()
                    && !w.destroyed
                    && !w.input_only
                    && w.damaged
                    && !w.is_offscreen(sw, sh)
            })
        });
        let Some(w) = top else {
            return false;
        };
        let r = w.outer_rect();
        w.mode == WinMode::Solid
            && !w.bounding_shaped
            && r.x1 <= 0
            && r.y1 <= 0
            && r.x2 >= sw as i32
            && r.y2 >= sh as i32
            && !any_match(&self.options.unredir_exclude, w)
    }

    /// Stop compositing once a solid window has covered the screen for the
    /// configured delay, and resume as soon as it no longer does
    pub fn update_redirection(&mut self, now: Instant) -> CompResult<()> {
        let covered = self.options.unredir_if_possible && self.screen_covered();
        if !covered {
            self.covered_since = None;
            if !self.redirected {
                self.set_redirected(true)?;
            }
            return Ok(());
        }
        if !self.redirected {
            return Ok(());
        }
        let since = *self.covered_since.get_or_insert(now);
        if now >= since + self.options.unredir_delay {
            self.covered_since = None;
            self.set_redirected(false)?;
        }
        Ok(())
    }

    fn set_redirected(&mut self, redirected: bool) -> CompResult<()> {
        self.server.set_redirected(redirected)?;
        self.redirected = redirected;
        if redirected {
            info!("Compositor: Resuming compositing");
            self.damage.add_screen();
        } else {
            info!("Compositor: Screen covered by a solid window, unredirecting");
            for key in self.registry.keys() {
                self.release_contents(key);
            }
            self.damage.take();
        }
        Ok(())
    }

    /// Windows are painted by the compositor
    #[cfg(test)]
    pub fn is_redirected(&self) -> bool {
        self.redirected
    }

    // Teardown

    /// Release the contents of a window that is no longer shown; the record
    /// stays for a possible remap
    pub(crate) fn finish_unmap(&mut self, key: WinKey) {
        self.damage_window(key);
        if let Some(w) = self.registry.get_mut(key) {
            w.damaged = false;
        }
        self.release_contents(key);
    }

    fn release_contents(&mut self, key: WinKey) {
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
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
        w.invalidate_regions();
    }

    /// Drop a destroyed window for good
    pub(crate) fn finish_destroy(&mut self, key: WinKey) {
        self.finish_unmap(key);
        self.fades.cancel(key);
        let Some(w) = self.registry.remove(key) else {
            return;
        };
        if let Some(damage) = w.damage {
            match self.server.destroy_damage(damage) {
                Ok(seq) => self.ignore.set_ignore(seq),
                Err(e) => debug!("damage_destroy for {:#x} failed: {}", w.id, e),
            }
        }
        debug!("Compositor: Released window {:#x}", w.id);
    }

    /// Apply new options: rebuild the shadow kernel and every derived flag
    pub fn reload(&mut self, options: Options) {
        info!("Compositor: Reloading options");
        self.options = options;
        self.fades.set_enabled(self.options.fading);
        self.fades.set_delta(self.options.fade_delta);
        if !self.options.fading {
            for update in self.fades.finish_all() {
                self.apply_fade_update(update);
            }
        }
        self.shadows = ShadowGenerator::new(self.options.shadow_radius);
        self.painter.set_shadow_color(self.options.shadow_color);

        let frame_translucent = self.options.frame_translucent();
        for key in self.registry.keys() {
            if let Some(w) = self.registry.get_mut(key) {
                if let Some(sp) = w.shadow_picture.take() {
                    self.painter.free_picture(sp.picture);
                }
                w.invalidate_regions();
                w.mode = w.compute_mode(frame_translucent);
            }
            if self.registry.get(key).is_some_and(|w| !w.destroyed) {
                self.refresh_leader(key);
            }
        }
        for key in self.registry.keys() {
            if self.registry.get(key).is_some_and(|w| !w.destroyed) {
                self.refresh_flags(key);
            }
        }
        self.damage.add_screen();
    }

    /// Release every server-side resource held for tracked windows
    pub fn shutdown(&mut self) {
        info!("Compositor: Shutting down, releasing {} windows", self.registry.len());
        for key in self.registry.keys() {
            self.fades.cancel(key);
            self.release_contents(key);
            if let Some(w) = self.registry.remove(key) {
                if let Some(damage) = w.damage {
                    if let Err(e) = self.server.destroy_damage(damage) {
                        debug!("damage_destroy for {:#x} failed: {}", w.id, e);
                    }
                }
            }
        }
        self.painter.release();
    }
}
