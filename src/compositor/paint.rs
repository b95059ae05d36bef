//! Paint pipeline
//!
//! One pass turns the accumulated damage into a frame:
//!
//! 1. top to bottom, opaque windows are copied straight into the back
//!    buffer and cut out of the region still to paint; every painted window
//!    remembers that region as its `border_clip`
//! 2. the root background fills whatever is left
//! 3. bottom to top, shadows, translucent contents and dim overlays are
//!    blended, each clipped to its window's `border_clip`
//! 4. the damaged area of the back buffer is presented
//!
//! A draw that fails for one window is logged and skipped; only errors that
//! end the connection abort the pass.

use tracing::{debug, trace, warn};
use x11rb::protocol::xproto::Window;

use crate::compositor::Compositor;
use crate::compositor::backend::{DrawOp, Painter, Source, XServer};
use crate::compositor::c_window::{
    OPAQUE, Opacity, ShadowPicture, WinKey, WinMode, opacity_fraction, opacity_from_fraction,
};
use crate::compositor::error::CompResult;
use crate::compositor::region::Region;
use crate::shared::Rect;

impl<S: XServer, P: Painter> Compositor<S, P> {
    /// Repaint the damaged part of the screen. Returns whether a frame was
    /// presented.
    pub fn paint_all(&mut self) -> CompResult<bool> {
        if !self.redirected {
            // the server paints the windows itself
            self.damage.take();
            return Ok(false);
        }
        if self.damage.is_empty() {
            return Ok(false);
        }
        let damage = self.damage.take();
        let mut region = damage.clone();
        let (sw, sh) = (self.screen_width, self.screen_height);
        let mut painted: Vec<WinKey> = Vec::new();

        for key in self.registry.keys().into_iter().rev() {
            let Some(w) = self.registry.get(key) else {
                continue;
            };
            if !w.damaged || w.input_only || w.is_offscreen(sw, sh) {
                continue;
            }
            self.ensure_picture(key);
            let border = self.ensure_border_size(key);
            self.ensure_extents(key);

            let Some(w) = self.registry.get(key) else {
                continue;
            };
            let copy = w.mode == WinMode::Solid && w.picture.is_some();
            let (id, dim) = (w.id, w.dim);
            let clip = if copy {
                let before = region.clone();
                let copied = self.paint_content(key, &before.intersect(&border), false);
                contain(copied, "copy", id)?;
                region = region.subtract(&border);
                if dim { before } else { region.clone() }
            } else {
                region.clone()
            };
            if let Some(w) = self.registry.get_mut(key) {
                w.border_clip = Some(clip);
            }
            painted.push(key);
        }

        if !region.is_empty() {
            match self.painter.paint_root(&region) {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Painting the root background failed: {}", e),
                Ok(()) => {}
            }
        }

        for &key in painted.iter().rev() {
            let Some(w) = self.registry.get(key) else {
                continue;
            };
            let clip = w.border_clip.clone().unwrap_or_default();
            let border = w.border_size.clone().unwrap_or_default();
            let blend = w.mode != WinMode::Solid;
            let (id, dim, dim_rect) = (w.id, w.dim, w.outer_rect());
            let dim_level = self.dim_level(w);

            let shadow = self.paint_shadow(key, &clip.subtract(&border));
            contain(shadow, "shadow", id)?;
            let inside = clip.intersect(&border);
            if blend {
                let blended = self.paint_content(key, &inside, true);
                contain(blended, "blend", id)?;
            }
            if dim && !inside.is_empty() {
                let dimmed = self.painter.dim(dim_rect, dim_level, &inside);
                contain(dimmed, "dim", id)?;
            }
        }

        if let Err(e) = self.painter.present(&damage) {
            // try again on the next pass
            self.damage.add_region(&damage);
            return Err(e);
        }
        trace!("paint: {} windows, {} damage rects", painted.len(), damage.rects().len());
        Ok(true)
    }

    /// Name and wrap the contents of a mapped window on first use
    fn ensure_picture(&mut self, key: WinKey) {
        let Some(w) = self.registry.get_mut(key) else {
            return;
        };
        if w.picture.is_some() || w.bind_failed || !w.is_viewable() {
            return;
        }
        if w.geometry.width == 0 || w.geometry.height == 0 {
            w.bind_failed = true;
            return;
        }
        let pixmap = match w.pixmap {
            Some(p) => p,
            None => match self.server.name_window_pixmap(w.id) {
                Ok(p) => {
                    w.pixmap = Some(p);
                    p
                }
                Err(e) => {
                    warn!("composite_name_window_pixmap failed for window {:#x}: {}", w.id, e);
                    w.bind_failed = true;
                    return;
                }
            },
        };
        match self.painter.bind_window(w.id, pixmap, w.visual) {
            Ok(picture) => w.picture = Some(picture),
            Err(e) => {
                warn!("Binding window {:#x} failed, painting it contentless: {}", w.id, e);
                w.bind_failed = true;
            }
        }
    }

    /// Bounding shape in screen coordinates
    fn ensure_border_size(&mut self, key: WinKey) -> Region {
        let Some(w) = self.registry.get(key) else {
            return Region::new();
        };
        if let Some(b) = &w.border_size {
            return b.clone();
        }
        let outer = w.outer_rect();
        let border = if w.bounding_shaped {
            let bw = w.border_width as i32;
            match self.server.bounding_shape(w.id) {
                Ok(Some(rects)) => Region::from_rects(rects).translate(outer.x1 + bw, outer.y1 + bw),
                Ok(None) => Region::from_rect(outer),
                Err(e) => {
                    debug!("shape query for {:#x} failed: {}", w.id, e);
                    Region::from_rect(outer)
                }
            }
        } else {
            Region::from_rect(outer)
        };
        if let Some(w) = self.registry.get_mut(key) {
            w.border_size = Some(border.clone());
        }
        border
    }

    /// Composite a window's contents. Frame strips get the frame opacity
    /// when translucent frames are configured.
    fn paint_content(&mut self, key: WinKey, clip: &Region, blend: bool) -> CompResult<()> {
        if clip.is_empty() {
            return Ok(());
        }
        let Some(w) = self.registry.get(key) else {
            return Ok(());
        };
        let Some(picture) = w.picture else {
            return Ok(());
        };
        let outer = w.outer_rect();
        let (ow, oh) = (outer.width(), outer.height());
        let op = |src: Rect, opacity: Opacity| DrawOp {
            source: Source::Window(picture),
            src_x: src.x1,
            src_y: src.y1,
            dst: src.translate(outer.x1, outer.y1),
            opacity,
            blend,
        };

        if !blend {
            return self.painter.draw(&op(Rect::new(0, 0, ow, oh), OPAQUE), clip);
        }

        let fe = w.frame_extents;
        if !self.options.frame_translucent() || fe.is_empty() {
            return self.painter.draw(&op(Rect::new(0, 0, ow, oh), w.opacity), clip);
        }

        let (l, r, t, b) = (
            (fe.left as i32).min(ow),
            (fe.right as i32).min(ow),
            (fe.top as i32).min(oh),
            (fe.bottom as i32).min(oh),
        );
        let frame_opacity =
            opacity_from_fraction(self.options.frame_opacity * opacity_fraction(w.opacity));
        let body_h = oh - t - b;
        let strips = [
            Rect::new(0, 0, ow, t),
            Rect::new(0, oh - b, ow, b),
            Rect::new(0, t, l, body_h),
            Rect::new(ow - r, t, r, body_h),
        ];
        let body = Rect::new(l, t, ow - l - r, body_h);
        let opacity = w.opacity;
        for strip in strips.into_iter().filter(|s| !s.is_empty()) {
            self.painter.draw(&op(strip, frame_opacity), clip)?;
        }
        if !body.is_empty() {
            self.painter.draw(&op(body, opacity), clip)?;
        }
        Ok(())
    }

    fn paint_shadow(&mut self, key: WinKey, clip: &Region) -> CompResult<()> {
        if clip.is_empty() {
            return Ok(());
        }
        let Some(w) = self.registry.get(key) else {
            return Ok(());
        };
        if !w.shadow {
            return Ok(());
        }
        let opacity = opacity_from_fraction(self.options.shadow_opacity * opacity_fraction(w.opacity));
        if opacity == 0 {
            return Ok(());
        }
        let (ow, oh) = w.outer_size();
        let (sw, sh) = self.shadows.shadow_size(ow, oh);
        if sw == 0 || sh == 0 {
            return Ok(());
        }
        let outer = w.outer_rect();
        let dst = Rect::new(
            outer.x1 + self.options.shadow_offset_x,
            outer.y1 + self.options.shadow_offset_y,
            sw as i32,
            sh as i32,
        );

        let cached = w
            .shadow_picture
            .filter(|sp| sp.width == sw && sp.height == sh)
            .map(|sp| sp.picture);
        let picture = match cached {
            Some(p) => p,
            None => {
                let image = self.shadows.render_shadow(1.0, ow, oh);
                let picture = self.painter.create_shadow(&image)?;
                if let Some(w) = self.registry.get_mut(key) {
                    if let Some(old) = w.shadow_picture.take() {
                        self.painter.free_picture(old.picture);
                    }
                    w.shadow_picture = Some(ShadowPicture {
                        picture,
                        width: sw,
                        height: sh,
                    });
                }
                picture
            }
        };

        self.painter.draw(
            &DrawOp {
                source: Source::Shadow(picture),
                src_x: 0,
                src_y: 0,
                dst,
                opacity,
                blend: true,
            },
            clip,
        )
    }
}

/// Log a non-fatal failure of one window's draw so the rest of the frame
/// still gets painted
fn contain(result: CompResult<()>, what: &str, window: Window) -> CompResult<()> {
    match result {
        Err(e) if !e.is_fatal() => {
            warn!("Skipping {} of window {:#x}: {}", what, window, e);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::events::CompEvent;
    use crate::compositor::testing::{FakeServer, PaintCall, compositor, default_options};
    use crate::compositor::atoms::Atoms;
    use crate::compositor::testing::RecordingPainter;
    use crate::shared::Geometry;
    use std::time::{Duration, Instant};

    fn run_all_fades<S: XServer, P: Painter>(comp: &mut Compositor<S, P>, mut t: Instant) -> Instant {
        comp.run_fades(t);
        while !comp.fades().is_empty() {
            t += Duration::from_millis(10);
            comp.run_fades(t);
            comp.paint_all().unwrap();
        }
        t
    }

    fn shadow_draws(calls: &[PaintCall]) -> Vec<(DrawOp, Region)> {
        calls
            .iter()
            .filter_map(|c| match c {
                PaintCall::Draw(op, clip) if matches!(op.source, Source::Shadow(_)) => {
                    Some((*op, clip.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn opaque_window_is_copied_and_cut_from_root() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(100, 100, 50, 50), true);
        let mut options = default_options();
        options.fading = false;
        let mut comp = Compositor::new(server, RecordingPainter::default(), Atoms::fake(), options);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        assert!(comp.paint_all().unwrap());

        let calls = comp.painter().calls.clone();
        let body = Region::from_rect(Rect::new(100, 100, 50, 50));
        let copy = calls.iter().find_map(|c| match c {
            PaintCall::Draw(op, clip) if matches!(op.source, Source::Window(_)) => Some((*op, clip.clone())),
            _ => None,
        });
        let (op, clip) = copy.unwrap();
        assert!(!op.blend);
        assert_eq!(clip, body);

        let root = calls.iter().find_map(|c| match c {
            PaintCall::Root(r) => Some(r.clone()),
            _ => None,
        });
        assert!(!root.unwrap().intersects(&body));

        for (_, clip) in shadow_draws(&calls) {
            assert!(!clip.intersects(&body), "shadow painted over its own window");
        }
        assert!(matches!(calls.last(), Some(PaintCall::Present(_))));
        assert!(!comp.paint_all().unwrap());
    }

    #[test]
    fn map_fade_in_then_unmap_fade_out_releases_contents() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(50, 50, 100, 100), false);
        let mut comp = compositor(server);
        comp.scan().unwrap();

        comp.handle_event(1, CompEvent::Map { window: 0x10 });
        comp.handle_event(2, CompEvent::Damage { window: 0x10 });
        assert_eq!(comp.window(0x10).unwrap().opacity, 0);
        comp.paint_all().unwrap();
        let t = run_all_fades(&mut comp, Instant::now());
        let w = comp.window(0x10).unwrap();
        assert_eq!(w.opacity, OPAQUE);
        assert_eq!(w.mode, WinMode::Solid);
        assert!(w.picture.is_some());

        let body = Region::from_rect(Rect::new(50, 50, 100, 100));
        for (_, clip) in shadow_draws(&comp.painter().calls) {
            assert!(!clip.intersects(&body));
        }

        comp.handle_event(3, CompEvent::Unmap { window: 0x10 });
        let mut t = t;
        let mut seen = Vec::new();
        comp.run_fades(t);
        while !comp.fades().is_empty() {
            t += Duration::from_millis(10);
            comp.run_fades(t);
            if let Some(w) = comp.registry().iter().next() {
                if w.damaged {
                    seen.push(w.opacity);
                    assert!(w.picture.is_some(), "fading window lost its contents");
                }
            }
            comp.paint_all().unwrap();
        }
        assert!(seen.len() > 5);
        assert!(seen.windows(2).all(|p| p[1] <= p[0]));

        let w = comp.registry().iter().next().unwrap();
        assert!(!w.damaged);
        assert!(w.picture.is_none() && w.pixmap.is_none());
        assert!(comp.server().live_pixmaps().is_empty());
        assert!(comp.painter().live_pictures().is_empty());
    }

    #[test]
    fn failed_bind_keeps_shadow_only() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(50, 50, 100, 100), true);
        let mut options = default_options();
        options.fading = false;
        let mut painter = RecordingPainter::default();
        painter.fail_bind = true;
        let mut comp = Compositor::new(server, painter, Atoms::fake(), options);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        comp.paint_all().unwrap();

        let w = comp.window(0x10).unwrap();
        assert!(w.bind_failed);
        let calls = &comp.painter().calls;
        assert!(!calls.iter().any(|c| matches!(c, PaintCall::Draw(op, _) if matches!(op.source, Source::Window(_)))));
        assert_eq!(shadow_draws(calls).len(), 1);
    }

    #[test]
    fn offscreen_and_undamaged_windows_are_skipped() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(-500, 10, 100, 100), true);
        server.add_window(0x20, Geometry::new(10, 10, 100, 100), true);
        let mut comp = compositor(server);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        comp.paint_all().unwrap();
        assert!(comp.window(0x10).unwrap().picture.is_none());
        assert!(comp.window(0x20).unwrap().picture.is_none());
        let calls = &comp.painter().calls;
        assert!(calls.iter().all(|c| !matches!(c, PaintCall::Draw(..))));
    }

    #[test]
    fn translucent_frames_are_painted_separately() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(0, 0, 100, 100), true);
        let atoms = Atoms::fake();
        server.set_property32(0x10, atoms.net_frame_extents, vec![2, 2, 20, 2]);
        let mut options = default_options();
        options.fading = false;
        options.shadow = false;
        options.frame_opacity = 0.5;
        let mut comp = Compositor::new(server, RecordingPainter::default(), atoms, options);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        comp.paint_all().unwrap();

        let draws: Vec<DrawOp> = comp
            .painter()
            .calls
            .iter()
            .filter_map(|c| match c {
                PaintCall::Draw(op, _) => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(draws.len(), 5);
        let body = draws.last().unwrap();
        assert_eq!(body.dst, Rect::new(2, 20, 96, 78));
        assert_eq!(body.opacity, OPAQUE);
        assert!(draws[..4].iter().all(|d| d.opacity == 128 && d.blend));
    }

    #[test]
    fn failing_shadow_leaves_the_rest_of_the_frame() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(20, 20, 100, 100), true);
        server.add_window(0x20, Geometry::new(200, 100, 100, 100), true);
        let mut options = default_options();
        options.fading = false;
        let mut painter = RecordingPainter::default();
        painter.fail_shadow = true;
        let mut comp = Compositor::new(server, painter, Atoms::fake(), options);
        comp.scan().unwrap();
        comp.handle_event(1, CompEvent::Damage { window: 0x10 });
        comp.handle_event(2, CompEvent::Damage { window: 0x20 });

        assert!(comp.paint_all().unwrap());
        let calls = &comp.painter().calls;
        let contents = calls
            .iter()
            .filter(|c| matches!(c, PaintCall::Draw(op, _) if matches!(op.source, Source::Window(_))))
            .count();
        assert_eq!(contents, 2);
        assert!(shadow_draws(calls).is_empty());
        assert!(matches!(calls.last(), Some(PaintCall::Present(_))));
        assert!(comp.damage().is_empty());
    }

    #[test]
    fn lost_connection_aborts_but_keeps_damage() {
        let server = FakeServer::new(400, 300);
        server.add_window(0x10, Geometry::new(20, 20, 100, 100), true);
        let mut painter = RecordingPainter::default();
        painter.fail_present = true;
        let mut comp = Compositor::new(server, painter, Atoms::fake(), default_options());
        comp.scan().unwrap();

        let err = comp.paint_all().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(comp.damage().pending().area(), 400 * 300);
    }
}
