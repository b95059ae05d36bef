//! XRender rendering backend
//!
//! Frames are composed into an off-screen back buffer the size of the screen
//! and copied to the composite overlay window on present, clipped to the
//! damaged region.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::render::{
    Color, ConnectionExt as RenderExt, CreatePictureAux, PictOp, PictType, Pictformat, Picture,
    Repeat,
};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ConnectionExt, CreateGCAux, ImageFormat, Pixmap, Rectangle, SubwindowMode, Visualid,
    Window,
};
use x11rb::rust_connection::RustConnection;
use x11rb::NONE;

use crate::compositor::atoms::Atoms;
use crate::compositor::backend::{DrawOp, Painter, Source};
use crate::compositor::c_window::{OPAQUE, Opacity};
use crate::compositor::error::{CompError, CompResult};
use crate::compositor::region::Region;
use crate::compositor::shadow::ShadowImage;
use crate::shared::Rect;

/// Root fill when no wallpaper pixmap is advertised
const ROOT_FALLBACK: Color = Color {
    red: 0x8080,
    green: 0x8080,
    blue: 0x8080,
    alpha: 0xffff,
};

/// Picture formats the painter needs
struct Formats {
    /// Format of every visual on the screen
    visuals: HashMap<Visualid, Pictformat>,
    /// Plain 8-bit alpha
    a8: Pictformat,
}

impl Formats {
    fn query(conn: &RustConnection) -> CompResult<Self> {
        let reply = conn.render_query_pict_formats()?.reply()?;
        let a8 = reply
            .formats
            .iter()
            .find(|f| {
                f.type_ == PictType::DIRECT
                    && f.depth == 8
                    && f.direct.alpha_mask == 0xff
                    && f.direct.red_mask == 0
            })
            .map(|f| f.id)
            .ok_or_else(|| CompError::Unsupported("no A8 picture format".into()))?;
        let mut visuals = HashMap::new();
        for screen in &reply.screens {
            for depth in &screen.depths {
                for v in &depth.visuals {
                    visuals.insert(v.visual, v.format);
                }
            }
        }
        Ok(Self { visuals, a8 })
    }
}

/// Back buffer pixmap and the picture drawing into it
struct Buffer {
    pixmap: Pixmap,
    picture: Picture,
}

/// Painter drawing with the RENDER extension
pub struct XRenderPainter {
    conn: Arc<RustConnection>,
    root: Window,
    root_depth: u8,
    root_format: Pictformat,
    width: u32,
    height: u32,
    formats: Formats,
    /// Picture on the overlay window
    target: Picture,
    buffer: Option<Buffer>,
    root_tile: Option<Picture>,
    background_atoms: [Atom; 2],
    /// 1x1 repeating alpha masks keyed by opacity
    alpha: HashMap<Opacity, Picture>,
    /// Solid shadow color fills keyed by opacity
    shadow_fill: HashMap<Opacity, Picture>,
    shadow_color: [f64; 3],
}

impl XRenderPainter {
    pub fn new(
        conn: Arc<RustConnection>,
        screen_num: usize,
        overlay: Window,
        atoms: &Atoms,
    ) -> CompResult<Self> {
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| CompError::Unsupported(format!("no screen {}", screen_num)))?;
        let (root, root_depth, root_visual) = (screen.root, screen.root_depth, screen.root_visual);
        let (width, height) = (
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        );

        let formats = Formats::query(conn.as_ref())?;
        let root_format = *formats
            .visuals
            .get(&root_visual)
            .ok_or_else(|| CompError::Unsupported("root visual has no picture format".into()))?;

        let target = conn.generate_id()?;
        conn.render_create_picture(
            target,
            overlay,
            root_format,
            &CreatePictureAux::new().subwindowmode(SubwindowMode::INCLUDE_INFERIORS),
        )?;
        info!("XRender painter initialized ({}x{}, depth {})", width, height, root_depth);

        Ok(Self {
            conn,
            root,
            root_depth,
            root_format,
            width,
            height,
            formats,
            target,
            buffer: None,
            root_tile: None,
            background_atoms: [atoms.xrootpmap_id, atoms.xsetroot_id],
            alpha: HashMap::new(),
            shadow_fill: HashMap::new(),
            shadow_color: [0.0; 3],
        })
    }

    fn ensure_buffer(&mut self) -> CompResult<Picture> {
        if let Some(b) = &self.buffer {
            return Ok(b.picture);
        }
        let pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(
            self.root_depth,
            pixmap,
            self.root,
            clamp_u16(self.width as i32),
            clamp_u16(self.height as i32),
        )?;
        let picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(picture, pixmap, self.root_format, &CreatePictureAux::new())?;
        debug!("Created back buffer {}x{}", self.width, self.height);
        self.buffer = Some(Buffer { pixmap, picture });
        Ok(picture)
    }

    fn free_buffer(&mut self) {
        if let Some(b) = self.buffer.take() {
            self.free_picture(b.picture);
            if let Err(e) = self.conn.free_pixmap(b.pixmap) {
                warn!("Failed to free back buffer: {}", e);
            }
        }
    }

    /// Wallpaper pixmap advertised on the root, if any
    fn root_pixmap(&self) -> Option<Pixmap> {
        self.background_atoms.iter().find_map(|&atom| {
            let reply = self
                .conn
                .get_property(false, self.root, atom, AtomEnum::PIXMAP, 0, 1)
                .ok()?
                .reply()
                .ok()?;
            reply.value32()?.next().filter(|&p| p != NONE)
        })
    }

    fn ensure_root_tile(&mut self) -> CompResult<Picture> {
        if let Some(p) = self.root_tile {
            return Ok(p);
        }
        let aux = CreatePictureAux::new().repeat(Repeat::NORMAL);
        let picture = self.conn.generate_id()?;
        match self.root_pixmap() {
            Some(pixmap) => {
                debug!("Using root background pixmap {:#x}", pixmap);
                self.conn
                    .render_create_picture(picture, pixmap, self.root_format, &aux)?;
            }
            None => {
                debug!("No root background, filling with grey");
                let pixmap = self.conn.generate_id()?;
                self.conn
                    .create_pixmap(self.root_depth, pixmap, self.root, 1, 1)?;
                self.conn
                    .render_create_picture(picture, pixmap, self.root_format, &aux)?;
                self.conn.render_fill_rectangles(
                    PictOp::SRC,
                    picture,
                    ROOT_FALLBACK,
                    &[Rectangle {
                        x: 0,
                        y: 0,
                        width: 1,
                        height: 1,
                    }],
                )?;
                self.conn.free_pixmap(pixmap)?;
            }
        }
        self.root_tile = Some(picture);
        Ok(picture)
    }

    fn alpha_picture(&mut self, opacity: Opacity) -> CompResult<Picture> {
        if let Some(&p) = self.alpha.get(&opacity) {
            return Ok(p);
        }
        let pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(8, pixmap, self.root, 1, 1)?;
        let picture = self.conn.generate_id()?;
        self.conn.render_create_picture(
            picture,
            pixmap,
            self.formats.a8,
            &CreatePictureAux::new().repeat(Repeat::NORMAL),
        )?;
        self.conn.render_fill_rectangles(
            PictOp::SRC,
            picture,
            Color {
                red: 0,
                green: 0,
                blue: 0,
                alpha: alpha16(opacity),
            },
            &[Rectangle {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            }],
        )?;
        self.conn.free_pixmap(pixmap)?;
        self.alpha.insert(opacity, picture);
        Ok(picture)
    }

    fn shadow_fill(&mut self, opacity: Opacity) -> CompResult<Picture> {
        if let Some(&p) = self.shadow_fill.get(&opacity) {
            return Ok(p);
        }
        let picture = self.conn.generate_id()?;
        self.conn
            .render_create_solid_fill(picture, shadow_color(self.shadow_color, opacity))?;
        self.shadow_fill.insert(opacity, picture);
        Ok(picture)
    }

    fn set_clip(&self, picture: Picture, clip: &Region) -> CompResult<()> {
        let rects: Vec<Rectangle> = clip.rects().iter().map(|&r| rectangle(r)).collect();
        self.conn
            .render_set_picture_clip_rectangles(picture, 0, 0, &rects)?;
        Ok(())
    }

    fn drop_fills(&mut self) {
        let fills: Vec<Picture> = self.shadow_fill.drain().map(|(_, p)| p).collect();
        for p in fills {
            self.free_picture(p);
        }
    }
}

impl Painter for XRenderPainter {
    fn bind_window(&mut self, window: Window, pixmap: u32, visual: u32) -> CompResult<u32> {
        let format = *self
            .formats
            .visuals
            .get(&visual)
            .ok_or_else(|| CompError::BindFailed {
                window,
                reason: format!("no picture format for visual {:#x}", visual),
            })?;
        let picture = self.conn.generate_id()?;
        let aux = CreatePictureAux::new().subwindowmode(SubwindowMode::INCLUDE_INFERIORS);
        self.conn
            .render_create_picture(picture, pixmap, format, &aux)?
            .check()
            .map_err(|e| CompError::BindFailed {
                window,
                reason: e.to_string(),
            })?;
        trace!("Bound window {:#x} as picture {:#x}", window, picture);
        Ok(picture)
    }

    fn create_shadow(&mut self, image: &ShadowImage) -> CompResult<u32> {
        if image.is_empty() {
            return Err(CompError::Protocol("empty shadow image".into()));
        }
        let (w, h) = (clamp_u16(image.width as i32), clamp_u16(image.height as i32));
        let pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(8, pixmap, self.root, w, h)?;
        let gc = self.conn.generate_id()?;
        self.conn.create_gc(gc, pixmap, &CreateGCAux::new())?;
        self.conn.put_image(
            ImageFormat::Z_PIXMAP,
            pixmap,
            gc,
            w,
            h,
            0,
            0,
            0,
            8,
            &padded_rows(image),
        )?;
        self.conn.free_gc(gc)?;
        let picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(picture, pixmap, self.formats.a8, &CreatePictureAux::new())?;
        self.conn.free_pixmap(pixmap)?;
        Ok(picture)
    }

    fn free_picture(&mut self, picture: u32) {
        if let Err(e) = self.conn.render_free_picture(picture) {
            warn!("Failed to free picture {:#x}: {}", picture, e);
        }
    }

    fn paint_root(&mut self, region: &Region) -> CompResult<()> {
        let buffer = self.ensure_buffer()?;
        let tile = self.ensure_root_tile()?;
        self.set_clip(buffer, region)?;
        self.conn.render_composite(
            PictOp::SRC,
            tile,
            NONE,
            buffer,
            0,
            0,
            0,
            0,
            0,
            0,
            clamp_u16(self.width as i32),
            clamp_u16(self.height as i32),
        )?;
        Ok(())
    }

    fn reset_root(&mut self) {
        if let Some(p) = self.root_tile.take() {
            self.free_picture(p);
        }
    }

    fn draw(&mut self, op: &DrawOp, clip: &Region) -> CompResult<()> {
        if op.dst.is_empty() {
            return Ok(());
        }
        let buffer = self.ensure_buffer()?;
        self.set_clip(buffer, clip)?;
        let (x, y) = (clamp_i16(op.dst.x1), clamp_i16(op.dst.y1));
        let (w, h) = (clamp_u16(op.dst.width()), clamp_u16(op.dst.height()));
        let (sx, sy) = (clamp_i16(op.src_x), clamp_i16(op.src_y));
        match op.source {
            Source::Window(src) => {
                let (pict_op, mask) = if !op.blend {
                    (PictOp::SRC, NONE)
                } else if op.opacity >= OPAQUE {
                    (PictOp::OVER, NONE)
                } else {
                    (PictOp::OVER, self.alpha_picture(op.opacity)?)
                };
                self.conn
                    .render_composite(pict_op, src, mask, buffer, sx, sy, 0, 0, x, y, w, h)?;
            }
            Source::Shadow(mask) => {
                let fill = self.shadow_fill(op.opacity)?;
                self.conn
                    .render_composite(PictOp::OVER, fill, mask, buffer, 0, 0, sx, sy, x, y, w, h)?;
            }
        }
        Ok(())
    }

    fn dim(&mut self, dst: Rect, alpha: f64, clip: &Region) -> CompResult<()> {
        let buffer = self.ensure_buffer()?;
        self.set_clip(buffer, clip)?;
        let color = Color {
            red: 0,
            green: 0,
            blue: 0,
            alpha: (alpha.clamp(0.0, 1.0) * f64::from(u16::MAX)).round() as u16,
        };
        self.conn
            .render_fill_rectangles(PictOp::OVER, buffer, color, &[rectangle(dst)])?;
        Ok(())
    }

    fn present(&mut self, region: &Region) -> CompResult<()> {
        let buffer = self.ensure_buffer()?;
        let screen = Rect::new(0, 0, self.width as i32, self.height as i32);
        self.set_clip(buffer, &Region::from_rect(screen))?;
        self.set_clip(self.target, region)?;
        self.conn.render_composite(
            PictOp::SRC,
            buffer,
            NONE,
            self.target,
            0,
            0,
            0,
            0,
            0,
            0,
            clamp_u16(self.width as i32),
            clamp_u16(self.height as i32),
        )?;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.free_buffer();
    }

    fn set_shadow_color(&mut self, color: [f64; 3]) {
        if self.shadow_color != color {
            self.shadow_color = color;
            self.drop_fills();
        }
    }

    fn release(&mut self) {
        self.free_buffer();
        self.reset_root();
        self.drop_fills();
        let masks: Vec<Picture> = self.alpha.drain().map(|(_, p)| p).collect();
        for p in masks {
            self.free_picture(p);
        }
        self.free_picture(self.target);
        if let Err(e) = self.conn.flush() {
            warn!("Failed to flush on release: {}", e);
        }
    }
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, i32::from(u16::MAX)) as u16
}

fn rectangle(r: Rect) -> Rectangle {
    Rectangle {
        x: clamp_i16(r.x1),
        y: clamp_i16(r.y1),
        width: clamp_u16(r.width()),
        height: clamp_u16(r.height()),
    }
}

/// Opacity scaled to a 16-bit channel
fn alpha16(opacity: Opacity) -> u16 {
    (opacity.min(OPAQUE) * 0x101) as u16
}

/// Premultiplied shadow color at `opacity`
fn shadow_color(rgb: [f64; 3], opacity: Opacity) -> Color {
    let alpha = alpha16(opacity);
    let channel = |c: f64| (c.clamp(0.0, 1.0) * f64::from(alpha)).round() as u16;
    Color {
        red: channel(rgb[0]),
        green: channel(rgb[1]),
        blue: channel(rgb[2]),
        alpha,
    }
}

/// Alpha rows padded to the 32-bit scanline unit
fn padded_rows(image: &ShadowImage) -> Vec<u8> {
    let width = image.width as usize;
    let stride = (width + 3) & !3;
    if stride == width {
        return image.data.clone();
    }
    let mut out = vec![0u8; stride * image.height as usize];
    for (src, dst) in image.data.chunks(width).zip(out.chunks_mut(stride)) {
        dst[..width].copy_from_slice(src);
    }
    out
}
