//! x11rb implementation of the display seam
//!
//! Owns the compositing-manager selection, redirects the root's children
//! into off-screen storage and translates protocol events into
//! [`CompEvent`]s for the engine.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::Event;
use x11rb::protocol::composite::{self, ConnectionExt as CompositeExt};
use x11rb::protocol::damage::{self, ConnectionExt as DamageExt};
use x11rb::protocol::render::{ConnectionExt as RenderExt, PictType};
use x11rb::protocol::shape::{self, ConnectionExt as ShapeExt};
use x11rb::protocol::xfixes::{self, ConnectionExt as XFixesExt};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt, CreateWindowAux, EventMask,
    MapState as XMapState, Place, PropMode, Visualid, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{CURRENT_TIME, NONE};

use crate::compositor::atoms::Atoms;
use crate::compositor::backend::{WindowAttrs, XServer};
use crate::compositor::c_window::{ConfigureGeometry, MapState};
use crate::compositor::error::{CompError, CompResult};
use crate::compositor::events::CompEvent;
use crate::compositor::region::Region;
use crate::shared::{Geometry, Rect};

/// Longest property value read, in 32-bit units
const PROPERTY_LENGTH: u32 = 1024;

pub struct X11Server {
    conn: Arc<RustConnection>,
    root: Window,
    overlay: Window,
    /// Holds the `_NET_WM_CM_Sn` selection
    cm_window: Window,
    width: u32,
    height: u32,
    /// Visuals whose picture format carries alpha
    argb_visuals: HashMap<Visualid, bool>,
    /// The root's children are redirected off-screen
    redirected: Cell<bool>,
}

impl X11Server {
    /// Become the compositing manager of screen `screen_num`
    pub fn new(conn: Arc<RustConnection>, screen_num: usize, atoms: &Atoms) -> CompResult<Self> {
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| CompError::Unsupported(format!("no screen {}", screen_num)))?;
        let root = screen.root;
        let (width, height) = (
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        );

        check_extensions(conn.as_ref())?;

        let owner = conn.get_selection_owner(atoms.net_wm_cm_s)?.reply()?.owner;
        if owner != NONE {
            return Err(CompError::AlreadyRunning);
        }
        let cm_window = conn.generate_id()?;
        conn.create_window(
            0,
            cm_window,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            0,
            &CreateWindowAux::new(),
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            cm_window,
            atoms.net_wm_name,
            atoms.utf8_string,
            b"area-comp",
        )?;
        conn.set_selection_owner(cm_window, atoms.net_wm_cm_s, CURRENT_TIME)?;

        let mask = EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::EXPOSURE
            | EventMask::PROPERTY_CHANGE;
        conn.change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(mask))?;

        if let Err(e) = conn
            .composite_redirect_subwindows(root, composite::Redirect::MANUAL)?
            .check()
        {
            warn!("Redirecting subwindows failed: {}", e);
            return Err(CompError::AlreadyRunning);
        }

        let overlay = conn.composite_get_overlay_window(root)?.reply()?.overlay_win;
        info!("Using Composite Overlay Window: {:#x}", overlay);

        // Input passes through the overlay to the windows below
        let input = conn.generate_id()?;
        conn.xfixes_create_region(input, &[])?;
        conn.xfixes_set_window_shape_region(overlay, shape::SK::INPUT, 0, 0, input)?;
        conn.xfixes_destroy_region(input)?;
        conn.change_window_attributes(
            overlay,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::EXPOSURE),
        )?;

        let argb_visuals = argb_visuals(conn.as_ref())?;
        conn.flush()?;

        Ok(Self {
            conn,
            root,
            overlay,
            cm_window,
            width,
            height,
            argb_visuals,
            redirected: Cell::new(true),
        })
    }

    pub fn overlay(&self) -> Window {
        self.overlay
    }

    /// Freeze the server while the initial window tree is read
    pub fn grab(&self) -> CompResult<()> {
        self.conn.grab_server()?;
        Ok(())
    }

    pub fn ungrab(&self) -> CompResult<()> {
        self.conn.ungrab_server()?;
        self.conn.flush()?;
        Ok(())
    }

    /// Turn a protocol event into an engine event, dropping the ones the
    /// engine has no use for
    pub fn translate(&self, event: Event) -> Option<CompEvent> {
        let ev = match event {
            Event::CreateNotify(e) => CompEvent::Create {
                window: e.window,
                parent: e.parent,
            },
            Event::ConfigureNotify(e) => CompEvent::Configure {
                window: e.window,
                config: ConfigureGeometry {
                    geometry: Geometry::new(
                        i32::from(e.x),
                        i32::from(e.y),
                        u32::from(e.width),
                        u32::from(e.height),
                    ),
                    border_width: e.border_width,
                    above: (e.above_sibling != NONE).then_some(e.above_sibling),
                    override_redirect: e.override_redirect,
                },
            },
            Event::DestroyNotify(e) => CompEvent::Destroy { window: e.window },
            Event::MapNotify(e) => CompEvent::Map { window: e.window },
            Event::UnmapNotify(e) => CompEvent::Unmap { window: e.window },
            Event::ReparentNotify(e) => CompEvent::Reparent {
                window: e.window,
                parent: e.parent,
            },
            Event::CirculateNotify(e) => CompEvent::Circulate {
                window: e.window,
                place_on_top: e.place == Place::ON_TOP,
            },
            Event::DamageNotify(e) => CompEvent::Damage { window: e.drawable },
            Event::PropertyNotify(e) => CompEvent::Property {
                window: e.window,
                atom: e.atom,
            },
            Event::ShapeNotify(e) if e.shape_kind == shape::SK::BOUNDING => CompEvent::Shape {
                window: e.affected_window,
                bounding_shaped: e.shaped,
            },
            Event::Expose(e) if e.window == self.root || e.window == self.overlay => {
                CompEvent::Expose {
                    rect: Rect::new(
                        i32::from(e.x),
                        i32::from(e.y),
                        i32::from(e.width),
                        i32::from(e.height),
                    ),
                }
            }
            Event::Error(e) => CompEvent::Error {
                kind: format!("{:?}", e.error_kind),
                major_opcode: e.major_opcode,
                minor_opcode: e.minor_opcode,
                bad_value: e.bad_value,
            },
            _ => return None,
        };
        Some(ev)
    }

    /// Hand the screen back: unredirect, release the overlay and the selection
    pub fn release(&self) -> CompResult<()> {
        info!("Releasing composite redirection");
        if self.redirected.get() {
            self.conn
                .composite_unredirect_subwindows(self.root, composite::Redirect::MANUAL)?;
        }
        self.conn.composite_release_overlay_window(self.root)?;
        self.conn.destroy_window(self.cm_window)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Set the event mask of `window`, returning the request sequence
    fn select(&self, window: Window, mask: EventMask) -> CompResult<u64> {
        Ok(self
            .conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .sequence_number())
    }
}

fn check_extensions(conn: &RustConnection) -> CompResult<()> {
    let require = |name: &'static str| -> CompResult<()> {
        match conn.extension_information(name)? {
            Some(_) => Ok(()),
            None => Err(CompError::Unsupported(format!("{} extension missing", name))),
        }
    };
    require(composite::X11_EXTENSION_NAME)?;
    require(damage::X11_EXTENSION_NAME)?;
    require(xfixes::X11_EXTENSION_NAME)?;
    require(x11rb::protocol::render::X11_EXTENSION_NAME)?;
    require(shape::X11_EXTENSION_NAME)?;

    let version = conn.composite_query_version(0, 4)?.reply()?;
    info!(
        "Composite extension version: {}.{}",
        version.major_version, version.minor_version
    );
    // NameWindowPixmap needs 0.2, the overlay window 0.3
    if (version.major_version, version.minor_version) < (0, 3) {
        return Err(CompError::Unsupported(format!(
            "composite {}.{} is too old",
            version.major_version, version.minor_version
        )));
    }
    let version = conn.damage_query_version(1, 1)?.reply()?;
    debug!(
        "Damage extension version: {}.{}",
        version.major_version, version.minor_version
    );
    conn.xfixes_query_version(2, 0)?.reply()?;
    conn.render_query_version(0, 11)?.reply()?;
    Ok(())
}

/// Map every visual to whether its picture format has an alpha channel
fn argb_visuals(conn: &RustConnection) -> CompResult<HashMap<Visualid, bool>> {
    let formats = conn.render_query_pict_formats()?.reply()?;
    let alpha: HashMap<_, _> = formats
        .formats
        .iter()
        .map(|f| (f.id, f.type_ == PictType::DIRECT && f.direct.alpha_mask != 0))
        .collect();
    let mut visuals = HashMap::new();
    for screen in &formats.screens {
        for depth in &screen.depths {
            for v in &depth.visuals {
                visuals.insert(v.visual, alpha.get(&v.format).copied().unwrap_or(false));
            }
        }
    }
    Ok(visuals)
}

impl XServer for X11Server {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn query_tree(&self, window: Window) -> CompResult<Vec<Window>> {
        Ok(self.conn.query_tree(window)?.reply()?.children)
    }

    fn window_attributes(&self, window: Window) -> CompResult<WindowAttrs> {
        let attrs = self.conn.get_window_attributes(window)?;
        let geom = self.conn.get_geometry(window)?;
        let (attrs, geom) = (attrs.reply()?, geom.reply()?);
        let map_state = match attrs.map_state {
            XMapState::VIEWABLE => MapState::Viewable,
            XMapState::UNVIEWABLE => MapState::Unviewable,
            _ => MapState::Unmapped,
        };
        Ok(WindowAttrs {
            geometry: Geometry::new(
                i32::from(geom.x),
                i32::from(geom.y),
                u32::from(geom.width),
                u32::from(geom.height),
            ),
            border_width: geom.border_width,
            map_state,
            override_redirect: attrs.override_redirect,
            input_only: attrs.class == WindowClass::INPUT_ONLY,
            visual: attrs.visual,
            argb_visual: self.argb_visuals.get(&attrs.visual).copied().unwrap_or(false),
        })
    }

    fn track_window(&self, window: Window) -> CompResult<Vec<u64>> {
        let select = self.select(window, EventMask::PROPERTY_CHANGE)?;
        let shape = self.conn.shape_select_input(window, true)?.sequence_number();
        Ok(vec![select, shape])
    }

    fn untrack_window(&self, window: Window) -> CompResult<Vec<u64>> {
        let select = self.select(window, EventMask::NO_EVENT)?;
        let shape = self.conn.shape_select_input(window, false)?.sequence_number();
        Ok(vec![select, shape])
    }

    fn track_client(&self, window: Window) -> CompResult<Vec<u64>> {
        Ok(vec![self.select(window, EventMask::PROPERTY_CHANGE)?])
    }

    fn create_damage(&self, window: Window) -> CompResult<(u32, u64)> {
        let id = self.conn.generate_id()?;
        let seq = self
            .conn
            .damage_create(id, window, damage::ReportLevel::NON_EMPTY)?
            .sequence_number();
        Ok((id, seq))
    }

    fn destroy_damage(&self, damage: u32) -> CompResult<u64> {
        Ok(self.conn.damage_destroy(damage)?.sequence_number())
    }

    fn subtract_damage(&self, damage: u32) -> CompResult<u64> {
        Ok(self
            .conn
            .damage_subtract(damage, NONE, NONE)?
            .sequence_number())
    }

    fn fetch_damage(&self, damage: u32) -> CompResult<(Region, u64)> {
        let parts = self.conn.generate_id()?;
        self.conn.xfixes_create_region(parts, &[])?;
        let subtract = self
            .conn
            .damage_subtract(damage, NONE, parts)?
            .sequence_number();
        let fetched = self.conn.xfixes_fetch_region(parts)?.reply();
        self.conn.xfixes_destroy_region(parts)?;
        let region = Region::from_rects(fetched?.rectangles.iter().map(|r| {
            Rect::new(
                i32::from(r.x),
                i32::from(r.y),
                i32::from(r.width),
                i32::from(r.height),
            )
        }));
        Ok((region, subtract))
    }

    fn name_window_pixmap(&self, window: Window) -> CompResult<u32> {
        let pixmap = self.conn.generate_id()?;
        self.conn
            .composite_name_window_pixmap(window, pixmap)?
            .check()?;
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: u32) -> CompResult<u64> {
        Ok(self.conn.free_pixmap(pixmap)?.sequence_number())
    }

    fn get_property32(&self, window: Window, property: Atom) -> CompResult<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, PROPERTY_LENGTH)?
            .reply()?;
        Ok(reply.value32().map(|v| v.collect()).unwrap_or_default())
    }

    fn get_text_property(&self, window: Window, property: Atom) -> CompResult<Option<Vec<u8>>> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, PROPERTY_LENGTH)?
            .reply()?;
        if reply.type_ == NONE || reply.format != 8 {
            return Ok(None);
        }
        Ok(Some(reply.value))
    }

    fn bounding_shape(&self, window: Window) -> CompResult<Option<Vec<Rect>>> {
        let extents = self.conn.shape_query_extents(window)?.reply()?;
        if !extents.bounding_shaped {
            return Ok(None);
        }
        let reply = self
            .conn
            .shape_get_rectangles(window, shape::SK::BOUNDING)?
            .reply()?;
        Ok(Some(
            reply
                .rectangles
                .iter()
                .map(|r| {
                    Rect::new(
                        i32::from(r.x),
                        i32::from(r.y),
                        i32::from(r.width),
                        i32::from(r.height),
                    )
                })
                .collect(),
        ))
    }

    fn set_redirected(&self, redirected: bool) -> CompResult<()> {
        if redirected == self.redirected.get() {
            return Ok(());
        }
        if redirected {
            self.conn.map_window(self.overlay)?;
            self.conn
                .composite_redirect_subwindows(self.root, composite::Redirect::MANUAL)?;
        } else {
            self.conn
                .composite_unredirect_subwindows(self.root, composite::Redirect::MANUAL)?;
            self.conn.unmap_window(self.overlay)?;
        }
        self.conn.flush()?;
        self.redirected.set(redirected);
        debug!("Redirection {}", if redirected { "on" } else { "off" });
        Ok(())
    }
}
