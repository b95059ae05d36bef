//! Interned atoms used by the compositor

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt};

use crate::compositor::wintype::WinType;

/// Holds all interned atoms the compositor reads or owns
#[derive(Debug, Clone)]
pub struct Atoms {
    pub net_wm_window_type: Atom,
    pub net_wm_window_opacity: Atom,
    pub net_frame_extents: Atom,
    pub net_active_window: Atom,
    pub net_wm_name: Atom,
    pub wm_state: Atom,
    pub wm_client_leader: Atom,
    pub utf8_string: Atom,
    pub xrootpmap_id: Atom,
    pub xsetroot_id: Atom,
    /// `_NET_WM_CM_S<screen>` selection
    pub net_wm_cm_s: Atom,
    /// Recognised `_NET_WM_WINDOW_TYPE_*` atoms in priority order
    pub window_types: Vec<(Atom, WinType)>,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C, screen_num: usize) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };
        Self::build(screen_num, intern)
    }

    fn build(screen_num: usize, mut intern: impl FnMut(&str) -> Result<Atom>) -> Result<Self> {
        let mut window_types = Vec::with_capacity(WinType::COUNT);
        for t in WinType::ALL {
            if let Some(name) = t.atom_name() {
                window_types.push((intern(name)?, t));
            }
        }

        Ok(Self {
            net_wm_window_type: intern("_NET_WM_WINDOW_TYPE")?,
            net_wm_window_opacity: intern("_NET_WM_WINDOW_OPACITY")?,
            net_frame_extents: intern("_NET_FRAME_EXTENTS")?,
            net_active_window: intern("_NET_ACTIVE_WINDOW")?,
            net_wm_name: intern("_NET_WM_NAME")?,
            wm_state: intern("WM_STATE")?,
            wm_client_leader: intern("WM_CLIENT_LEADER")?,
            utf8_string: intern("UTF8_STRING")?,
            xrootpmap_id: intern("_XROOTPMAP_ID")?,
            xsetroot_id: intern("_XSETROOT_ID")?,
            net_wm_cm_s: intern(&format!("_NET_WM_CM_S{}", screen_num))?,
            window_types,
        })
    }

    /// Atom for a window type, if it has one
    #[cfg(test)]
    pub fn window_type_atom(&self, t: WinType) -> Option<Atom> {
        self.window_types
            .iter()
            .find(|(_, wt)| *wt == t)
            .map(|&(a, _)| a)
    }

    pub fn is_root_background(&self, atom: Atom) -> bool {
        atom == self.xrootpmap_id || atom == self.xsetroot_id
    }

    /// Deterministic atoms for tests, numbered from 1000 in intern order
    #[cfg(test)]
    pub fn fake() -> Self {
        let mut next = 1000;
        Self::build(0, |_| {
            next += 1;
            Ok(next)
        })
        .expect("fake atoms never fail")
    }
}
