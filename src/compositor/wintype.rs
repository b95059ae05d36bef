//! Window type classification
//!
//! `_NET_WM_WINDOW_TYPE` holds a list of atoms in order of preference; the
//! first one found in the recognised table decides the type.

use serde::{Deserialize, Serialize};
use x11rb::protocol::xproto::Atom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinType {
    Unknown,
    Desktop,
    Dock,
    Toolbar,
    Menu,
    Utility,
    Splash,
    Dialog,
    Normal,
    DropdownMenu,
    PopupMenu,
    Tooltip,
    Notification,
    Combo,
    Dnd,
}

impl WinType {
    pub const COUNT: usize = 15;

    pub const ALL: [WinType; Self::COUNT] = [
        WinType::Unknown,
        WinType::Desktop,
        WinType::Dock,
        WinType::Toolbar,
        WinType::Menu,
        WinType::Utility,
        WinType::Splash,
        WinType::Dialog,
        WinType::Normal,
        WinType::DropdownMenu,
        WinType::PopupMenu,
        WinType::Tooltip,
        WinType::Notification,
        WinType::Combo,
        WinType::Dnd,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// EWMH atom naming this type, `None` for `Unknown`
    pub fn atom_name(self) -> Option<&'static str> {
        Some(match self {
            WinType::Unknown => return None,
            WinType::Desktop => "_NET_WM_WINDOW_TYPE_DESKTOP",
            WinType::Dock => "_NET_WM_WINDOW_TYPE_DOCK",
            WinType::Toolbar => "_NET_WM_WINDOW_TYPE_TOOLBAR",
            WinType::Menu => "_NET_WM_WINDOW_TYPE_MENU",
            WinType::Utility => "_NET_WM_WINDOW_TYPE_UTILITY",
            WinType::Splash => "_NET_WM_WINDOW_TYPE_SPLASH",
            WinType::Dialog => "_NET_WM_WINDOW_TYPE_DIALOG",
            WinType::Normal => "_NET_WM_WINDOW_TYPE_NORMAL",
            WinType::DropdownMenu => "_NET_WM_WINDOW_TYPE_DROPDOWN_MENU",
            WinType::PopupMenu => "_NET_WM_WINDOW_TYPE_POPUP_MENU",
            WinType::Tooltip => "_NET_WM_WINDOW_TYPE_TOOLTIP",
            WinType::Notification => "_NET_WM_WINDOW_TYPE_NOTIFICATION",
            WinType::Combo => "_NET_WM_WINDOW_TYPE_COMBO",
            WinType::Dnd => "_NET_WM_WINDOW_TYPE_DND",
        })
    }
}

/// Map the atoms of a `_NET_WM_WINDOW_TYPE` property to a type.
///
/// `table` pairs each recognised atom with its type; property order wins
/// over table order.
pub fn classify(type_atoms: &[Atom], table: &[(Atom, WinType)]) -> Option<WinType> {
    type_atoms
        .iter()
        .find_map(|atom| table.iter().find(|(a, _)| a == atom).map(|&(_, t)| t))
}

/// Type of a window that carries no type property anywhere in its tree
pub fn fallback(transient: bool, override_redirect: bool) -> WinType {
    if transient {
        WinType::Dialog
    } else if override_redirect {
        WinType::Unknown
    } else {
        WinType::Normal
    }
}
