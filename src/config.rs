//! Configuration for the compositor
//!
//! Loads configuration from TOML file at `~/.config/area/compositor.toml`
//! Auto-generates default config file on first run if missing.
//!
//! The file model (`Config`) is what serde reads and writes; the engine only
//! ever sees the resolved, read-only [`Options`].

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::compositor::c_window::{CWindow, Opacity, opacity_from_fraction};
use crate::compositor::wintype::WinType;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Force a full repaint at this interval (milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redraw_interval_ms: Option<u64>,
    pub fading: FadingConfig,
    pub shadow: ShadowConfig,
    pub opacity: OpacityConfig,
    pub unredir: UnredirConfig,
    /// Per window type overrides, keyed by type name (`dock`, `tooltip`, ...)
    pub wintypes: BTreeMap<WinType, WinTypeConfig>,
}

impl Config {
    /// Load configuration from `path`, or the default location.
    ///
    /// A missing file at the default location is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            if path.is_some() {
                bail!("Config file {:?} does not exist", config_path);
            }
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::with_defaults());
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Defaults as written to a fresh config file
    pub fn with_defaults() -> Self {
        let mut wintypes = BTreeMap::new();
        for t in [WinType::Desktop, WinType::Dnd] {
            wintypes.insert(
                t,
                WinTypeConfig {
                    shadow: Some(false),
                    ..Default::default()
                },
            );
        }
        Self {
            wintypes,
            ..Default::default()
        }
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("compositor.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::with_defaults())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    /// Validate and resolve into engine options
    pub fn resolve(&self) -> Result<Options> {
        let mut wintypes = [WinTypeOptions::default(); WinType::COUNT];
        for (t, c) in &self.wintypes {
            let o = &mut wintypes[t.index()];
            if let Some(v) = c.shadow {
                o.shadow = v;
            }
            if let Some(v) = c.fade {
                o.fade = v;
            }
            if let Some(v) = c.focus {
                o.focus = v;
            }
            o.opacity = c.opacity.map(opacity_from_fraction);
        }

        let f = &self.fading;
        let s = &self.shadow;
        let o = &self.opacity;
        if s.radius < 0 {
            bail!("shadow.radius must not be negative");
        }
        if !(0.0..=1.0).contains(&s.opacity) {
            bail!("shadow.opacity must be within 0.0..=1.0");
        }
        if f.in_step <= 0.0 || f.out_step <= 0.0 {
            bail!("fading steps must be positive");
        }
        let opacity_rules = o
            .rules
            .iter()
            .map(|r| {
                if !(0.0..=1.0).contains(&r.opacity) {
                    bail!("opacity.rules opacity must be within 0.0..=1.0");
                }
                let rule = Rule::compile(&r.rule).context("Bad rule in opacity.rules")?;
                Ok((opacity_from_fraction(r.opacity), rule))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Options {
            fading: f.enabled,
            fade_delta: Duration::from_millis(f.delta_ms.max(1)),
            fade_in_step: f.in_step.min(1.0),
            fade_out_step: f.out_step.min(1.0),
            no_fading_openclose: f.no_fading_openclose,
            no_fading_destroyed_argb: f.no_fading_destroyed_argb,
            fade_exclude: Rule::compile_all(&f.exclude, "fading.exclude")?,
            shadow: s.enabled,
            shadow_radius: s.radius,
            shadow_opacity: s.opacity,
            shadow_offset_x: s.offset_x,
            shadow_offset_y: s.offset_y,
            shadow_color: s.color.map(|c| c.clamp(0.0, 1.0)),
            shadow_ignore_shaped: s.ignore_shaped,
            shadow_exclude: Rule::compile_all(&s.exclude, "shadow.exclude")?,
            inactive_opacity: opacity_from_fraction(o.inactive),
            active_opacity: opacity_from_fraction(o.active),
            frame_opacity: o.frame.clamp(0.0, 1.0),
            inactive_dim: o.inactive_dim.clamp(0.0, 1.0),
            inactive_dim_fixed: o.inactive_dim_fixed,
            inactive_opacity_override: o.inactive_override,
            opacity_rules,
            mark_override_redirect_focused: o.mark_override_redirect_focused,
            mark_wmwin_focused: o.mark_wmwin_focused,
            detect_transient: o.detect_transient,
            detect_client_leader: o.detect_client_leader,
            focus_exclude: Rule::compile_all(&o.focus_exclude, "opacity.focus_exclude")?,
            unredir_if_possible: self.unredir.enabled,
            unredir_delay: Duration::from_millis(self.unredir.delay_ms),
            unredir_exclude: Rule::compile_all(&self.unredir.exclude, "unredir.exclude")?,
            wintypes,
            redraw_interval: self.redraw_interval_ms.map(Duration::from_millis),
        })
    }
}

/// Fade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FadingConfig {
    pub enabled: bool,
    /// Milliseconds between fade steps
    pub delta_ms: u64,
    /// Opacity change per step when fading in (0.0-1.0)
    pub in_step: f64,
    /// Opacity change per step when fading out (0.0-1.0)
    pub out_step: f64,
    /// Skip fades on map/unmap, keep them for opacity changes
    pub no_fading_openclose: bool,
    /// Skip the closing fade of destroyed ARGB windows that have a frame
    pub no_fading_destroyed_argb: bool,
    pub exclude: Vec<RuleConfig>,
}

impl Default for FadingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delta_ms: 10,
            in_step: 0.028,
            out_step: 0.03,
            no_fading_openclose: false,
            no_fading_destroyed_argb: false,
            exclude: Vec::new(),
        }
    }
}

/// Shadow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,
    /// Blur radius in pixels
    pub radius: i32,
    /// Shadow opacity (0.0-1.0)
    pub opacity: f64,
    pub offset_x: i32,
    pub offset_y: i32,
    /// Shadow color: RGB values 0.0-1.0
    pub color: [f64; 3],
    /// No shadows for windows with a bounding shape
    pub ignore_shaped: bool,
    pub exclude: Vec<RuleConfig>,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 12,
            opacity: 0.75,
            offset_x: -15,
            offset_y: -15,
            color: [0.0, 0.0, 0.0],
            ignore_shaped: false,
            exclude: Vec::new(),
        }
    }
}

/// Opacity and focus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpacityConfig {
    /// Opacity of unfocused windows (0.0-1.0)
    pub inactive: f64,
    /// Opacity of the focused window (0.0-1.0)
    pub active: f64,
    /// Opacity of window frames relative to the window (0.0-1.0)
    pub frame: f64,
    /// Darken unfocused windows by this much (0.0-1.0)
    pub inactive_dim: f64,
    /// Dim by `inactive_dim` regardless of the window's own opacity
    pub inactive_dim_fixed: bool,
    /// Inactive opacity wins over `_NET_WM_WINDOW_OPACITY`
    pub inactive_override: bool,
    /// Treat override-redirect windows as focused
    pub mark_override_redirect_focused: bool,
    /// Treat windows without a client (WM decorations, panels) as focused
    pub mark_wmwin_focused: bool,
    /// Group transient windows with the window they are transient for
    pub detect_transient: bool,
    /// Group windows sharing a `WM_CLIENT_LEADER`
    pub detect_client_leader: bool,
    /// Windows that always count as focused
    pub focus_exclude: Vec<RuleConfig>,
    /// Fixed opacities for matching windows; the first match wins
    pub rules: Vec<OpacityRuleConfig>,
}

impl Default for OpacityConfig {
    fn default() -> Self {
        Self {
            inactive: 1.0,
            active: 1.0,
            frame: 1.0,
            inactive_dim: 0.0,
            inactive_dim_fixed: false,
            inactive_override: false,
            mark_override_redirect_focused: false,
            mark_wmwin_focused: false,
            detect_transient: false,
            detect_client_leader: false,
            focus_exclude: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// Opacity rule: an opacity and the conditions of the windows it applies to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpacityRuleConfig {
    pub opacity: f64,
    #[serde(flatten)]
    pub rule: RuleConfig,
}

/// Stop compositing while a solid window covers the whole screen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnredirConfig {
    pub enabled: bool,
    /// Milliseconds the screen must stay covered before unredirecting
    pub delay_ms: u64,
    /// Windows that never trigger unredirection
    pub exclude: Vec<RuleConfig>,
}

/// Per window type settings; unset fields keep the global behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WinTypeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<bool>,
}

/// Window match rule as written in the config file.
///
/// `name` and `class` are regular expressions; every field that is set
/// must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_type: Option<WinType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_redirect: Option<bool>,
}

/// Compiled window match rule
#[derive(Debug, Clone)]
pub struct Rule {
    name: Option<Regex>,
    class: Option<Regex>,
    window_type: Option<WinType>,
    override_redirect: Option<bool>,
}

impl Rule {
    pub fn compile(rule: &RuleConfig) -> Result<Self> {
        let re = |p: &Option<String>| -> Result<Option<Regex>> {
            p.as_deref()
                .map(|p| Regex::new(p).with_context(|| format!("Invalid pattern {:?}", p)))
                .transpose()
        };
        Ok(Self {
            name: re(&rule.name)?,
            class: re(&rule.class)?,
            window_type: rule.window_type,
            override_redirect: rule.override_redirect,
        })
    }

    fn compile_all(rules: &[RuleConfig], section: &str) -> Result<Vec<Self>> {
        rules
            .iter()
            .map(|r| Self::compile(r).with_context(|| format!("Bad rule in {}", section)))
            .collect()
    }

    /// A rule without any condition matches nothing
    pub fn matches(&self, w: &CWindow) -> bool {
        if self.name.is_none()
            && self.class.is_none()
            && self.window_type.is_none()
            && self.override_redirect.is_none()
        {
            return false;
        }
        if let Some(re) = &self.name {
            if !w.name.as_deref().is_some_and(|n| re.is_match(n)) {
                return false;
            }
        }
        if let Some(re) = &self.class {
            let hit = [&w.class_instance, &w.class_general]
                .into_iter()
                .flatten()
                .any(|c| re.is_match(c));
            if !hit {
                return false;
            }
        }
        if self.window_type.is_some_and(|t| t != w.window_type) {
            return false;
        }
        if self.override_redirect.is_some_and(|o| o != w.override_redirect) {
            return false;
        }
        true
    }
}

pub fn any_match(rules: &[Rule], w: &CWindow) -> bool {
    rules.iter().any(|r| r.matches(w))
}

/// Opacity of the first opacity rule matching `w`
pub fn rule_opacity(rules: &[(Opacity, Rule)], w: &CWindow) -> Option<Opacity> {
    rules.iter().find(|(_, r)| r.matches(w)).map(|&(o, _)| o)
}

/// Resolved per window type options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinTypeOptions {
    pub shadow: bool,
    pub fade: bool,
    pub opacity: Option<Opacity>,
    pub focus: bool,
}

impl Default for WinTypeOptions {
    fn default() -> Self {
        Self {
            shadow: true,
            fade: true,
            opacity: None,
            focus: false,
        }
    }
}

/// Read-only options consumed by the engine
#[derive(Debug, Clone)]
pub struct Options {
    pub fading: bool,
    pub fade_delta: Duration,
    /// Fraction of full opacity per fade step
    pub fade_in_step: f64,
    pub fade_out_step: f64,
    pub no_fading_openclose: bool,
    pub no_fading_destroyed_argb: bool,
    pub fade_exclude: Vec<Rule>,

    pub shadow: bool,
    pub shadow_radius: i32,
    pub shadow_opacity: f64,
    pub shadow_offset_x: i32,
    pub shadow_offset_y: i32,
    pub shadow_color: [f64; 3],
    pub shadow_ignore_shaped: bool,
    pub shadow_exclude: Vec<Rule>,

    pub inactive_opacity: Opacity,
    pub active_opacity: Opacity,
    pub frame_opacity: f64,
    pub inactive_dim: f64,
    pub inactive_dim_fixed: bool,
    pub inactive_opacity_override: bool,
    pub opacity_rules: Vec<(Opacity, Rule)>,
    pub mark_override_redirect_focused: bool,
    pub mark_wmwin_focused: bool,
    pub detect_transient: bool,
    pub detect_client_leader: bool,
    pub focus_exclude: Vec<Rule>,

    pub unredir_if_possible: bool,
    pub unredir_delay: Duration,
    pub unredir_exclude: Vec<Rule>,

    pub wintypes: [WinTypeOptions; WinType::COUNT],
    pub redraw_interval: Option<Duration>,
}

impl Options {
    pub fn wintype(&self, t: WinType) -> &WinTypeOptions {
        &self.wintypes[t.index()]
    }

    /// Frames are painted with their own opacity
    pub fn frame_translucent(&self) -> bool {
        self.frame_opacity < 1.0
    }

    /// Windows are grouped by leader for focus
    pub fn track_leader(&self) -> bool {
        self.detect_transient || self.detect_client_leader
    }
}
