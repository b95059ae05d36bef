//! Fade scheduler
//!
//! Time-stepped opacity animations. The scheduler never touches window
//! records itself: every change it decides on is returned as a
//! [`FadeUpdate`] that the engine applies, so a fade whose window record has
//! already been dropped simply produces an update nobody claims.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::trace;

use crate::compositor::c_window::{OPAQUE, Opacity, WinKey};

/// Work to run once a fade reaches its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeCallback {
    #[default]
    None,
    /// Release the contents of a window that finished fading out
    FinishUnmap,
    /// Release contents and drop the record of a destroyed window
    FinishDestroy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    pub cur: f64,
    pub finish: f64,
    /// Signed per-tick increment, pointing from `cur` towards `finish`
    pub step: f64,
    pub callback: FadeCallback,
}

impl Fade {
    fn aim(&mut self, finish: f64, step: f64) {
        self.finish = finish;
        self.step = if self.cur <= finish { step.abs() } else { -step.abs() };
    }

    fn advance(&mut self, steps: u32) -> bool {
        self.cur += self.step * steps as f64;
        let done = if self.step >= 0.0 {
            self.cur >= self.finish
        } else {
            self.cur <= self.finish
        };
        if done || self.step == 0.0 {
            self.cur = self.finish;
            return true;
        }
        false
    }

    fn opacity(&self) -> Opacity {
        self.cur.round().clamp(0.0, OPAQUE as f64) as Opacity
    }
}

/// Opacity change for one window, plus the callback when its fade completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeUpdate {
    pub key: WinKey,
    pub opacity: Opacity,
    pub completed: Option<FadeCallback>,
}

#[derive(Debug)]
pub struct FadeScheduler {
    fades: IndexMap<WinKey, Fade>,
    enabled: bool,
    delta: Duration,
    next_tick: Option<Instant>,
}

impl FadeScheduler {
    pub fn new(enabled: bool, delta: Duration) -> Self {
        Self {
            fades: IndexMap::new(),
            enabled,
            delta: delta.max(Duration::from_millis(1)),
            next_tick: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_delta(&mut self, delta: Duration) {
        self.delta = delta.max(Duration::from_millis(1));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.fades.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.fades.is_empty()
    }

    pub fn get(&self, key: WinKey) -> Option<&Fade> {
        self.fades.get(&key)
    }

    pub fn is_fading(&self, key: WinKey) -> bool {
        self.fades.contains_key(&key)
    }

    /// Start, retarget or short-circuit the fade of `key`.
    ///
    /// With an active fade and `override_existing == false` the target and
    /// step stay as they are and only the callback is replaced. With
    /// `override_existing` the fade continues from its current value towards
    /// the new target. A `FinishDestroy` callback is never replaced: the
    /// record must still be released once the window stops animating.
    ///
    /// When fading is disabled or `start == finish` the opacity jumps to
    /// `finish` at once and the callback completes in the returned update
    /// if `exec_callback` is set.
    #[allow(clippy::too_many_arguments)]
    pub fn set_fade(
        &mut self,
        key: WinKey,
        start: Opacity,
        finish: Opacity,
        step: f64,
        callback: FadeCallback,
        exec_callback: bool,
        override_existing: bool,
    ) -> Option<FadeUpdate> {
        let finish = finish.min(OPAQUE);
        let start = start.min(OPAQUE);

        if !self.enabled || (start == finish && !self.fades.contains_key(&key)) {
            let previous = self.fades.shift_remove(&key).map(|f| f.callback);
            let callback = match previous {
                Some(FadeCallback::FinishDestroy) => FadeCallback::FinishDestroy,
                _ => callback,
            };
            return Some(FadeUpdate {
                key,
                opacity: finish,
                completed: exec_callback.then_some(callback),
            });
        }

        if let Some(fade) = self.fades.get_mut(&key) {
            if fade.callback != FadeCallback::FinishDestroy {
                fade.callback = callback;
            }
            if !override_existing {
                return None;
            }
            fade.aim(finish as f64, step);
            trace!("fade: retarget {:?} {:.1} -> {}", key, fade.cur, finish);
            return Some(FadeUpdate {
                key,
                opacity: fade.opacity(),
                completed: None,
            });
        }

        let mut fade = Fade {
            cur: start as f64,
            finish: finish as f64,
            step,
            callback,
        };
        fade.aim(finish as f64, step);
        trace!("fade: start {:?} {} -> {}", key, start, finish);
        if self.fades.is_empty() || self.next_tick.is_none() {
            self.next_tick = Some(Instant::now() + self.delta);
        }
        self.fades.insert(key, fade);
        Some(FadeUpdate {
            key,
            opacity: start,
            completed: None,
        })
    }

    /// Drop the fade of `key` without running its callback
    pub fn cancel(&mut self, key: WinKey) -> Option<Fade> {
        self.fades.shift_remove(&key)
    }

    /// Advance every fade by `steps` ticks.
    ///
    /// Finished fades leave the active set and report their callback exactly
    /// once through `completed`.
    pub fn advance(&mut self, steps: u32) -> Vec<FadeUpdate> {
        if steps == 0 {
            return Vec::new();
        }
        let mut updates = Vec::with_capacity(self.fades.len());
        self.fades.retain(|&key, fade| {
            let done = fade.advance(steps);
            updates.push(FadeUpdate {
                key,
                opacity: fade.opacity(),
                completed: done.then_some(fade.callback),
            });
            !done
        });
        if self.fades.is_empty() {
            self.next_tick = None;
        }
        updates
    }

    /// Complete every fade at once
    pub fn finish_all(&mut self) -> Vec<FadeUpdate> {
        let updates = self
            .fades
            .drain(..)
            .map(|(key, fade)| FadeUpdate {
                key,
                opacity: (fade.finish as Opacity).min(OPAQUE),
                completed: Some(fade.callback),
            })
            .collect();
        self.next_tick = None;
        updates
    }

    /// Number of ticks due at `now`. The timer is armed one delta after the
    /// first fade starts.
    pub fn due_steps(&mut self, now: Instant) -> u32 {
        if self.fades.is_empty() {
            self.next_tick = None;
            return 0;
        }
        match self.next_tick {
            None => {
                self.next_tick = Some(now + self.delta);
                0
            }
            Some(t) if now < t => 0,
            Some(t) => {
                let late = now.duration_since(t).as_nanos() / self.delta.as_nanos();
                self.next_tick = Some(now + self.delta);
                u32::try_from(late + 1).unwrap_or(u32::MAX)
            }
        }
    }

    /// Time until the next tick, `None` when nothing is animating
    pub fn next_tick_deadline(&self, now: Instant) -> Option<Duration> {
        if self.fades.is_empty() {
            return None;
        }
        Some(
            self.next_tick
                .map_or(self.delta, |t| t.saturating_duration_since(now)),
        )
    }
}
