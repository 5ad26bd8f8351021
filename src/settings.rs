//! Tunable parameters owned by an algorithm unit.
//!
//! Each value lives in its own atomic cell. The presentation side writes and
//! the worker reads without any shared lock, so a reader may observe a stale
//! value but never a torn one. There is no atomicity across settings.

use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Slider { min: i64, max: i64 },
    Checkbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    Slider(i64),
    Checkbox(bool),
}

#[derive(Debug)]
pub struct Setting {
    name: String,
    kind: SettingKind,
    value: AtomicI64,
}

impl Setting {
    /// A slider; `value` is clamped into `[min, max]` (bounds are swapped if given reversed).
    pub fn slider(name: &str, value: i64, min: i64, max: i64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            name: name.to_string(),
            kind: SettingKind::Slider { min, max },
            value: AtomicI64::new(value.clamp(min, max)),
        }
    }

    pub fn checkbox(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: SettingKind::Checkbox,
            value: AtomicI64::new(value as i64),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SettingKind {
        self.kind
    }

    pub fn raw(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn value(&self) -> SettingValue {
        match self.kind {
            SettingKind::Slider { .. } => SettingValue::Slider(self.raw()),
            SettingKind::Checkbox => SettingValue::Checkbox(self.raw() != 0),
        }
    }

    pub fn is_checked(&self) -> bool {
        self.raw() != 0
    }

    /// Stores `value`, clamped to the slider range or normalised to 0/1 for a
    /// checkbox, and returns what was stored. Last write wins.
    pub fn set(&self, value: i64) -> i64 {
        let stored = match self.kind {
            SettingKind::Slider { min, max } => value.clamp(min, max),
            SettingKind::Checkbox => (value != 0) as i64,
        };
        self.value.store(stored, Ordering::Relaxed);
        stored
    }

    pub fn set_checked(&self, checked: bool) {
        self.set(checked as i64);
    }
}

/// Ordered collection of settings, in declaration order.
#[derive(Debug, Default)]
pub struct Settings {
    entries: Vec<Setting>,
}

impl Settings {
    pub fn new(entries: Vec<Setting>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Setting> {
        self.entries.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current value of a named setting, or `default` if the unit does not declare it.
    pub fn raw_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).map(Setting::raw).unwrap_or(default)
    }

    pub fn checked_or(&self, name: &str, default: bool) -> bool {
        self.get(name).map(Setting::is_checked).unwrap_or(default)
    }
}
