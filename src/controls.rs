//! User-facing editing state: the ordered chain list, the parameter editors
//! for the selected algorithm, and the commands that drive both.

use std::sync::Arc;

use tracing::debug;

use crate::pipeline::Algorithm;
use crate::settings::SettingKind;

/// Ordered algorithm names plus a selection cursor, with list-box semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainList {
    names: Vec<String>,
    selected: Option<usize>,
}

impl ChainList {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        let selected = (!names.is_empty()).then_some(0);
        Self { names, selected }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected.and_then(|i| self.names.get(i)).map(String::as_str)
    }

    /// Select entry `index`, clamped to the list. Returns false on an empty list.
    pub fn select(&mut self, index: usize) -> bool {
        if self.names.is_empty() {
            self.selected = None;
            return false;
        }
        self.selected = Some(index.min(self.names.len() - 1));
        true
    }

    pub fn select_next(&mut self) {
        if let Some(i) = self.selected {
            self.select(i + 1);
        } else {
            self.select(0);
        }
    }

    pub fn select_prev(&mut self) {
        let i = self.selected.unwrap_or(0);
        self.select(i.saturating_sub(1));
    }

    /// Append `name` and select it.
    pub fn add(&mut self, name: &str) -> bool {
        self.names.push(name.to_string());
        self.selected = Some(self.names.len() - 1);
        true
    }

    /// Remove the selected entry; the selection stays at the same position.
    pub fn remove(&mut self) -> bool {
        let Some(i) = self.selected else {
            return false;
        };
        if i >= self.names.len() {
            return false;
        }
        let removed = self.names.remove(i);
        debug!(algorithm = %removed, "removed from chain");
        if self.names.is_empty() {
            self.selected = None;
        } else {
            self.selected = Some(i.min(self.names.len() - 1));
        }
        true
    }

    /// Move the selected entry one place towards the front. The moved entry
    /// stays selected. Returns false when nothing moved.
    pub fn move_up(&mut self) -> bool {
        match self.selected {
            Some(i) if i > 0 && i < self.names.len() => {
                self.names.swap(i, i - 1);
                self.selected = Some(i - 1);
                true
            }
            _ => false,
        }
    }

    pub fn move_down(&mut self) -> bool {
        match self.selected {
            Some(i) if i + 1 < self.names.len() => {
                self.names.swap(i, i + 1);
                self.selected = Some(i + 1);
                true
            }
            _ => false,
        }
    }
}

/// One visible editor mirroring a setting of the displayed algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    pub name: String,
    pub kind: SettingKind,
    pub value: i64,
    dirty: bool,
}

impl Editor {
    fn store(&mut self, value: i64) {
        let value = match self.kind {
            SettingKind::Slider { min, max } => value.clamp(min, max),
            SettingKind::Checkbox => (value != 0) as i64,
        };
        if value != self.value {
            self.value = value;
            self.dirty = true;
        }
    }
}

/// Editors for the currently displayed algorithm.
#[derive(Default)]
pub struct ParameterPanel {
    algorithm: Option<Arc<dyn Algorithm>>,
    editors: Vec<Editor>,
    cursor: usize,
}

impl ParameterPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn algorithm_name(&self) -> Option<&str> {
        self.algorithm.as_ref().map(|a| a.name())
    }

    /// Show `algorithm`. Editors are rebuilt only when it differs from the
    /// one already displayed; returns whether a rebuild happened.
    pub fn select(&mut self, algorithm: Option<Arc<dyn Algorithm>>) -> bool {
        let incoming = algorithm.as_ref().map(|a| a.name().to_string());
        if incoming.as_deref() == self.algorithm_name() {
            return false;
        }
        self.editors = algorithm
            .as_ref()
            .map(|a| {
                a.settings()
                    .iter()
                    .map(|s| Editor {
                        name: s.name().to_string(),
                        kind: s.kind(),
                        value: s.raw(),
                        dirty: false,
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.cursor = 0;
        self.algorithm = algorithm;
        debug!(algorithm = ?incoming, editors = self.editors.len(), "parameter editors rebuilt");
        true
    }

    pub fn editors(&self) -> &[Editor] {
        &self.editors
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn next_editor(&mut self) {
        if !self.editors.is_empty() {
            self.cursor = (self.cursor + 1) % self.editors.len();
        }
    }

    pub fn prev_editor(&mut self) {
        if !self.editors.is_empty() {
            self.cursor = (self.cursor + self.editors.len() - 1) % self.editors.len();
        }
    }

    /// Change an editor's value without touching the algorithm yet.
    pub fn edit(&mut self, name: &str, value: i64) -> bool {
        match self.editors.iter_mut().find(|e| e.name == name) {
            Some(editor) => {
                editor.store(value);
                true
            }
            None => false,
        }
    }

    /// Step the slider under the cursor by `delta`.
    pub fn nudge(&mut self, delta: i64) {
        if let Some(editor) = self.editors.get_mut(self.cursor) {
            if let SettingKind::Slider { .. } = editor.kind {
                let value = editor.value.saturating_add(delta);
                editor.store(value);
            }
        }
    }

    /// Flip the checkbox under the cursor.
    pub fn toggle(&mut self) {
        if let Some(editor) = self.editors.get_mut(self.cursor) {
            if editor.kind == SettingKind::Checkbox {
                let value = (editor.value == 0) as i64;
                editor.store(value);
            }
        }
    }

    /// Write edited values into the displayed algorithm's settings. Returns
    /// how many settings were written.
    pub fn push(&mut self) -> usize {
        let Some(algorithm) = &self.algorithm else {
            return 0;
        };
        let settings = algorithm.settings();
        let mut written = 0;
        for editor in self.editors.iter_mut().filter(|e| e.dirty) {
            if let Some(setting) = settings.get(&editor.name) {
                editor.value = setting.set(editor.value);
                written += 1;
            }
            editor.dirty = false;
        }
        written
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectPrev,
    SelectNext,
    MoveUp,
    MoveDown,
    Remove,
    AddNext,
    NextSetting,
    PrevSetting,
    Adjust(i64),
    Toggle,
    ToggleOverlay,
    Close,
}

/// What the caller must do after a command was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// The chain changed; re-issue it to the worker.
    pub chain_changed: bool,
    pub toggle_overlay: bool,
    pub close: bool,
}

impl Command {
    /// Apply the command. `available` is the catalog used by `AddNext`, which
    /// appends the first catalog entry after the selected one (wrapping).
    pub fn apply(self, chain: &mut ChainList, panel: &mut ParameterPanel, available: &[String]) -> Outcome {
        let mut outcome = Outcome::default();
        match self {
            Command::SelectPrev => chain.select_prev(),
            Command::SelectNext => chain.select_next(),
            Command::MoveUp => outcome.chain_changed = chain.move_up(),
            Command::MoveDown => outcome.chain_changed = chain.move_down(),
            Command::Remove => outcome.chain_changed = chain.remove(),
            Command::AddNext => {
                if let Some(name) = next_available(chain.selected_name(), available) {
                    outcome.chain_changed = chain.add(name);
                }
            }
            Command::NextSetting => panel.next_editor(),
            Command::PrevSetting => panel.prev_editor(),
            Command::Adjust(delta) => panel.nudge(delta),
            Command::Toggle => panel.toggle(),
            Command::ToggleOverlay => outcome.toggle_overlay = true,
            Command::Close => outcome.close = true,
        }
        outcome
    }
}

fn next_available<'a>(current: Option<&str>, available: &'a [String]) -> Option<&'a str> {
    if available.is_empty() {
        return None;
    }
    let next = current
        .and_then(|c| available.iter().position(|a| a == c))
        .map_or(0, |i| (i + 1) % available.len());
    Some(available[next].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::GaussianBlur;

    fn chain() -> ChainList {
        ChainList::new(&["gaussian_blur", "grayscale", "hough_circle_finder"])
    }

    #[test]
    fn moves_clamp_at_the_ends_and_keep_selection() {
        let mut c = chain();
        assert_eq!(c.selected_name(), Some("gaussian_blur"));
        assert!(!c.move_up());

        assert!(c.move_down());
        assert_eq!(c.names(), ["grayscale", "gaussian_blur", "hough_circle_finder"]);
        assert_eq!(c.selected_name(), Some("gaussian_blur"));

        assert!(c.move_down());
        assert!(!c.move_down());
        assert_eq!(c.selected(), Some(2));
    }

    #[test]
    fn remove_and_add() {
        let mut c = chain();
        c.select(2);
        assert!(c.remove());
        assert_eq!(c.selected_name(), Some("grayscale"));
        assert!(c.remove());
        assert!(c.remove());
        assert!(c.is_empty());
        assert!(!c.remove());
        assert_eq!(c.selected(), None);

        c.add("grayscale");
        assert_eq!(c.selected_name(), Some("grayscale"));
    }

    #[test]
    fn panel_rebuilds_only_on_selection_change() {
        let blur: Arc<dyn Algorithm> = Arc::new(GaussianBlur::new());
        let mut panel = ParameterPanel::new();
        assert!(panel.select(Some(blur.clone())));
        assert_eq!(panel.editors().len(), 3);

        panel.edit("blur_x", 9);
        assert!(!panel.select(Some(blur.clone())));
        assert_eq!(panel.editors()[0].value, 9);

        assert!(panel.select(None));
        assert!(panel.editors().is_empty());
    }

    #[test]
    fn push_writes_edits_into_settings() {
        let blur: Arc<dyn Algorithm> = Arc::new(GaussianBlur::new());
        let mut panel = ParameterPanel::new();
        panel.select(Some(blur.clone()));

        assert_eq!(panel.push(), 0);
        panel.nudge(100);
        panel.next_editor();
        panel.next_editor();
        panel.toggle();
        assert_eq!(panel.push(), 2);

        let settings = blur.settings();
        assert_eq!(settings.raw_or("blur_x", 0), 35);
        assert!(!settings.checked_or("use_blur", true));
        assert_eq!(panel.push(), 0);
    }

    #[test]
    fn commands_report_chain_changes() {
        let available: Vec<String> = ["gaussian_blur", "grayscale", "hough_circle_finder"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut c = ChainList::new(&["grayscale"]);
        let mut panel = ParameterPanel::new();

        let out = Command::AddNext.apply(&mut c, &mut panel, &available);
        assert!(out.chain_changed);
        assert_eq!(c.names(), ["grayscale", "hough_circle_finder"]);

        assert!(!Command::SelectPrev.apply(&mut c, &mut panel, &available).chain_changed);
        assert!(Command::MoveDown.apply(&mut c, &mut panel, &available).chain_changed);
        assert!(Command::Close.apply(&mut c, &mut panel, &available).close);
    }
}
