//! The timer-driven display side.
//!
//! A `Presenter` is ticked on a fixed period by whoever owns the window (or
//! the headless loop). Each tick is short and never waits on the worker: it
//! takes whatever result was last published, composites it, and hands it to
//! a `FrameSink`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::{DynamicImage, Rgb};
use tracing::{debug, trace};

use crate::controls::{ChainList, Command, Outcome, ParameterPanel};
use crate::font;
use crate::overlay::{CrosshairStyle, Overlay};
use crate::registry::AlgorithmRegistry;
use crate::settings::SettingKind;
use crate::types::{Frame, Keypoint, Published};
use crate::worker::PipelineWorker;

/// Fixed-period re-arming timer. Time is passed in so callers (and tests)
/// control the clock.
#[derive(Debug, Clone)]
pub struct RefreshTimer {
    period: Duration,
    deadline: Option<Instant>,
}

impl RefreshTimer {
    /// Period of `1000 / hz` milliseconds, never shorter than 1 ms.
    pub fn from_rate(hz: u32) -> Self {
        Self {
            period: Self::period_for(hz),
            deadline: None,
        }
    }

    fn period_for(hz: u32) -> Duration {
        Duration::from_millis((1000 / u64::from(hz.max(1))).max(1))
    }

    pub fn set_rate(&mut self, hz: u32) {
        self.period = Self::period_for(hz);
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Schedule the next fire one period after `now`. Does nothing if already
    /// armed; returns whether a new deadline was set.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.period);
        true
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True once per arm, when `now` reaches the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn time_until(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }
}

/// Where composited frames end up.
pub trait FrameSink {
    fn present(&mut self, frame: &Frame, keypoints: &[Keypoint]) -> Result<()>;

    /// User commands gathered since the last call.
    fn commands(&mut self) -> Vec<Command> {
        Vec::new()
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// How keypoints and the HUD are drawn.
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub show_overlay: bool,
    pub show_hud: bool,
    pub keypoint_color: Rgb<u8>,
    pub crosshair_color: Rgb<u8>,
    pub crosshair_arm: i32,
    pub stroke: u32,
    /// Circle radius for keypoints that carry no size.
    pub default_radius: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            show_overlay: true,
            show_hud: true,
            keypoint_color: Rgb([0, 255, 0]),
            crosshair_color: Rgb([255, 0, 0]),
            crosshair_arm: 10,
            stroke: 1,
            default_radius: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rendered: bool,
    pub sequence: Option<u64>,
    pub keypoints: usize,
    /// Settings written from the editors this tick.
    pub pushed: usize,
    /// The editors were rebuilt for a new selection.
    pub rebuilt: bool,
}

pub struct Presenter<S: FrameSink> {
    sink: S,
    style: OverlayStyle,
    overlay: Overlay,
    chain: ChainList,
    panel: ParameterPanel,
    last_sequence: Option<u64>,
    rendered: u64,
}

impl<S: FrameSink> Presenter<S> {
    pub fn new(sink: S, style: OverlayStyle, chain: ChainList) -> Self {
        Self {
            sink,
            style,
            overlay: Overlay::new(),
            chain,
            panel: ParameterPanel::new(),
            last_sequence: None,
            rendered: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn chain(&self) -> &ChainList {
        &self.chain
    }

    pub fn panel(&self) -> &ParameterPanel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut ParameterPanel {
        &mut self.panel
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Frames handed to the sink so far.
    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    pub fn tick(&mut self, worker: &PipelineWorker) -> Result<TickReport> {
        self.tick_with(worker.latest(), worker.registry())
    }

    /// One tick against an explicit snapshot of the latest result.
    pub fn tick_with(
        &mut self,
        latest: Option<Arc<Published>>,
        registry: &AlgorithmRegistry,
    ) -> Result<TickReport> {
        let mut report = TickReport::default();

        if let Some(published) = latest {
            report.sequence = Some(published.sequence);
            report.keypoints = published.keypoints.len();
            if self.last_sequence != Some(published.sequence) {
                let composited = self.compose(&published);
                self.sink.present(&composited, &published.keypoints)?;
                self.last_sequence = Some(published.sequence);
                self.rendered += 1;
                report.rendered = true;
                trace!(sequence = published.sequence, "frame presented");
            }
        }

        // Edits go to the unit they were made on, before any rebuild.
        report.pushed = self.panel.push();

        let selected = self.chain.selected_name().and_then(|name| registry.loaded(name));
        report.rebuilt = self.panel.select(selected);

        Ok(report)
    }

    /// Apply a user command and forward chain edits to the worker.
    pub fn command(&mut self, command: Command, worker: &PipelineWorker) -> Outcome {
        let available = worker.registry().available();
        let outcome = command.apply(&mut self.chain, &mut self.panel, &available);
        if outcome.chain_changed {
            debug!(chain = ?self.chain.names(), "chain edited");
            worker.set_chain(self.chain.names());
        }
        if outcome.toggle_overlay {
            self.style.show_overlay = !self.style.show_overlay;
        }
        outcome
    }

    fn compose(&mut self, published: &Published) -> Frame {
        self.overlay.clear();
        if self.style.show_overlay {
            for kp in &published.keypoints {
                let center = (kp.x.round() as i32, kp.y.round() as i32);
                let radius = kp.radius().round() as i32;
                let radius = if radius > 0 { radius } else { self.style.default_radius };
                self.overlay
                    .add_circle(center, radius, self.style.keypoint_color, self.style.stroke);
                self.overlay.add_crosshair(
                    center,
                    self.style.crosshair_arm,
                    self.style.crosshair_color,
                    self.style.stroke,
                    CrosshairStyle::Plus,
                );
            }
        }
        let frame = self.overlay.draw(&published.frame);
        if !self.style.show_hud {
            return frame;
        }

        let mut canvas = frame.to_rgb8();
        draw_hud(&mut canvas, &self.chain, &self.panel);
        DynamicImage::ImageRgb8(canvas)
    }
}

const HUD_SCALE: u32 = 2;
const HUD_TEXT: Rgb<u8> = Rgb([220, 220, 220]);
const HUD_SELECTED: Rgb<u8> = Rgb([255, 210, 0]);

fn hud_lines(chain: &ChainList, panel: &ParameterPanel) -> Vec<(String, bool)> {
    let mut lines = Vec::new();
    for (i, name) in chain.names().iter().enumerate() {
        lines.push((format!("{}. {}", i + 1, name), chain.selected() == Some(i)));
    }
    if chain.is_empty() {
        lines.push(("(empty chain)".to_string(), false));
    }
    for (i, editor) in panel.editors().iter().enumerate() {
        let value = match editor.kind {
            SettingKind::Slider { min, max } => format!("{} ({}-{})", editor.value, min, max),
            SettingKind::Checkbox => (if editor.value != 0 { "[X]" } else { "[ ]" }).to_string(),
        };
        lines.push((format!("  {}: {}", editor.name, value), i == panel.cursor()));
    }
    lines
}

fn draw_hud(canvas: &mut image::RgbImage, chain: &ChainList, panel: &ParameterPanel) {
    let lines = hud_lines(chain, panel);
    let line_h = font::line_height(HUD_SCALE);
    let width = lines
        .iter()
        .map(|(l, _)| font::measure_text_width(l, HUD_SCALE))
        .max()
        .unwrap_or(0);
    font::shade_rect(canvas, 0, 0, width + 8, lines.len() as u32 * line_h + 8);
    for (row, (line, highlighted)) in lines.iter().enumerate() {
        let color = if *highlighted { HUD_SELECTED } else { HUD_TEXT };
        font::draw_text_line(canvas, 4, 4 + row as u32 * line_h, line, color, HUD_SCALE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[derive(Default)]
    struct Recording {
        frames: Vec<(Frame, usize)>,
    }

    impl FrameSink for Recording {
        fn present(&mut self, frame: &Frame, keypoints: &[Keypoint]) -> Result<()> {
            self.frames.push((frame.clone(), keypoints.len()));
            Ok(())
        }
    }

    fn published(sequence: u64, keypoints: Vec<Keypoint>) -> Arc<Published> {
        Arc::new(Published {
            sequence,
            frame: DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]))),
            keypoints,
        })
    }

    fn quiet_style() -> OverlayStyle {
        OverlayStyle {
            show_hud: false,
            ..OverlayStyle::default()
        }
    }

    #[test]
    fn timer_fires_once_per_arm() {
        let mut timer = RefreshTimer::from_rate(60);
        assert_eq!(timer.period(), Duration::from_millis(16));
        let t0 = Instant::now();

        assert!(timer.arm(t0));
        assert!(!timer.arm(t0 + Duration::from_millis(5)));
        assert!(!timer.poll(t0 + Duration::from_millis(10)));
        assert!(timer.poll(t0 + Duration::from_millis(16)));
        assert!(!timer.poll(t0 + Duration::from_millis(40)));

        timer.arm(t0);
        timer.cancel();
        assert!(!timer.is_armed());
        assert!(!timer.poll(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn timer_period_has_a_floor() {
        assert_eq!(RefreshTimer::from_rate(5000).period(), Duration::from_millis(1));
        assert_eq!(RefreshTimer::from_rate(0).period(), Duration::from_millis(1000));
        let mut timer = RefreshTimer::from_rate(10);
        timer.set_rate(20);
        assert_eq!(timer.period(), Duration::from_millis(50));
    }

    #[test]
    fn renders_only_new_sequences() {
        let registry = AlgorithmRegistry::with_builtin();
        let mut presenter =
            Presenter::new(Recording::default(), quiet_style(), ChainList::default());

        assert!(!presenter.tick_with(None, &registry).unwrap().rendered);
        let first = published(1, Vec::new());
        assert!(presenter.tick_with(Some(first.clone()), &registry).unwrap().rendered);
        assert!(!presenter.tick_with(Some(first), &registry).unwrap().rendered);
        assert!(presenter.tick_with(Some(published(2, Vec::new())), &registry).unwrap().rendered);
        assert_eq!(presenter.rendered(), 2);
        assert_eq!(presenter.sink().frames.len(), 2);
    }

    #[test]
    fn keypoints_are_circled_when_overlays_are_on() {
        let registry = AlgorithmRegistry::with_builtin();
        let mut presenter =
            Presenter::new(Recording::default(), quiet_style(), ChainList::default());
        let kp = vec![Keypoint::new(32.0, 24.0, 20.0)];

        presenter.tick_with(Some(published(1, kp.clone())), &registry).unwrap();
        let (frame, count) = &presenter.sink().frames[0];
        assert_eq!(*count, 1);
        let rgb = frame.to_rgb8();
        assert_eq!(*rgb.get_pixel(39, 31), Rgb([0, 255, 0]));
        assert_eq!(*rgb.get_pixel(32, 24), Rgb([255, 0, 0]));

        presenter.style.show_overlay = false;
        presenter.tick_with(Some(published(2, kp)), &registry).unwrap();
        let (plain, _) = &presenter.sink().frames[1];
        assert_eq!(*plain.to_rgb8().get_pixel(32, 24), Rgb([10, 10, 10]));
    }

    #[test]
    fn editors_follow_the_selection_and_push_edits() {
        let registry = AlgorithmRegistry::with_builtin();
        let blur = registry.resolve("gaussian_blur").unwrap();
        registry.resolve("grayscale").unwrap();

        let chain = ChainList::new(&["gaussian_blur", "grayscale"]);
        let mut presenter = Presenter::new(Recording::default(), quiet_style(), chain);

        let report = presenter.tick_with(None, &registry).unwrap();
        assert!(report.rebuilt);
        assert_eq!(presenter.panel().algorithm_name(), Some("gaussian_blur"));
        assert!(!presenter.tick_with(None, &registry).unwrap().rebuilt);

        presenter.panel_mut().edit("blur_y", 7);
        let report = presenter.tick_with(None, &registry).unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(blur.settings().raw_or("blur_y", 0), 7);
    }

    #[test]
    fn hud_lists_chain_and_settings() {
        let registry = AlgorithmRegistry::with_builtin();
        let blur = registry.resolve("gaussian_blur").unwrap();
        let mut panel = ParameterPanel::new();
        panel.select(Some(blur));
        let chain = ChainList::new(&["gaussian_blur"]);

        let lines = hud_lines(&chain, &panel);
        assert_eq!(lines[0], ("1. gaussian_blur".to_string(), true));
        assert_eq!(lines[1].0, "  blur_x: 1 (1-35)");
        assert_eq!(lines[3].0, "  use_blur: [X]");
    }
}
