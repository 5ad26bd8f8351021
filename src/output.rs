use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::presentation::FrameSink;
use crate::types::{Frame, Keypoint};

/// Sink for runs without a window: logs what was found and optionally
/// saves the last composited frame.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    snapshot: Option<PathBuf>,
    last: Option<Frame>,
    presented: u64,
}

impl HeadlessSink {
    pub fn new(snapshot: Option<PathBuf>) -> Self {
        Self {
            snapshot,
            last: None,
            presented: 0,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last.as_ref()
    }

    /// Write the snapshot, if one was requested and a frame was presented.
    pub fn finish(&self) -> Result<Option<PathBuf>> {
        let (Some(path), Some(frame)) = (&self.snapshot, &self.last) else {
            return Ok(None);
        };
        frame
            .save(path)
            .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
        info!(path = %path.display(), "snapshot saved");
        Ok(Some(path.clone()))
    }
}

impl FrameSink for HeadlessSink {
    fn present(&mut self, frame: &Frame, keypoints: &[Keypoint]) -> Result<()> {
        self.presented += 1;
        let points: Vec<String> = keypoints
            .iter()
            .map(|k| format!("({:.1}, {:.1}) r={:.1}", k.x, k.y, k.radius()))
            .collect();
        info!(frame = self.presented, found = keypoints.len(), keypoints = ?points, "frame");
        if self.snapshot.is_some() {
            self.last = Some(frame.clone());
        }
        Ok(())
    }
}

#[cfg(feature = "gui")]
pub use window::WindowOutput;

#[cfg(feature = "gui")]
mod window {
    use anyhow::{anyhow, Result};
    use minifb::{Key, KeyRepeat};

    use crate::controls::Command;
    use crate::presentation::FrameSink;
    use crate::types::{Frame, Keypoint};

    const KEYMAP: &[(Key, Command)] = &[
        (Key::Up, Command::SelectPrev),
        (Key::Down, Command::SelectNext),
        (Key::LeftBracket, Command::MoveUp),
        (Key::RightBracket, Command::MoveDown),
        (Key::Delete, Command::Remove),
        (Key::A, Command::AddNext),
        (Key::Comma, Command::PrevSetting),
        (Key::Period, Command::NextSetting),
        (Key::Left, Command::Adjust(-1)),
        (Key::Right, Command::Adjust(1)),
        (Key::Space, Command::Toggle),
        (Key::O, Command::ToggleOverlay),
        (Key::Escape, Command::Close),
    ];

    pub struct WindowOutput {
        window: minifb::Window,
        buffer: Vec<u32>,
        width: usize,
        height: usize,
        fresh: bool,
    }

    impl WindowOutput {
        pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
            let window = minifb::Window::new(
                title,
                width,
                height,
                minifb::WindowOptions {
                    resize: true,
                    ..minifb::WindowOptions::default()
                },
            )
            .map_err(|e| anyhow!("Failed to create window: {}", e))?;

            Ok(Self {
                window,
                buffer: vec![0; width * height],
                width,
                height,
                fresh: false,
            })
        }
    }

    impl FrameSink for WindowOutput {
        fn present(&mut self, frame: &Frame, _keypoints: &[Keypoint]) -> Result<()> {
            let rgb = frame.to_rgb8();
            let target_w = rgb.width() as usize;
            let target_h = rgb.height() as usize;
            if target_w != self.width || target_h != self.height {
                self.width = target_w;
                self.height = target_h;
            }
            self.buffer.resize(self.width * self.height, 0);

            // RGB8 to 0RGB u32
            for (dst, pixel) in self.buffer.iter_mut().zip(rgb.pixels()) {
                let r = pixel[0] as u32;
                let g = pixel[1] as u32;
                let b = pixel[2] as u32;
                *dst = (r << 16) | (g << 8) | b;
            }

            self.fresh = true;
            self.window
                .update_with_buffer(&self.buffer, self.width, self.height)
                .map_err(|e| anyhow!("Window update failed: {}", e))
        }

        fn commands(&mut self) -> Vec<Command> {
            // Key state only advances on an update; pump events between frames.
            if !std::mem::take(&mut self.fresh) {
                self.window.update();
            }
            let mut commands: Vec<Command> = KEYMAP
                .iter()
                .filter(|(key, _)| self.window.is_key_pressed(*key, KeyRepeat::Yes))
                .map(|(_, command)| *command)
                .collect();
            if !self.window.is_open() {
                commands.push(Command::Close);
            }
            commands
        }

        fn is_open(&self) -> bool {
            self.window.is_open()
        }
    }
}
