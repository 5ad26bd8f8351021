//! Frame sources and processing units that make the worker observable.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use image::{DynamicImage, Rgb, RgbImage};

use rusty_nozzle::camera::FrameSource;
use rusty_nozzle::settings::Settings;
use rusty_nozzle::types::{Auxiliary, Frame, Keypoint};
use rusty_nozzle::{Algorithm, PipelineWorker};

/// A small frame whose identity is encoded in its red channel.
pub fn frame(id: u8) -> Frame {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([id, 0, 0])))
}

pub fn frame_id(frame: &Frame) -> u8 {
    frame.to_rgb8().get_pixel(0, 0).0[0]
}

/// Replays a fixed script of reads, then returns `None` forever.
pub struct ScriptedSource {
    script: VecDeque<Option<Frame>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<Frame>>) -> Self {
        Self {
            script: script.into(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn frames(ids: impl IntoIterator<Item = u8>) -> Self {
        Self::new(ids.into_iter().map(|id| Some(frame(id))).collect())
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn resolution(&self) -> (u32, u32) {
        (4, 4)
    }

    fn get_frame(&mut self) -> Option<Frame> {
        if self.is_closed() {
            return None;
        }
        match self.script.pop_front() {
            Some(read) => read,
            None => {
                thread::sleep(Duration::from_millis(1));
                None
            }
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Reads are fed one at a time by the test; an idle channel reads as `None`.
pub struct ChannelSource {
    rx: Receiver<Option<Frame>>,
    delivered: Arc<AtomicUsize>,
    closed: bool,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Option<Frame>>) -> (Self, Arc<AtomicUsize>) {
        let delivered = Arc::new(AtomicUsize::new(0));
        (
            Self {
                rx,
                delivered: delivered.clone(),
                closed: false,
            },
            delivered,
        )
    }
}

impl FrameSource for ChannelSource {
    fn name(&self) -> String {
        "channel".to_string()
    }

    fn resolution(&self) -> (u32, u32) {
        (4, 4)
    }

    fn get_frame(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        match self.rx.recv_timeout(Duration::from_millis(5)) {
            Ok(read) => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
                read
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Keypoint left by a stage: x is the frame id, y the stage tag.
pub fn stamp(frame: &Frame, tag: u8) -> Keypoint {
    Keypoint::new(frame_id(frame) as f32, tag as f32, 0.0)
}

/// Stage tags, in the order the stages ran.
pub fn tags(keypoints: &[Keypoint]) -> Vec<u8> {
    keypoints.iter().map(|k| k.y as u8).collect()
}

fn appended(input: &Auxiliary, kp: Keypoint) -> Auxiliary {
    let mut points = input.keypoints.clone().unwrap_or_default();
    points.push(kp);
    Auxiliary::with_keypoints(points)
}

/// Passes the frame through and appends its stamp.
pub struct Marker {
    name: String,
    tag: u8,
    settings: Settings,
}

impl Marker {
    pub fn new(name: &str, tag: u8) -> Self {
        Self {
            name: name.to_string(),
            tag,
            settings: Settings::empty(),
        }
    }
}

impl Algorithm for Marker {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn process(&self, frame: &Frame, input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
        Ok((frame.clone(), appended(input, stamp(frame, self.tag))))
    }
}

/// Faults on even frame ids: an error on ids 2 mod 4, a panic on ids 0 mod 4.
pub struct EvenFault {
    tag: u8,
    settings: Settings,
}

impl EvenFault {
    pub fn new(tag: u8) -> Self {
        Self {
            tag,
            settings: Settings::empty(),
        }
    }
}

impl Algorithm for EvenFault {
    fn name(&self) -> &str {
        "even_fault"
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn process(&self, frame: &Frame, input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
        match frame_id(frame) % 4 {
            0 => panic!("frame {} rejected", frame_id(frame)),
            2 => bail!("frame {} rejected", frame_id(frame)),
            _ => Ok((frame.clone(), appended(input, stamp(frame, self.tag)))),
        }
    }
}

/// Blocks inside `process` until the test releases it, after announcing
/// which frame it holds.
pub struct Gate {
    tag: u8,
    entered: Mutex<Sender<u8>>,
    release: Mutex<Receiver<()>>,
    settings: Settings,
}

impl Gate {
    pub fn new(tag: u8, entered: Sender<u8>, release: Receiver<()>) -> Self {
        Self {
            tag,
            entered: Mutex::new(entered),
            release: Mutex::new(release),
            settings: Settings::empty(),
        }
    }
}

impl Algorithm for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn process(&self, frame: &Frame, input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
        self.entered
            .lock()
            .map_err(|_| anyhow!("gate poisoned"))?
            .send(frame_id(frame))?;
        self.release
            .lock()
            .map_err(|_| anyhow!("gate poisoned"))?
            .recv_timeout(Duration::from_secs(5))?;
        Ok((frame.clone(), appended(input, stamp(frame, self.tag))))
    }
}

/// Poll until `pred` holds, failing the test after a few seconds.
pub fn wait_for(worker: &PipelineWorker, what: &str, pred: impl Fn(&PipelineWorker) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !pred(worker) {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn published_sequence(worker: &PipelineWorker) -> u64 {
    worker.latest().map_or(0, |p| p.sequence)
}
