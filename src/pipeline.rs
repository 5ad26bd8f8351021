use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use anyhow::Result;
use tracing::debug;

use crate::error::VisionError;
use crate::settings::Settings;
use crate::types::{Auxiliary, Frame};

/// A pluggable processing unit.
///
/// One instance is shared by every chain that names it, so `process` takes
/// `&self` and reads its tunables from [`Settings`] at the start of each call.
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &str;

    fn settings(&self) -> &Settings;

    /// Transform `frame`. `input` is the auxiliary output of the previous
    /// stage (empty before the first stage).
    fn process(&self, frame: &Frame, input: &Auxiliary) -> Result<(Frame, Auxiliary)>;
}

/// Ordered stages applied to every frame. Never mutated once built; a new
/// chain replaces it wholesale.
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<Arc<dyn Algorithm>>,
}

/// Result of threading one frame through a [`Chain`].
pub struct ChainPass {
    pub frame: Frame,
    pub auxiliary: Auxiliary,
    /// Stages that were skipped for this frame.
    pub faults: Vec<VisionError>,
}

impl Chain {
    pub fn new(stages: Vec<Arc<dyn Algorithm>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Arc<dyn Algorithm>] {
        &self.stages
    }

    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run every stage in order. A stage that errors or panics is skipped:
    /// the frame and auxiliary value from before it flow on to the next stage.
    pub fn apply(&self, frame: Frame) -> ChainPass {
        let mut frame = frame;
        let mut auxiliary = Auxiliary::default();
        let mut faults = Vec::new();

        for stage in &self.stages {
            match run_stage(stage.as_ref(), &frame, &auxiliary) {
                Ok((next_frame, next_aux)) => {
                    frame = next_frame;
                    auxiliary = next_aux;
                }
                Err(fault) => {
                    debug!(%fault, "stage skipped for this frame");
                    faults.push(fault);
                }
            }
        }

        ChainPass {
            frame,
            auxiliary,
            faults,
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stages.iter().map(|s| s.name())).finish()
    }
}

thread_local! {
    static IN_STAGE: Cell<bool> = const { Cell::new(false) };
}

static QUIET_STAGE_PANICS: Once = Once::new();

/// Wrap the process panic hook so panics raised inside a stage are not
/// printed; they surface as [`VisionError::StageFault`] instead. Panics
/// anywhere else still reach the previous hook.
fn install_panic_filter() {
    QUIET_STAGE_PANICS.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !IN_STAGE.with(Cell::get) {
                previous(info);
            }
        }));
    });
}

fn run_stage(
    stage: &dyn Algorithm,
    frame: &Frame,
    input: &Auxiliary,
) -> Result<(Frame, Auxiliary), VisionError> {
    install_panic_filter();
    IN_STAGE.with(|flag| flag.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.process(frame, input)));
    IN_STAGE.with(|flag| flag.set(false));
    let message = match outcome {
        Ok(Ok(output)) => return Ok(output),
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };
    Err(VisionError::StageFault {
        stage: stage.name().to_string(),
        message,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keypoint;
    use anyhow::bail;
    use image::{DynamicImage, GrayImage, Luma};

    struct AddOne {
        settings: Settings,
    }

    impl Algorithm for AddOne {
        fn name(&self) -> &str {
            "add_one"
        }
        fn settings(&self) -> &Settings {
            &self.settings
        }
        fn process(&self, frame: &Frame, input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
            let mut gray = frame.to_luma8();
            for p in gray.pixels_mut() {
                p.0[0] = p.0[0].saturating_add(1);
            }
            let mut points = input.keypoints.clone().unwrap_or_default();
            points.push(Keypoint::new(points.len() as f32, 0.0, 0.0));
            Ok((DynamicImage::ImageLuma8(gray), Auxiliary::with_keypoints(points)))
        }
    }

    struct Broken {
        panics: bool,
        settings: Settings,
    }

    impl Algorithm for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn settings(&self) -> &Settings {
            &self.settings
        }
        fn process(&self, _frame: &Frame, _input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
            if self.panics {
                panic!("kernel size must be odd");
            }
            bail!("invalid parameter combination")
        }
    }

    fn add_one() -> Arc<dyn Algorithm> {
        Arc::new(AddOne {
            settings: Settings::empty(),
        })
    }

    fn broken(panics: bool) -> Arc<dyn Algorithm> {
        Arc::new(Broken {
            panics,
            settings: Settings::empty(),
        })
    }

    fn frame(v: u8) -> Frame {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([v])))
    }

    #[test]
    fn empty_chain_is_identity() {
        let pass = Chain::default().apply(frame(9));
        assert_eq!(pass.frame, frame(9));
        assert_eq!(pass.auxiliary, Auxiliary::default());
        assert!(pass.faults.is_empty());
    }

    #[test]
    fn stages_thread_frame_and_auxiliary_in_order() {
        let chain = Chain::new(vec![add_one(), add_one(), add_one()]);
        let pass = chain.apply(frame(0));
        assert_eq!(pass.frame.to_luma8().get_pixel(0, 0).0[0], 3);
        let xs: Vec<f32> = pass.auxiliary.into_keypoints().iter().map(|k| k.x).collect();
        assert_eq!(xs, [0.0, 1.0, 2.0]);
    }

    #[test]
    fn faulting_stage_is_skipped_and_later_stages_run() {
        for panics in [false, true] {
            let chain = Chain::new(vec![add_one(), broken(panics), add_one()]);
            let pass = chain.apply(frame(10));
            assert_eq!(pass.frame.to_luma8().get_pixel(1, 1).0[0], 12);
            assert_eq!(pass.auxiliary.into_keypoints().len(), 2);
            assert_eq!(pass.faults.len(), 1);
            assert!(matches!(
                &pass.faults[0],
                VisionError::StageFault { stage, .. } if stage == "broken"
            ));
        }
    }

    #[test]
    fn names_follow_stage_order() {
        let chain = Chain::new(vec![broken(false), add_one()]);
        assert_eq!(chain.names(), ["broken", "add_one"]);
        assert_eq!(format!("{chain:?}"), r#"["broken", "add_one"]"#);
    }

    #[test]
    fn stage_panics_are_silenced_only_inside_stages() {
        let pass = Chain::new(vec![broken(true)]).apply(frame(1));
        assert_eq!(pass.faults.len(), 1);
        assert!(QUIET_STAGE_PANICS.is_completed());
        assert!(!IN_STAGE.with(Cell::get));

        // A panic outside a stage still runs the previous hook and unwinds.
        let outside = panic::catch_unwind(|| panic!("not a stage"));
        assert!(outside.is_err());
        assert!(!IN_STAGE.with(Cell::get));
    }
}
