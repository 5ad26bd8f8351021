use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("video source {device:?} is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("failed to load algorithm {name:?}")]
    AlgorithmLoad {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("stage {stage:?} faulted: {message}")]
    StageFault { stage: String, message: String },
}

impl VisionError {
    pub fn device(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            reason: reason.to_string(),
        }
    }
}
