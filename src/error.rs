use std::time::Duration;

/// Failures surfaced by the GPU layer. None of these are retried internally;
/// the application layer decides between teardown and (for `DeviceLost`)
/// recreating the device and all GPU resources.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("graphics device lost: {reason}")]
    DeviceLost { reason: String },

    #[error("failed to create {what}")]
    ResourceCreationFailed { what: &'static str },

    #[error("fence value {value} on the {queue} queue did not signal within {waited:?}")]
    FenceWaitTimeout {
        queue: &'static str,
        value: u64,
        waited: Duration,
    },
}
