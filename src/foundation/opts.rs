use crate::foundation::error::{BridgeError, BridgeResult};

/// What a search producer does when the sample channel is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Block the producing engine thread until the host drains a slot (or the session closes).
    #[default]
    Block,
    /// Drop the offered sample and count it.
    DropNewest,
}

/// Sample channel configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SampleChannelOpts {
    /// Maximum queued records. `None` makes the channel unbounded.
    pub capacity: Option<usize>,
    /// Policy applied when `capacity` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for SampleChannelOpts {
    fn default() -> Self {
        Self {
            capacity: Some(256),
            overflow: OverflowPolicy::Block,
        }
    }
}

/// Options controlling a [`crate::Bridge`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BridgeOpts {
    /// Number of rayon worker threads running async work units. `None` uses rayon defaults.
    pub worker_threads: Option<usize>,
    /// Override for the hardware concurrency used to clamp search threads.
    pub hardware_threads: Option<usize>,
    /// Sample channel bound and overflow policy.
    pub sample_channel: SampleChannelOpts,
}

impl BridgeOpts {
    /// Reject option combinations that can never work.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.worker_threads == Some(0) {
            return Err(BridgeError::argument(
                "'worker_threads' must be >= 1 when set",
            ));
        }
        if self.hardware_threads == Some(0) {
            return Err(BridgeError::argument(
                "'hardware_threads' must be >= 1 when set",
            ));
        }
        if self.sample_channel.capacity == Some(0) {
            return Err(BridgeError::argument(
                "sample channel 'capacity' must be >= 1 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/opts.rs"]
mod tests;
