//! Contract rollout: the persisted address manifest and the step sequencer

mod manifest;
mod sequencer;

pub use manifest::DeploymentRecord;
pub use sequencer::DeploymentSequencer;
