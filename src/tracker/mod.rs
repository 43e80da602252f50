mod job;
mod tracker;

pub use job::{Job, JobState, PollConfig};
pub use tracker::{JobTracker, TrackerConfig};
