pub mod queue;
pub mod reaper;
