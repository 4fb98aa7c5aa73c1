// src/download/mod.rs
// =============================================================================
// The resumable download pipeline.
//
// Submodules:
// - resume: where an interrupted download picks up again
// - scheduler: bounded-parallel fetch-and-save of one page, with politeness
// - verify: checks the finished directory for gaps
// - session: runs one gallery through all of the above
// =============================================================================

mod resume;
mod scheduler;
mod session;
mod verify;

pub use session::{DownloadSession, SessionOutcome};
