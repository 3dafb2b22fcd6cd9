//! Research pipeline orchestration.
//!
//! `Init -> Expand -> {Search -> Summarize -> FactCheck -> [GapAnalysis]}* ->
//! Write -> Edit? -> Cite -> Publish -> Done`, with `Failed` reachable from
//! any phase.

pub mod controller;
pub mod report;
pub mod result;
pub mod session;

pub use controller::ResearchController;
pub use result::{ANONYMOUS_USER, ResearchRequest, ResearchResult, Statistics};
pub use session::{NoOpResearchCallback, ResearchCallback, ResearchPhase, ResearchSession};
