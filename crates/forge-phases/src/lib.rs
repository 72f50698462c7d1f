//! Concrete phase executors for the forge pipeline
//!
//! | Executor | Phase | Output |
//! |----------|-------|--------|
//! | [`PlanExecutor`] | `planning` | flat [`Plan`](forge_phase_api::Plan), degrades on failure |
//! | [`ArchitectExecutor`] | `architecting` | [`ArchitectPlan`](forge_phase_api::ArchitectPlan), hard error on failure |
//! | [`FabricateExecutor`] | `fabricating` | one component, placeholder on failure |
//! | [`StreamExecutor`] | `assembling` / `coding` / `refining` | streamed snapshots |

mod architect;
mod clean;
mod fabricate;
mod plan;
mod prompts;
mod stream;

pub use architect::{ArchitectExecutor, architect_schema};
pub use clean::{clean_code, scan_steps};
pub use fabricate::FabricateExecutor;
pub use plan::{PlanExecutor, plan_schema};
pub use prompts::STEP_MARKER_FORMAT;
pub use stream::StreamExecutor;
