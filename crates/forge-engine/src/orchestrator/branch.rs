use forge_config::PipelineFlow;
use forge_phase_api::Branch;

/// Choose the phase sequence for a request.
///
/// Without an override, the flat flow refines substantial code in place and
/// builds everything else hierarchically; the hierarchical flow always builds
/// hierarchically. A forced refinement with nothing substantial to refine
/// falls back to the hierarchical build.
#[must_use]
pub fn select_branch(requested: Option<Branch>, flow: PipelineFlow, substantial: bool) -> Branch {
    match requested {
        Some(Branch::Refine) if !substantial => Branch::Hierarchical,
        Some(branch) => branch,
        None => match flow {
            PipelineFlow::Flat if substantial => Branch::Refine,
            PipelineFlow::Flat | PipelineFlow::Hierarchical => Branch::Hierarchical,
        },
    }
}
