//! System instructions and prompt builders for every phase.

use forge_phase_api::{ArchitectPlan, ComponentSpec, FabricatedComponent, Plan};
use forge_retrieval::RetrievedContext;

/// Marker format the streaming phases are asked to embed for progress reporting.
pub const STEP_MARKER_FORMAT: &str = "<!-- [KPC:STEP:n] -->";

pub(crate) const PLANNER_SYSTEM_INSTRUCTION: &str = "\
You are the lead front-end architect of KPC Forge.
Analyse the user's request and design a development plan for the KPC component library
(an enterprise Vue component library in the style of Element Plus).

Rules:
1. Return structured JSON only.
2. Only list KPC components (k-button, k-table, k-form, k-card and so on).
3. Keep the layout strategy short and implementable with Tailwind CSS.";

pub(crate) const REFINEMENT_PLANNER_SYSTEM_INSTRUCTION: &str = "\
You are the lead front-end architect of KPC Forge.
The page below already exists. Plan the smallest set of changes that satisfies the
user's new request. Keep components that still fit; list only steps that change code.
Return structured JSON only.";

pub(crate) const ARCHITECT_SYSTEM_INSTRUCTION: &str = "\
You are the system architect of KPC Forge.
Split the requested page into independent components that separate workers can build
in parallel. For each component give a unique PascalCase name, a description, and
exact props and emits contracts. Define the shared state the page root owns and the
logic flow that wires components together. Return structured JSON only.";

pub(crate) const WORKER_SYSTEM_INSTRUCTION: &str = "\
You are a component engineer at KPC Forge.
Build exactly one component as a Vue 3 template fragment using KPC components and
Tailwind CSS. Honour the props and emits contracts exactly as written; do not rename,
add or drop any of them. Output only the fragment, without Markdown fences.";

pub(crate) const ASSEMBLER_SYSTEM_INSTRUCTION: &str = "\
You are the integration engineer at KPC Forge.
Merge the supplied component fragments into one runnable single-file HTML page using
Vue 3 and Tailwind CSS from their CDNs. Own the global state at the page root and wire
component props and events as the contracts describe. Keep any fragment marked as a
failed fabrication visible as-is.";

pub(crate) const CODER_SYSTEM_INSTRUCTION: &str = "\
You are a senior front-end engineer at KPC Forge.
Generate a complete single-file HTML page from the development plan, using Vue 3
(https://unpkg.com/vue@3/dist/vue.global.js) and Tailwind CSS (https://cdn.tailwindcss.com).
KPC components are fictional: implement their base styles in a <style> block so the page
looks like a professional enterprise library with primary colour #2563EB.
Make interactions such as clicks and form bindings work.";

pub(crate) const REFINER_SYSTEM_INSTRUCTION: &str = "\
You maintain existing KPC Forge pages.
Adjust the current HTML according to the user's request. Keep the existing structure
(Vue + Tailwind + KPC styles) and change only what the request needs.";

/// Output rules appended to every streaming phase.
const STREAM_OUTPUT_RULES: &str = "

OUTPUT RULES:
1. Output the complete HTML document and nothing else.
2. Before the code for implementation step n, emit the marker <!-- [KPC:STEP:n] -->.
3. Do not describe what you are about to do; start with <!DOCTYPE html>.";

pub(crate) fn stream_instruction(base: &'static str) -> String {
    format!("{base}{STREAM_OUTPUT_RULES}")
}

fn context_block(context: &RetrievedContext) -> String {
    format!("# Reference\n\n{}", context.text)
}

pub(crate) fn plan_prompt(request: &str, context: &RetrievedContext) -> String {
    format!("# Request\n\n{request}\n\n{}", context_block(context))
}

pub(crate) fn refinement_plan_prompt(
    request: &str,
    current_code: &str,
    context: &RetrievedContext,
) -> String {
    format!(
        "# Current code\n\n{current_code}\n\n# Change request\n\n{request}\n\n{}",
        context_block(context)
    )
}

pub(crate) fn architect_prompt(request: &str, context: &RetrievedContext) -> String {
    plan_prompt(request, context)
}

/// The contract strings are embedded verbatim; callers must not rewrite them.
pub(crate) fn worker_prompt(
    spec: &ComponentSpec,
    global_state: &str,
    context: &RetrievedContext,
) -> String {
    format!(
        "# Component\n\nName: {}\nDescription: {}\n\n\
         # Props contract\n\n{}\n\n# Emits contract\n\n{}\n\n\
         # Shared state owned by the page\n\n{global_state}\n\n{}",
        spec.name,
        spec.description,
        spec.props_contract,
        spec.emits_contract,
        context_block(context)
    )
}

pub(crate) fn assemble_prompt(plan: &ArchitectPlan, components: &[FabricatedComponent]) -> String {
    let mut prompt = format!(
        "# Global state\n\n{}\n\n# Logic flow\n\n{}\n\n# Components\n",
        plan.global_state_definition, plan.main_logic_flow
    );
    if components.is_empty() {
        prompt.push_str("\n(no components; build the page shell from the logic flow)\n");
    }
    for component in components {
        prompt.push_str(&format!("\n## {}\n\n{}\n", component.name, component.code));
    }
    prompt.push_str("\n# Integration steps\n");
    for (i, component) in components.iter().enumerate() {
        prompt.push_str(&format!("{}. Integrate {}\n", i + 1, component.name));
    }
    prompt
}

pub(crate) fn code_prompt(plan: &Plan) -> String {
    let mut prompt = format!(
        "Generate the page from this development plan.\n\n# Layout\n\n{}\n\n# Components\n\n{}\n\n# Steps\n",
        plan.layout_strategy,
        plan.component_list.join(", ")
    );
    for (i, step) in plan.implementation_steps.iter().enumerate() {
        prompt.push_str(&format!("{}. {step}\n", i + 1));
    }
    prompt
}

pub(crate) fn refine_prompt(current_code: &str, request: &str, plan: &Plan) -> String {
    let mut prompt =
        format!("# Current code\n\n{current_code}\n\n# Change request\n\n{request}\n\n# Steps\n");
    for (i, step) in plan.implementation_steps.iter().enumerate() {
        prompt.push_str(&format!("{}. {step}\n", i + 1));
    }
    prompt
}
