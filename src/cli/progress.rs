//! Terminal rendering of orchestrator events.

use forge_engine::ForgeEvent;
use forge_phase_api::StepProgress;
use forge_utils::types::Sender;

/// Turns events into progress lines, suppressing repeated step counts.
#[derive(Debug, Default)]
pub(crate) struct ProgressPrinter {
    last_step: Option<StepProgress>,
}

impl ProgressPrinter {
    pub fn line(&mut self, event: &ForgeEvent) -> Option<String> {
        match event {
            ForgeEvent::PhaseChanged { phase, .. } => {
                self.last_step = None;
                (!phase.is_resting()).then(|| format!("... {phase}"))
            }
            ForgeEvent::Message { message, .. } => match message.sender {
                Sender::User => None,
                Sender::System => Some(format!("! {}", message.text)),
                Sender::Ai => {
                    let mut line = match message.agent {
                        Some(agent) => format!("[{agent}] {}", message.text),
                        None => message.text.clone(),
                    };
                    if let Some(plan) = &message.plan {
                        for (i, step) in plan.steps().iter().enumerate() {
                            line.push_str(&format!("\n    {}. {step}", i + 1));
                        }
                    }
                    Some(line)
                }
            },
            ForgeEvent::Snapshot {
                step: Some(step), ..
            } if self.last_step != Some(*step) => {
                self.last_step = Some(*step);
                Some(format!("    step {}/{}", step.current, step.total))
            }
            _ => None,
        }
    }
}
