use serde::{Deserialize, Serialize};

/// Flat plan produced once per simple build or refinement cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub thought_process: String,
    pub component_list: Vec<String>,
    pub layout_strategy: String,
    pub implementation_steps: Vec<String>,
}

impl Plan {
    /// Degraded plan used when planning fails. A valid outcome, not an error.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            thought_process: "The AI service is busy right now, so no detailed reasoning is available."
                .to_string(),
            component_list: Vec::new(),
            layout_strategy: "Default layout".to_string(),
            implementation_steps: vec!["Please retry".to_string()],
        }
    }
}

/// Interface boundary for one component worker.
///
/// The contract strings are passed verbatim into the worker prompt and are
/// never edited by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub description: String,
    pub props_contract: String,
    pub emits_contract: String,
}

/// Hierarchical plan splitting a page into independently built components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectPlan {
    pub thought_process: String,
    pub global_state_definition: String,
    /// Missing in the model output means "no components", never an error.
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    pub main_logic_flow: String,
}

impl ArchitectPlan {
    /// First component name that appears more than once, if any.
    #[must_use]
    pub fn duplicate_component(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.components
            .iter()
            .map(|c| c.name.as_str())
            .find(|name| !seen.insert(*name))
    }
}

/// The plan that drove a generation, as shown to UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "plan", rename_all = "snake_case")]
pub enum PlanKind {
    Flat(Plan),
    Hierarchical(ArchitectPlan),
}

impl PlanKind {
    /// Step labels used for progress reporting.
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        match self {
            Self::Flat(plan) => plan.implementation_steps.clone(),
            Self::Hierarchical(plan) => plan
                .components
                .iter()
                .map(|c| format!("Integrate {}", c.name))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_components_default_to_empty() {
        let plan: ArchitectPlan = serde_json::from_str(
            r#"{"thought_process":"t","global_state_definition":"g","main_logic_flow":"m"}"#,
        )
        .unwrap();
        assert!(plan.components.is_empty());
    }

    #[test]
    fn test_flat_plan_requires_all_fields() {
        let result = serde_json::from_str::<Plan>(r#"{"thought_process":"t"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_component_detection() {
        let spec = |name: &str| ComponentSpec {
            name: name.to_string(),
            description: String::new(),
            props_contract: String::new(),
            emits_contract: String::new(),
        };
        let mut plan = ArchitectPlan {
            thought_process: String::new(),
            global_state_definition: String::new(),
            components: vec![spec("Header"), spec("Table")],
            main_logic_flow: String::new(),
        };
        assert_eq!(plan.duplicate_component(), None);
        plan.components.push(spec("Header"));
        assert_eq!(plan.duplicate_component(), Some("Header"));
    }

    #[test]
    fn test_fallback_plan_shape() {
        let plan = Plan::fallback();
        assert!(plan.component_list.is_empty());
        assert_eq!(plan.implementation_steps.len(), 1);
        assert!(!plan.thought_process.is_empty());
    }

    #[test]
    fn test_plan_kind_is_tagged() {
        let json = serde_json::to_value(PlanKind::Flat(Plan::fallback())).unwrap();
        assert_eq!(json["kind"], "flat");
        assert_eq!(json["plan"]["layout_strategy"], "Default layout");
    }
}
