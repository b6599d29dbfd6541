//! Workflow Flow - ordered sequence of steps
//!
//! A Workflow is an immutable template: a name and its steps in execution
//! order. It holds no run state and is shared across concurrent runs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use mm_core::{Error, Result};

use crate::step::Step;

/// Serializable summary of a workflow, for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Ordered steps under a name
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    description: String,
    steps: Vec<Step>,
}

impl Workflow {
    /// Create a workflow from steps. Step names must be unique.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_config("workflow name must not be empty"));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name()) {
                return Err(Error::duplicate("step", step.name()));
            }
        }

        Ok(Self {
            name,
            description: String::new(),
            steps,
        })
    }

    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn info(&self) -> WorkflowInfo {
        WorkflowInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| StepInfo {
                    name: s.name().to_string(),
                    kind: s.kind().to_string(),
                    description: s.description().to_string(),
                })
                .collect(),
        }
    }
}

pub struct WorkflowBuilder {
    name: String,
    description: String,
    steps: Vec<Step>,
}

impl WorkflowBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn build(self) -> Result<Workflow> {
        let mut workflow = Workflow::new(self.name, self.steps)?;
        workflow.description = self.description;
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::async_executor_fn;
    use mm_core::{StepInput, StepOutput};

    fn passthrough(name: &str) -> Step {
        Step::executor(
            name,
            async_executor_fn(|input: StepInput| async move {
                Ok(StepOutput::next(input.previous_step_content))
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_builder_keeps_order() {
        let wf = Workflow::builder("wf")
            .description("two steps")
            .step(passthrough("a"))
            .step(passthrough("b"))
            .build()
            .unwrap();
        let names: Vec<&str> = wf.steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(wf.info().steps[1].kind, "executor");
        assert_eq!(wf.description(), "two steps");
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let err = Workflow::new("wf", vec![passthrough("a"), passthrough("a")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { namespace: "step", .. }));
    }

    #[test]
    fn test_empty_workflow_allowed() {
        let wf = Workflow::new("noop", vec![]).unwrap();
        assert!(wf.is_empty());
    }
}
