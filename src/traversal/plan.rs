//! Step plans for resolving a request against the resource tree.

use crate::request::RequestType;
use crate::resource::ResourcePath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Descend into the named member.
    Read(String),
    Create,
    Update,
    Delete,
}

/// One `Read` per path segment followed by the terminal operation. A read
/// request is just the reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalPlan {
    steps: Vec<Step>,
}

impl TraversalPlan {
    pub fn new(request_type: RequestType, path: &ResourcePath) -> Self {
        let mut steps: Vec<Step> = path
            .segments()
            .iter()
            .map(|s| Step::Read(s.name().to_string()))
            .collect();
        match request_type {
            RequestType::Read => {}
            RequestType::Create => steps.push(Step::Create),
            RequestType::Update => steps.push(Step::Update),
            RequestType::Delete => steps.push(Step::Delete),
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Swap the step at `index` for `step`.
    pub fn replace(&mut self, index: usize, step: Step) {
        if let Some(slot) = self.steps.get_mut(index) {
            *slot = step;
        }
    }

    /// Drop the step at `index`.
    pub fn remove(&mut self, index: usize) {
        if index < self.steps.len() {
            self.steps.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_then_terminal_step() {
        let plan = TraversalPlan::new(RequestType::Update, &ResourcePath::parse("/a/b"));
        assert_eq!(
            plan.steps(),
            &[Step::Read("a".into()), Step::Read("b".into()), Step::Update]
        );
        let plan = TraversalPlan::new(RequestType::Read, &ResourcePath::root());
        assert!(plan.steps().is_empty());
    }
}
