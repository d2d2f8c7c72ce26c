use crate::domain::ports::TeardownFn;
use crate::utils::error::StackError;

struct TeardownStep {
    label: String,
    action: TeardownFn,
}

/// LIFO list of teardown closures for acquired resources.
#[derive(Default)]
pub struct TeardownStack {
    steps: Vec<TeardownStep>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, action: TeardownFn) {
        self.steps.push(TeardownStep {
            label: label.into(),
            action,
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Labels in registration order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label.as_str()).collect()
    }

    /// Run every step, newest first. A failing step does not stop the rest.
    pub async fn unwind(mut self) -> Vec<StackError> {
        let mut errors = Vec::new();

        while let Some(step) = self.steps.pop() {
            tracing::debug!("Tearing down {}", step.label);
            if let Err(e) = (step.action)().await {
                tracing::warn!("Teardown of {} failed: {}", step.label, e);
                errors.push(e);
            }
        }

        errors
    }
}

impl std::fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownStack")
            .field("steps", &self.labels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_step(log: &Arc<Mutex<Vec<String>>>, name: &str, fail: bool) -> TeardownFn {
        let log = log.clone();
        let name = name.to_string();
        Box::new(move || {
            Box::pin(async move {
                log.lock().unwrap().push(name.clone());
                if fail {
                    Err(StackError::config(format!("{} refused to stop", name)))
                } else {
                    Ok(())
                }
            })
        })
    }

    #[tokio::test]
    async fn test_unwind_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push("network", recording_step(&log, "network", false));
        stack.push("jaeger", recording_step(&log, "jaeger", false));
        stack.push("collector", recording_step(&log, "collector", false));

        assert_eq!(stack.labels(), vec!["network", "jaeger", "collector"]);

        let errors = stack.unwind().await;

        assert!(errors.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["collector", "jaeger", "network"]);
    }

    #[tokio::test]
    async fn test_unwind_continues_past_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push("network", recording_step(&log, "network", true));
        stack.push("seq", recording_step(&log, "seq", false));
        stack.push("jaeger", recording_step(&log, "jaeger", true));

        let errors = stack.unwind().await;

        assert_eq!(*log.lock().unwrap(), vec!["jaeger", "seq", "network"]);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("jaeger"));
        assert!(errors[1].to_string().contains("network"));
    }

    #[tokio::test]
    async fn test_unwind_empty_stack() {
        let stack = TeardownStack::new();
        assert!(stack.is_empty());
        assert!(stack.unwind().await.is_empty());
    }
}
