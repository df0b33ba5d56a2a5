//! Shared test helpers for pipeline tests.

use async_trait::async_trait;
use mediguard_core::error::ProviderError;
use mediguard_core::reasoner::{Reasoner, ReasoningRequest, ReasoningResponse};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Fail(ProviderError),
    /// Reply with text after sleeping (tokio time)
    Delayed(Duration, String),
}

/// A mock reasoner that replays a script and records every request.
///
/// When the script runs out, the `fallback` step repeats forever; without
/// one, further calls panic.
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Step>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoner {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Step::Text(t.to_string())).collect())
    }

    /// Always reply with `text`.
    pub fn always(text: &str) -> Self {
        Self::repeating(Step::Text(text.into()))
    }

    pub fn repeating(step: Step) -> Self {
        Self {
            fallback: Some(step),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.prompt.clone()).collect()
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, request: ReasoningRequest) -> Result<ReasoningResponse, ProviderError> {
        let call = self.requests.lock().unwrap().len();
        self.requests.lock().unwrap().push(request);

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| panic!("ScriptedReasoner: no response for call #{call}"));

        match step {
            Step::Text(text) => Ok(ReasoningResponse::text(text)),
            Step::Fail(err) => Err(err),
            Step::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(ReasoningResponse::text(text))
            }
        }
    }
}
