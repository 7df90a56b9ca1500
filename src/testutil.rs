use std::cell::RefCell;

use crate::llm::{DescriptionProvider, EmbeddingProvider, LlmError, PromptProvider};

/// Deterministic stand-in embedder: folds bytes into a fixed-size vector so
/// equal texts always embed equally.
pub struct StubEmbeddingProvider {
    pub dim: usize,
    pub fail_after: Option<usize>,
    calls: RefCell<usize>,
}

impl StubEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            fail_after: None,
            calls: RefCell::new(0),
        }
    }

    pub fn embed_fixture(text: &str, dim: usize) -> Vec<f32> {
        let mut vec = vec![0.0_f32; dim];
        for (i, byte) in text.bytes().enumerate() {
            vec[i % dim] += byte as f32;
        }
        vec
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embedder(&self) -> &str {
        "tests"
    }

    fn model_id(&self) -> &str {
        "stub:v1"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut calls = self.calls.borrow_mut();
        *calls += 1;
        if let Some(limit) = self.fail_after {
            if *calls > limit {
                return Err(LlmError::Transient("stub connection dropped".to_string()));
            }
        }

        Ok(Self::embed_fixture(text, self.dim))
    }
}

pub struct StubDescriptionProvider;

impl DescriptionProvider for StubDescriptionProvider {
    fn model_id(&self) -> &str {
        "stub-describe:v1"
    }

    fn describe(&self, text: &str, _context: &str) -> Result<String, LlmError> {
        Ok(format!("description of {text}"))
    }
}

pub struct StubPromptProvider {
    pub responses: RefCell<Vec<String>>,
}

impl StubPromptProvider {
    pub fn returning(response: &str) -> Self {
        Self {
            responses: RefCell::new(vec![response.to_string()]),
        }
    }
}

impl PromptProvider for StubPromptProvider {
    fn model_id(&self) -> &str {
        "stub-prompt:v1"
    }

    fn prompt(&self, _prompt: &str) -> Result<String, LlmError> {
        self.responses
            .borrow_mut()
            .pop()
            .ok_or_else(|| LlmError::Transient("stub prompt exhausted".to_string()))
    }
}
