//! The seam between prompt construction and the hosted model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A file previously uploaded to the model's file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub uri: String,
    pub mime_type: String,
}

/// One piece of request content, in the order the model should read it.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
    File(FileRef),
}

/// A single-turn generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub parts: Vec<Part>,
    /// Reasoning tokens the model may spend. 0 disables "thinking".
    pub thinking_budget: u32,
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Text(instruction.into())],
            thinking_budget: 0,
            temperature: None,
        }
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// The instruction text (first text part), if any.
    pub fn instruction(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            Part::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }
}

/// Hosted generative model.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run one generation and return the reply text.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Upload a reference file for later requests to point at.
    async fn upload_reference(
        &self,
        display_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<FileRef>;
}
