//! Reasoner trait: the seam to the external component that turns an
//! assembled context into a decision.
//!
//! The reasoner is reached through an opaque request/response channel. This
//! crate only fixes the contract: a JSON request goes in, a JSON response
//! comes out. How the channel is transported is the implementor's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ReasonerError;

/// A single request to the reasoner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerRequest {
    /// Identifier of the task the loop is working on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Instruction for this reasoning step
    pub prompt: String,

    /// The assembled working-memory context
    pub context: serde_json::Value,

    /// Token budget the context was assembled under
    pub max_tokens: usize,

    /// Logical cycle the request was produced in
    #[serde(default)]
    pub cycle: u64,
}

/// The reasoner's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerResponse {
    /// Free-form structured output
    pub output: serde_json::Value,

    /// Set when the wait was aborted by a shutdown request
    #[serde(default)]
    pub cancelled: bool,
}

impl ReasonerResponse {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            cancelled: false,
        }
    }

    /// The response produced when a shutdown aborts the wait.
    pub fn cancelled() -> Self {
        Self {
            output: serde_json::Value::Null,
            cancelled: true,
        }
    }
}

/// The core Reasoner trait.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// A human-readable name for this reasoner.
    fn name(&self) -> &str;

    /// Send a request and wait for the response.
    async fn reason(
        &self,
        request: ReasonerRequest,
    ) -> std::result::Result<ReasonerResponse, ReasonerError>;
}
