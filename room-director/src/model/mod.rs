//! Model clients.
//!
//! [`ModelBackend`] is the one capability every model exposes. Two HTTP
//! variants implement it ([`LocalModel`], [`RemoteModel`]) and
//! [`FallbackModel`] wraps them with the local-first, timeout and retry
//! policy.

mod fallback;
mod http;

pub use fallback::{FallbackModel, RetryPolicy};
pub use http::{LocalModel, RemoteModel};

use crate::error::ModelError;
use crate::prompt::{Generation, GenerationRequest};
use async_trait::async_trait;

/// Something that can turn a generation request into text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short name used in logs.
    fn label(&self) -> &str;

    /// Generate a description for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ModelError>;
}
