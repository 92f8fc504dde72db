//! Operation handlers: the units of work dispatched per call kind.
//!
//! Each handler implements one uniform streaming contract (consume input,
//! produce a token stream), so adding a kind never touches the execution
//! loop. The manifest endpoint is derived from this registry.

pub mod chat;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use callwire_core::OperationDescriptor;

use crate::provider::{ProviderError, TokenStream};

pub use chat::ChatOperation;

/// Failure starting a unit of work, before any token was produced.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The operation rejected its input.
    #[error("{0}")]
    InvalidInput(String),
    /// The provider refused the streamed request.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// One executable operation kind.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Kind tag this handler serves.
    fn kind(&self) -> &str;

    /// One-line description surfaced by the manifest.
    fn description(&self) -> &str;

    /// Starts the unit of work, returning its token stream.
    ///
    /// # Errors
    ///
    /// Fails when the input is rejected or the provider refuses the
    /// request; mid-stream failures surface as stream items.
    async fn run(&self, input: Value) -> Result<TokenStream, OperationError>;
}

/// Immutable dispatch table from kind tag to handler.
///
/// Populated once at startup, then shared read-only.
#[derive(Default)]
pub struct OperationRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its kind tag, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn OperationHandler>) {
        let kind = handler.kind().to_owned();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            tracing::warn!(kind = %kind, "operation handler replaced");
        }
    }

    /// Resolves a kind tag to its handler.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(kind).cloned()
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Catalog entries for every registered kind, sorted for stable output.
    #[must_use]
    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        let mut descriptors: Vec<OperationDescriptor> = self
            .handlers
            .values()
            .map(|handler| OperationDescriptor {
                kind: handler.kind().to_owned(),
                description: handler.description().to_owned(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.kind.cmp(&b.kind));
        descriptors
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
