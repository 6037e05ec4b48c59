//! Platform API subsystem.
//!
//! # Data Flow
//! ```text
//! configured api_names
//!     → ApiCatalog::resolve (explicit name → method table)
//!     → ApiMethod::call(ApiArgs) → JSON result | ApiError
//! ```
//!
//! # Design Decisions
//! - Operations are looked up in a table built once at startup, never by reflection
//! - Arguments are a JSON object (string keys, dynamically typed values)
//! - `misp.rs` provides the MISP REST implementation; embedders can add
//!   their own methods with `FnMethod`

pub mod misp;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use misp::{MispClient, MispOperation};

/// Keyword arguments of an API call.
pub type ApiArgs = Map<String, Value>;

/// Errors raised by an API method.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The operation failed; the message is surfaced verbatim to the caller.
    #[error("{0}")]
    Failed(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("Invalid value for argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API client configuration: {0}")]
    Configuration(String),
}

/// A named, invokable platform operation.
#[async_trait]
pub trait ApiMethod: Send + Sync {
    /// Operation name, as used in request topics.
    fn name(&self) -> &str;

    /// Invoke the operation with keyword arguments.
    async fn call(&self, args: ApiArgs) -> Result<Value, ApiError>;
}

/// Adapts an async closure into an [`ApiMethod`].
pub struct FnMethod<F> {
    name: String,
    f: F,
}

impl<F> FnMethod<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F, Fut> ApiMethod for FnMethod<F>
where
    F: Fn(ApiArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ApiError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, args: ApiArgs) -> Result<Value, ApiError> {
        (self.f)(args).await
    }
}

/// Table of the operations a client exposes, keyed by name.
#[derive(Clone, Default)]
pub struct ApiCatalog {
    methods: HashMap<String, Arc<dyn ApiMethod>>,
}

impl ApiCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `method`, replacing any method with the same name.
    pub fn insert(&mut self, method: Arc<dyn ApiMethod>) {
        self.methods.insert(method.name().to_string(), method);
    }

    /// Builder-style helper that registers an async closure.
    pub fn with_fn<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(ApiArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        self.insert(Arc::new(FnMethod::new(name, f)));
        self
    }

    /// Look up an operation by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ApiMethod>> {
        self.methods.get(name).cloned()
    }

    /// Sorted operation names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl std::fmt::Debug for ApiCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCatalog").field("methods", &self.names()).finish()
    }
}
