//! Inbound operation record.
//!
//! The record is what the transport hands to admission and, on admit, what is
//! forwarded downstream unmodified.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated caller identity (resolved upstream, treated as opaque).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deployment environment, decides whether safelist enforcement applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

/// One inbound GraphQL operation plus the request-level signals admission needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Raw query text as received.
    pub query: String,
    /// Variables object (empty when absent).
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Selected operation when the document holds several.
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
    pub caller: CallerIdentity,
    /// Trusted override signal was present on the request.
    #[serde(default)]
    pub bypass: bool,
    #[serde(default)]
    pub environment: Environment,
}

impl OperationRecord {
    pub fn new(query: impl Into<String>, caller: CallerIdentity) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
            caller,
            bypass: false,
            environment: Environment::default(),
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}
