//! Contract definitions and the registry that matches exchanges to them.
//!
//! # Module Structure
//!
//! - `path` - Path pattern compilation (`:id` / `{id}` parameters)
//! - `schema` - Schema tagged union over JSON Schema values

mod path;
mod schema;

pub use path::{PathPattern, Segment};
pub use schema::{
    AdditionalProperties, ArraySchema, ObjectSchema, PrimitiveSchema, PrimitiveType,
    ReferenceSchema, Schema,
};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Schemas checked against the captured request. Each is optional; an
/// undeclared aspect is never checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestAspects {
    #[serde(
        rename = "requestBodySchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub body: Option<Schema>,
    #[serde(
        rename = "requestQuerySchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub query: Option<Schema>,
    #[serde(
        rename = "requestHeadersSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub headers: Option<Schema>,
    #[serde(
        rename = "requestCookiesSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cookies: Option<Schema>,
}

/// Schemas and status codes checked against the captured response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseAspects {
    #[serde(
        rename = "responseBodySchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub body: Option<Schema>,
    #[serde(
        rename = "responseStatusCodes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_codes: Option<Vec<u16>>,
    #[serde(
        rename = "responseHeadersSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub headers: Option<Schema>,
    #[serde(
        rename = "responseCookiesSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cookies: Option<Schema>,
}

/// One API contract: a method, a path pattern and the aspects it declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDefinition {
    pub method: String,
    pub path: PathPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub request: RequestAspects,
    #[serde(flatten)]
    pub response: ResponseAspects,
}

impl ContractDefinition {
    pub fn new(method: impl Into<String>, path: &str) -> Self {
        Self {
            method: method.into(),
            path: PathPattern::parse(path),
            label: None,
            request: RequestAspects::default(),
            response: ResponseAspects::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_request_body(mut self, schema: impl Into<Schema>) -> Self {
        self.request.body = Some(schema.into());
        self
    }

    pub fn with_request_query(mut self, schema: impl Into<Schema>) -> Self {
        self.request.query = Some(schema.into());
        self
    }

    pub fn with_request_headers(mut self, schema: impl Into<Schema>) -> Self {
        self.request.headers = Some(schema.into());
        self
    }

    pub fn with_request_cookies(mut self, schema: impl Into<Schema>) -> Self {
        self.request.cookies = Some(schema.into());
        self
    }

    pub fn with_response_body(mut self, schema: impl Into<Schema>) -> Self {
        self.response.body = Some(schema.into());
        self
    }

    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.response.status_codes = Some(codes.into_iter().collect());
        self
    }

    pub fn with_response_headers(mut self, schema: impl Into<Schema>) -> Self {
        self.response.headers = Some(schema.into());
        self
    }

    pub fn with_response_cookies(mut self, schema: impl Into<Schema>) -> Self {
        self.response.cookies = Some(schema.into());
        self
    }

    /// Label if set, otherwise the raw path pattern.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.path.as_str())
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.method.trim().eq_ignore_ascii_case(method.trim()) && self.path.matches(path)
    }
}

/// A contract that can never be selected because an earlier one with the
/// same method matches every path it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedContract {
    pub index: usize,
    pub shadowed_by: usize,
    pub method: String,
    pub path: String,
}

/// Ordered, immutable set of contracts. Lookup is first-match-wins in
/// registration order.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    contracts: Vec<Arc<ContractDefinition>>,
    shadowed: Vec<ShadowedContract>,
}

impl ContractRegistry {
    /// Validates every definition before building anything; one bad entry
    /// rejects the whole list.
    pub fn new(definitions: Vec<ContractDefinition>) -> Result<Self, ConfigError> {
        if definitions.is_empty() {
            return Err(ConfigError::NoContracts);
        }
        for (index, definition) in definitions.iter().enumerate() {
            let method = definition.method.trim();
            if method.is_empty() {
                return Err(ConfigError::MissingMethod { index });
            }
            if definition.path.is_empty() {
                return Err(ConfigError::MissingPath {
                    index,
                    method: method.to_string(),
                });
            }
        }

        let contracts: Vec<Arc<ContractDefinition>> = definitions
            .into_iter()
            .map(|mut definition| {
                definition.method = definition.method.trim().to_ascii_uppercase();
                Arc::new(definition)
            })
            .collect();

        let mut shadowed = Vec::new();
        for (index, contract) in contracts.iter().enumerate() {
            let earlier = contracts[..index].iter().position(|earlier| {
                earlier.method == contract.method && earlier.path.covers(&contract.path)
            });
            if let Some(earlier) = earlier {
                warn!(
                    "Contract #{} ({} {}) is shadowed by contract #{} and will never match",
                    index, contract.method, contract.path, earlier
                );
                shadowed.push(ShadowedContract {
                    index,
                    shadowed_by: earlier,
                    method: contract.method.clone(),
                    path: contract.path.to_string(),
                });
            }
        }

        debug!("Built contract registry with {} contracts", contracts.len());
        Ok(Self {
            contracts,
            shadowed,
        })
    }

    /// First contract matching `method` (case-insensitive) and `path`.
    pub fn find(&self, method: &str, path: &str) -> Option<&Arc<ContractDefinition>> {
        self.contracts
            .iter()
            .find(|contract| contract.matches(method, path))
    }

    pub fn shadowed(&self) -> &[ShadowedContract] {
        &self.shadowed
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ContractDefinition>> {
        self.contracts.iter()
    }
}
