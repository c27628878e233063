//! Payload validation against the schema a processor declares.
//!
//! A [`PayloadSchema`] is the type descriptor a processor hands to the router. It is compiled
//! once when the processor is built, so a broken schema stops the service at startup instead
//! of failing messages at runtime.

use async_trait::async_trait;
use jsonschema::{Draft, Validator};
use serde_json::Value;

pub struct PayloadSchema {
    name: &'static str,
    validator: Validator,
}

impl PayloadSchema {
    pub fn compile(name: &'static str, document: &Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(document)
            .map_err(|e| SchemaError::Compilation {
                schema: name,
                reason: e.to_string(),
            })?;

        Ok(Self { name, validator })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for PayloadSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSchema").field("name", &self.name).finish()
    }
}

/// A single field-level violation, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub schema_path: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{} ({}): {}", path, self.schema_path, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn with_errors(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// One line per violation, for logging.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation seam used by the router. Async so an implementation may resolve schemas
/// remotely.
#[async_trait]
pub trait PayloadValidator: Send + Sync {
    async fn validate(&self, schema: &PayloadSchema, payload: &Value) -> ValidationResult;
}

/// Validates against the compiled JSON Schema held by the descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

#[async_trait]
impl PayloadValidator for JsonSchemaValidator {
    async fn validate(&self, schema: &PayloadSchema, payload: &Value) -> ValidationResult {
        let errors = schema
            .validator
            .iter_errors(payload)
            .map(|e| {
                let schema_path = e.schema_path.to_string();
                FieldError {
                    path: e.instance_path.to_string(),
                    message: violation_message(&schema_path),
                    schema_path,
                }
            })
            .collect();

        ValidationResult::with_errors(errors)
    }
}

/// Names the violated keyword only. The error's own rendering quotes the offending
/// instance, which may be note text or document content.
fn violation_message(schema_path: &str) -> String {
    match schema_path.rsplit('/').find(|segment| !segment.is_empty()) {
        Some(keyword) => format!("violates \"{}\" constraint", keyword),
        None => "does not match schema".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to compile payload schema {schema}: {reason}")]
    Compilation { schema: &'static str, reason: String },
}
