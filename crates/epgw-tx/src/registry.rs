//! Resource registry for binary-record schemas, JSON schemas, and transform
//! expressions.
//!
//! Resources are keyed by the reference string that appears in operation
//! configuration and resolved through three schemes, tried in order:
//!
//! 1. `classpath:` resolves a resource embedded in the binary (the `schemas/`
//!    directory of this crate);
//! 2. `file:` resolves a filesystem path;
//! 3. anything else is treated as an inline literal (a JSON schema document or
//!    a transform expression written directly into the configuration).
//!
//! Parsed artifacts are cached immutably for the process lifetime; the
//! registry is shared behind `Arc` and read-only after warm-up.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use apache_avro::Schema;
use epgw_core::error::GatewayError;
use jsonschema::JSONSchema;

const CLASSPATH_SCHEME: &str = "classpath:";
const FILE_SCHEME: &str = "file:";

// Resources shipped with the gateway, addressable as `classpath:schemas/<file>`.
static EMBEDDED: &[(&str, &str)] = &[
    (
        "schemas/RequestPayerCustomerOwnAccountRetrieve.avsc",
        include_str!("../schemas/RequestPayerCustomerOwnAccountRetrieve.avsc"),
    ),
    (
        "schemas/RequestPayerCustomerOwnAccountRetrieve.json",
        include_str!("../schemas/RequestPayerCustomerOwnAccountRetrieve.json"),
    ),
    (
        "schemas/RequestOwnAccountInformationPayerBeS016.avsc",
        include_str!("../schemas/RequestOwnAccountInformationPayerBeS016.avsc"),
    ),
    (
        "schemas/requestOwnAccountInformationPayerBeS016.jsonata",
        include_str!("../schemas/requestOwnAccountInformationPayerBeS016.jsonata"),
    ),
    (
        "schemas/ResponseOwnAccountInformationPayerBeS016.avsc",
        include_str!("../schemas/ResponseOwnAccountInformationPayerBeS016.avsc"),
    ),
    (
        "schemas/ResponseOwnAccountInformationPayerBeS016.json",
        include_str!("../schemas/ResponseOwnAccountInformationPayerBeS016.json"),
    ),
    (
        "schemas/ResponsePayerCustomerOwnAccountRetrieve.avsc",
        include_str!("../schemas/ResponsePayerCustomerOwnAccountRetrieve.avsc"),
    ),
    (
        "schemas/responsePayerCustomerOwnAccountRetrieve.jsonata",
        include_str!("../schemas/responsePayerCustomerOwnAccountRetrieve.jsonata"),
    ),
    (
        "schemas/RequestPayerCustomerProfileRetrieve.avsc",
        include_str!("../schemas/RequestPayerCustomerProfileRetrieve.avsc"),
    ),
    (
        "schemas/RequestPayerCustomerProfileRetrieve.json",
        include_str!("../schemas/RequestPayerCustomerProfileRetrieve.json"),
    ),
    (
        "schemas/RequestCustomerInformationPayerBeS021.avsc",
        include_str!("../schemas/RequestCustomerInformationPayerBeS021.avsc"),
    ),
    (
        "schemas/requestCustomerInformationPayerBeS021.jsonata",
        include_str!("../schemas/requestCustomerInformationPayerBeS021.jsonata"),
    ),
    (
        "schemas/ResponseCustomerInformationPayerBeS021.avsc",
        include_str!("../schemas/ResponseCustomerInformationPayerBeS021.avsc"),
    ),
    (
        "schemas/ResponseCustomerInformationPayerBeS021.json",
        include_str!("../schemas/ResponseCustomerInformationPayerBeS021.json"),
    ),
    (
        "schemas/ResponsePayerCustomerProfileRetrieve.avsc",
        include_str!("../schemas/ResponsePayerCustomerProfileRetrieve.avsc"),
    ),
    (
        "schemas/responsePayerCustomerProfileRetrieve.jsonata",
        include_str!("../schemas/responsePayerCustomerProfileRetrieve.jsonata"),
    ),
];

/// Lazy-loading, process-lifetime cache of parsed schema and transform
/// resources.
#[derive(Default)]
pub struct ResourceRegistry {
    avro: RwLock<HashMap<String, Arc<Schema>>>,
    json: RwLock<HashMap<String, Arc<JSONSchema>>>,
    transforms: RwLock<HashMap<String, Arc<String>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary record schema for `reference`, parsed on first use.
    pub fn avro_schema(&self, reference: &str) -> Result<Arc<Schema>, GatewayError> {
        if let Some(schema) = self.avro.read().unwrap().get(reference) {
            return Ok(schema.clone());
        }
        let text = resolve(reference)?;
        let schema = Schema::parse_str(&text).map_err(|e| GatewayError::SchemaInvalid {
            name: reference.to_string(),
            reason: e.to_string(),
        })?;
        let schema = Arc::new(schema);
        self.avro
            .write()
            .unwrap()
            .insert(reference.to_string(), schema.clone());
        Ok(schema)
    }

    /// Compiled JSON schema for `reference`, compiled on first use.
    pub fn json_schema(&self, reference: &str) -> Result<Arc<JSONSchema>, GatewayError> {
        if let Some(schema) = self.json.read().unwrap().get(reference) {
            return Ok(schema.clone());
        }
        let text = resolve(reference)?;
        let document: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| GatewayError::SchemaInvalid {
                name: reference.to_string(),
                reason: e.to_string(),
            })?;
        let compiled = JSONSchema::compile(&document).map_err(|e| GatewayError::SchemaInvalid {
            name: reference.to_string(),
            reason: e.to_string(),
        })?;
        let compiled = Arc::new(compiled);
        self.json
            .write()
            .unwrap()
            .insert(reference.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// Transform expression source for `reference`. Expressions are parsed per
    /// evaluation (the engine is arena-based), so the cache holds the source.
    pub fn transform_expr(&self, reference: &str) -> Result<Arc<String>, GatewayError> {
        if let Some(expr) = self.transforms.read().unwrap().get(reference) {
            return Ok(expr.clone());
        }
        let text = Arc::new(resolve(reference)?);
        self.transforms
            .write()
            .unwrap()
            .insert(reference.to_string(), text.clone());
        Ok(text)
    }
}

/// Three-scheme resource resolution. Fails with `SchemaNotFound` when the
/// reference names an embedded resource or file that does not exist.
fn resolve(reference: &str) -> Result<String, GatewayError> {
    if let Some(path) = reference.strip_prefix(CLASSPATH_SCHEME) {
        EMBEDDED
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, content)| content.to_string())
            .ok_or_else(|| GatewayError::SchemaNotFound(reference.to_string()))
    } else if let Some(path) = reference.strip_prefix(FILE_SCHEME) {
        std::fs::read_to_string(path)
            .map_err(|_| GatewayError::SchemaNotFound(reference.to_string()))
    } else {
        // Inline literal.
        Ok(reference.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_embedded_avro_schema() {
        let registry = ResourceRegistry::new();
        let schema = registry
            .avro_schema("classpath:schemas/RequestPayerCustomerOwnAccountRetrieve.avsc")
            .unwrap();
        assert!(matches!(&*schema, Schema::Record(_)));
    }

    #[test]
    fn caches_parsed_artifacts() {
        let registry = ResourceRegistry::new();
        let reference = "classpath:schemas/RequestPayerCustomerOwnAccountRetrieve.avsc";
        let first = registry.avro_schema(reference).unwrap();
        let second = registry.avro_schema(reference).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_embedded_resource_is_not_found() {
        let registry = ResourceRegistry::new();
        let err = registry
            .avro_schema("classpath:schemas/DoesNotExist.avsc")
            .unwrap_err();
        assert_eq!(err.kind(), "SchemaNotFound");
    }

    #[test]
    fn missing_file_is_not_found() {
        let registry = ResourceRegistry::new();
        let err = registry
            .json_schema("file:/nonexistent/path/schema.json")
            .unwrap_err();
        assert_eq!(err.kind(), "SchemaNotFound");
    }

    #[test]
    fn file_scheme_reads_from_disk() {
        let path = std::env::temp_dir().join("epgw-registry-test.avsc");
        std::fs::write(&path, r#"{"type": "string"}"#).unwrap();
        let registry = ResourceRegistry::new();
        let schema = registry
            .avro_schema(&format!("file:{}", path.display()))
            .unwrap();
        assert!(matches!(&*schema, Schema::String));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bare_reference_is_an_inline_literal() {
        let registry = ResourceRegistry::new();
        let schema = registry
            .json_schema(r#"{"type": "object", "required": ["customerId"]}"#)
            .unwrap();
        assert!(schema.is_valid(&serde_json::json!({"customerId": "42"})));
        assert!(!schema.is_valid(&serde_json::json!({})));
    }

    #[test]
    fn malformed_resource_is_invalid() {
        let registry = ResourceRegistry::new();
        let err = registry.avro_schema("not a schema at all").unwrap_err();
        assert_eq!(err.kind(), "SchemaInvalid");
    }
}
