use crate::reporting::cucumber_json::FeatureReport;
use crate::{Result, TestError};
use serde_json::json;

/// JSON Schema of a cucumber JSON report file: an array of features.
pub fn report_schema() -> serde_json::Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Cucumber JSON report",
        "type": "array",
        "items": {"$ref": "#/definitions/Feature"},
        "definitions": {
            "Tag": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "pattern": "^@"},
                    "line": {"type": "integer", "minimum": 0}
                },
                "required": ["name", "line"]
            },
            "Feature": {
                "type": "object",
                "properties": {
                    "keyword": {"type": "string"},
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "line": {"type": "integer", "minimum": 1},
                    "id": {"type": "string"},
                    "tags": {"type": "array", "items": {"$ref": "#/definitions/Tag"}},
                    "uri": {"type": "string"},
                    "elements": {"type": "array", "items": {"$ref": "#/definitions/Element"}}
                },
                "required": ["keyword", "name", "line", "id", "tags", "uri", "elements"]
            },
            "Element": {
                "type": "object",
                "properties": {
                    "keyword": {"const": "Scenario"},
                    "type": {"const": "scenario"},
                    "id": {"type": "string"},
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "line": {"type": "integer", "minimum": 1},
                    "tags": {"type": "array", "items": {"$ref": "#/definitions/Tag"}},
                    "steps": {"type": "array", "items": {"$ref": "#/definitions/Step"}}
                },
                "required": ["keyword", "type", "id", "name", "line", "tags", "steps"]
            },
            "Step": {
                "type": "object",
                "properties": {
                    "keyword": {"type": "string"},
                    "name": {"type": "string"},
                    "line": {"type": "integer", "minimum": 1},
                    "arguments": {"type": "array", "items": {"$ref": "#/definitions/Argument"}},
                    "match": {
                        "type": "object",
                        "properties": {"location": {"type": "string"}},
                        "required": ["location"]
                    },
                    "result": {"$ref": "#/definitions/Result"},
                    "embeddings": {"type": "array", "items": {"$ref": "#/definitions/Embedding"}},
                    "hidden": {"type": "boolean"}
                },
                "required": ["keyword"],
                "if": {
                    "properties": {"hidden": {"const": true}},
                    "required": ["hidden"]
                },
                "else": {"required": ["name", "line", "arguments", "match"]}
            },
            "Argument": {
                "oneOf": [
                    {
                        "type": "object",
                        "properties": {
                            "rows": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "cells": {"type": "array", "items": {"type": "string"}}
                                    },
                                    "required": ["cells"]
                                }
                            }
                        },
                        "required": ["rows"]
                    },
                    {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "line": {"type": "integer"}
                        },
                        "required": ["content", "line"]
                    }
                ]
            },
            "Result": {
                "type": "object",
                "properties": {
                    "status": {
                        "enum": ["passed", "failed", "undefined", "ambiguous", "skipped", "pending"]
                    },
                    "duration": {"type": "integer", "minimum": 0},
                    "error_message": {"type": "string"}
                },
                "required": ["status"],
                "if": {"not": {"properties": {"status": {"const": "failed"}}}},
                "then": {"not": {"required": ["error_message"]}}
            },
            "Embedding": {
                "type": "object",
                "properties": {
                    "data": {"type": "string"},
                    "mime_type": {"type": "string"}
                },
                "required": ["data", "mime_type"]
            }
        }
    })
}

/// Checks a JSON value against [`report_schema`], collecting every violation.
pub fn validate_value(value: &serde_json::Value) -> Result<()> {
    let schema = report_schema();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| TestError::Reporting(format!("Failed to compile report schema: {}", e)))?;

    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::SchemaValidation(errors))
    }
}

pub fn validate_report(reports: &[FeatureReport]) -> Result<()> {
    validate_value(&serde_json::to_value(reports)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_report() -> serde_json::Value {
        json!([{
            "keyword": "Feature",
            "name": "Login",
            "description": "",
            "line": 1,
            "id": "login",
            "tags": [{"name": "@smoke", "line": 1}],
            "uri": "login.feature",
            "elements": [{
                "keyword": "Scenario",
                "type": "scenario",
                "id": "login;sign-in",
                "name": "Sign in",
                "description": "",
                "line": 3,
                "tags": [],
                "steps": [
                    {"keyword": "Before", "hidden": true},
                    {
                        "keyword": "Given ",
                        "name": "a user",
                        "line": 4,
                        "arguments": [{"content": "{}", "line": 5}],
                        "match": {"location": "login.feature:4"},
                        "result": {"status": "failed", "duration": 1000, "error_message": "boom"},
                        "embeddings": [{"data": "aGk=", "mime_type": "image/png"}]
                    }
                ]
            }]
        }])
    }

    #[test]
    fn test_valid_report_passes() {
        assert!(validate_value(&valid_report()).is_ok());
        assert!(validate_value(&json!([])).is_ok());
    }

    #[test]
    fn test_missing_step_fields_are_reported() {
        let mut report = valid_report();
        report[0]["elements"][0]["steps"][1]
            .as_object_mut()
            .unwrap()
            .remove("match");

        match validate_value(&report) {
            Err(TestError::SchemaValidation(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected schema errors, got {:?}", other),
        }
    }

    #[test]
    fn test_error_message_only_on_failed_steps() {
        let mut report = valid_report();
        report[0]["elements"][0]["steps"][1]["result"]["status"] = json!("passed");
        assert!(validate_value(&report).is_err());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut report = valid_report();
        report[0]["elements"][0]["steps"][1]["result"]["status"] = json!("exploded");
        assert!(validate_value(&report).is_err());
    }
}
