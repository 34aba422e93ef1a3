//! Structured payload extraction and validation
//!
//! Model output is free text. The payload is located by an ordered list of
//! extraction strategies; the first one that matches wins and its candidate
//! is decoded and checked against the metadata JSON schema.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Phase, Result};
use crate::metadata::{DatasetMetadata, Sensitivity, Tag};

/// A total extraction strategy: returns the candidate payload, if any.
pub type ExtractionStrategy = fn(&str) -> Option<&str>;

/// Strategies in precedence order
pub const STRATEGIES: &[(&str, ExtractionStrategy)] = &[
    ("labeled_fence", labeled_fence),
    ("any_fence", any_fence),
    ("raw_text", raw_text),
];

static LABELED_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```json\b(.*?)```").unwrap());

static ANY_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

/// A fenced block explicitly labeled `json`
pub fn labeled_fence(text: &str) -> Option<&str> {
    let body = LABELED_FENCE.captures(text)?.get(1)?.as_str().trim();
    (!body.is_empty()).then_some(body)
}

/// Any fenced block, with a leading language tag dropped
pub fn any_fence(text: &str) -> Option<&str> {
    let body = ANY_FENCE.captures(text)?.get(1)?.as_str();
    let body = strip_language_tag(body).trim();
    (!body.is_empty()).then_some(body)
}

/// The whole reply, trimmed
pub fn raw_text(text: &str) -> Option<&str> {
    let body = text.trim();
    (!body.is_empty()).then_some(body)
}

fn strip_language_tag(body: &str) -> &str {
    let trimmed = body.trim_start();
    match trimmed.find(['{', '[']) {
        Some(pos)
            if trimmed[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || c == '-' || c == '_') =>
        {
            &trimmed[pos..]
        }
        _ => body,
    }
}

/// Run the strategies in order, returning the first candidate and the
/// strategy that produced it.
pub fn extract_payload(text: &str) -> Option<(&'static str, &str)> {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(text).map(|payload| (*name, payload)))
}

/// JSON schema of the payload the model must produce
pub fn metadata_schema() -> serde_json::Value {
    let tags: Vec<&str> = Tag::ALL.iter().map(|t| t.as_str()).collect();
    let tag_help: Vec<String> = Tag::ALL
        .iter()
        .map(|t| format!("{}: {}", t.as_str(), t.guidance()))
        .collect();
    let sensitivities: Vec<&str> = Sensitivity::ALL.iter().map(|s| s.as_str()).collect();

    serde_json::json!({
        "title": "DatasetMetadata",
        "description": "Metadata containing descriptive information for the dataset and its columns.",
        "type": "object",
        "required": ["name", "description", "columns"],
        "properties": {
            "name": {
                "type": "string",
                "description": "Name of the dataset. Default to the name of the table provided"
            },
            "description": {
                "type": "string",
                "description": "Description of the dataset as a whole, across all columns and rows"
            },
            "columns": {
                "type": "array",
                "description": "One item per requested column",
                "items": {
                    "type": "object",
                    "required": ["name", "data_type", "description", "analysis"],
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "Exact name of the column"
                        },
                        "data_type": {
                            "type": "string",
                            "description": "Data type such as int, double/float, string, date or datetime"
                        },
                        "description": {
                            "type": "string",
                            "description": "Detailed description of the column in the context of the whole dataset"
                        },
                        "sensitivity": {
                            "type": "string",
                            "description": format!(
                                "One of: {}. PII for names, dates of birth, phone numbers, addresses; PHI for medical or health records",
                                sensitivities.join(", ")
                            )
                        },
                        "tags": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": format!(
                                "Zero or more of: {}. {}",
                                tags.join(", "),
                                tag_help.join("; ")
                            )
                        },
                        "analysis": {
                            "type": "string",
                            "description": "How you arrived at the description, data type, sensitivity and tags"
                        }
                    }
                }
            }
        }
    })
}

static METADATA_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    jsonschema::validator_for(&metadata_schema()).expect("metadata schema is a valid JSON schema")
});

/// Output-format contract repeated in every round's prompt
pub fn format_instructions() -> String {
    let schema = serde_json::to_string_pretty(&metadata_schema()).unwrap_or_default();
    format!(
        "The output must be a JSON instance that conforms to the JSON schema below, \
         returned inside a single ```json fenced block.\n\n\
         As an example, for the schema {{\"properties\": {{\"foo\": {{\"type\": \"array\", \
         \"items\": {{\"type\": \"string\"}}}}}}, \"required\": [\"foo\"]}} the object \
         {{\"foo\": [\"bar\", \"baz\"]}} is well-formatted while \
         {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not.\n\n\
         Here is the output schema:\n```json\n{}\n```",
        schema
    )
}

/// Locate, decode and validate the metadata payload in a model reply.
pub fn parse_response(text: &str) -> Result<DatasetMetadata> {
    let Some((strategy, payload)) = extract_payload(text) else {
        return Err(Error::Parse {
            phase: Phase::Parse,
            message: "response is empty".to_string(),
            raw: text.to_string(),
        });
    };
    tracing::debug!("Extracted payload with {} ({} chars)", strategy, payload.len());

    let value: serde_json::Value = serde_json::from_str(payload).map_err(|e| Error::Parse {
        phase: Phase::Parse,
        message: format!("{} candidate is not valid JSON: {}", strategy, e),
        raw: text.to_string(),
    })?;

    let messages: Vec<String> = METADATA_VALIDATOR
        .iter_errors(&value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();
    if !messages.is_empty() {
        return Err(Error::Validation {
            phase: Phase::Parse,
            messages,
            raw: text.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| Error::Validation {
        phase: Phase::Parse,
        messages: vec![e.to_string()],
        raw: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"name":"orders","description":"Customer orders","columns":[
        {"name":"id","data_type":"int","description":"Order id","sensitivity":"not sensitive","tags":["Metadata"],"analysis":"sequential"}
    ]}"#;

    #[test]
    fn test_labeled_fence_preferred_over_plain() {
        let text = format!(
            "First a plain block:\n```\n{{\"ignored\": true}}\n```\nthen the real one:\n```json\n{}\n```",
            VALID
        );
        let (strategy, payload) = extract_payload(&text).unwrap();
        assert_eq!(strategy, "labeled_fence");
        assert!(payload.starts_with("{\"name\":\"orders\""));
    }

    #[test]
    fn test_labeled_fence_case_insensitive_inline() {
        let text = r#"```JSON {"name":"t","description":"d","columns":[]} ```"#;
        assert_eq!(
            labeled_fence(text),
            Some(r#"{"name":"t","description":"d","columns":[]}"#)
        );
    }

    #[test]
    fn test_any_fence_strips_language_tag() {
        let text = "Result:\n```javascript\n{\"a\": 1}\n```";
        assert_eq!(labeled_fence(text), None);
        assert_eq!(any_fence(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_any_fence_without_tag() {
        assert_eq!(any_fence("``` [1, 2] ```"), Some("[1, 2]"));
    }

    #[test]
    fn test_raw_text_fallback() {
        let text = format!("  {}  \n", VALID);
        let (strategy, payload) = extract_payload(&text).unwrap();
        assert_eq!(strategy, "raw_text");
        assert!(payload.starts_with('{'));
    }

    #[test]
    fn test_parse_valid_fenced_payload() {
        let text = format!("Here you go:\n```json\n{}\n```\nLet me know.", VALID);
        let metadata = parse_response(&text).unwrap();
        assert_eq!(metadata.name, "orders");
        assert_eq!(metadata.columns.len(), 1);
        assert_eq!(metadata.columns[0].tags, vec![Tag::Metadata]);
    }

    #[test]
    fn test_parse_raw_json_payload() {
        let metadata = parse_response(VALID).unwrap();
        assert_eq!(metadata.column_names(), vec!["id"]);
    }

    #[test]
    fn test_no_fence_and_not_json_is_parse_error() {
        let text = "I could not analyze this table, sorry.";
        let err = parse_response(text).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "got {:?}", err);
        assert_eq!(err.raw_text(), Some(text));
    }

    #[test]
    fn test_empty_response_is_parse_error() {
        assert!(matches!(parse_response("   "), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_broken_json_in_fence_is_parse_error() {
        let text = "```json\n{\"name\": \"orders\", \n```";
        assert!(matches!(parse_response(text), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let text = r#"```json
{"name":"orders","columns":[]}
```"#;
        match parse_response(text) {
            Err(Error::Validation { messages, raw, .. }) => {
                assert!(messages.iter().any(|m| m.contains("description")), "{:?}", messages);
                assert_eq!(raw, text);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_type_is_validation_error() {
        let text = r#"{"name":"orders","description":"d","columns":"id, total"}"#;
        assert!(matches!(parse_response(text), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_column_missing_analysis_is_validation_error() {
        let text = r#"{"name":"o","description":"d","columns":[{"name":"id","data_type":"int","description":"x"}]}"#;
        match parse_response(text) {
            Err(Error::Validation { messages, .. }) => {
                assert!(messages.iter().any(|m| m.contains("/columns/0")), "{:?}", messages);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_is_validation_error() {
        let text = r#"{"name":"o","description":"d","columns":[{"name":"id","data_type":"int","description":"x","tags":["Mystery"],"analysis":"a"}]}"#;
        assert!(matches!(parse_response(text), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_format_instructions_embed_schema() {
        let instructions = format_instructions();
        assert!(instructions.contains("\"required\""));
        assert!(instructions.contains("Geospatial"));
        assert!(instructions.contains("not sensitive"));
    }
}
