//! Parsing classifier replies and merging them into stored attributes.

use serde::Deserialize;

use crate::error::EnrichmentError;
use crate::llm::Message;
use crate::storage::{ProductAttributes, ProductRecord};
use crate::utils::json_extraction::extract_json_object;

const CLASSIFIER_INSTRUCTIONS: &str = "You classify fashion catalog products. \
Reply with a single JSON object with the keys \"category\", \"gender\", \
\"primaryColor\" and \"productType\". Use null for any value you cannot determine.";

/// Attributes proposed by the classifier. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, alias = "primary_color", alias = "color")]
    pub primary_color: Option<String>,
    #[serde(default, alias = "product_type")]
    pub product_type: Option<String>,
}

/// Builds the chat messages for one product bundle.
pub fn classification_messages(bundle: &str) -> Vec<Message> {
    vec![
        Message::system(CLASSIFIER_INSTRUCTIONS),
        Message::user(bundle),
    ]
}

/// Treats blanks and placeholder words as "no value".
fn clean(value: Option<String>, lowercase: bool) -> Option<String> {
    let value = value?.trim().to_string();
    let lowered = value.to_lowercase();
    if value.is_empty() || matches!(lowered.as_str(), "null" | "none" | "unknown" | "n/a") {
        return None;
    }
    Some(if lowercase { lowered } else { value })
}

/// Parses a classifier reply.
///
/// # Errors
///
/// `InvalidClassification` when the reply holds no JSON object or the object
/// does not have the expected shape.
pub fn parse_classification(reply: &str) -> Result<Classification, EnrichmentError> {
    let json = extract_json_object(reply)
        .map_err(|e| EnrichmentError::InvalidClassification(e.to_string()))?;

    let raw: Classification = serde_json::from_str(&json)
        .map_err(|e| EnrichmentError::InvalidClassification(e.to_string()))?;

    Ok(Classification {
        category: clean(raw.category, true),
        gender: clean(raw.gender, true),
        primary_color: clean(raw.primary_color, true),
        product_type: clean(raw.product_type, false),
    })
}

/// Merges classifier output over the stored values.
///
/// Per field: the classifier's value when present, else the stored value,
/// else nothing.
pub fn merge_attributes(classification: Classification, existing: &ProductRecord) -> ProductAttributes {
    ProductAttributes {
        category: classification.category.or_else(|| existing.category.clone()),
        gender: classification.gender.or_else(|| existing.gender.clone()),
        primary_color: classification
            .primary_color
            .or_else(|| existing.primary_color.clone()),
        product_type: classification
            .product_type
            .or_else(|| existing.product_type.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_json() {
        let c = parse_classification(
            r#"{"category": "Dresses", "gender": "WOMEN", "primaryColor": "Navy", "productType": "Wrap Dress"}"#,
        )
        .unwrap();
        assert_eq!(c.category.as_deref(), Some("dresses"));
        assert_eq!(c.gender.as_deref(), Some("women"));
        assert_eq!(c.primary_color.as_deref(), Some("navy"));
        assert_eq!(c.product_type.as_deref(), Some("Wrap Dress"));
    }

    #[test]
    fn test_parse_fenced_reply_with_snake_case_and_placeholders() {
        let c = parse_classification(
            "```json\n{\"category\": \"tops\", \"gender\": \"unknown\", \"primary_color\": \" \"}\n```",
        )
        .unwrap();
        assert_eq!(c.category.as_deref(), Some("tops"));
        assert_eq!(c.gender, None);
        assert_eq!(c.primary_color, None);
        assert_eq!(c.product_type, None);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_classification("I am unable to help with that.").unwrap_err();
        assert!(matches!(err, EnrichmentError::InvalidClassification(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err = parse_classification(r#"{"category": 42}"#).unwrap_err();
        assert!(matches!(err, EnrichmentError::InvalidClassification(_)));
    }

    #[test]
    fn test_merge_prefers_classifier_then_existing() {
        let existing = ProductRecord {
            category: Some("tops".to_string()),
            gender: Some("men".to_string()),
            product_type: None,
            ..ProductRecord::default()
        };
        let classification = Classification {
            category: Some("shirts".to_string()),
            gender: None,
            primary_color: None,
            product_type: None,
        };

        let merged = merge_attributes(classification, &existing);
        assert_eq!(merged.category.as_deref(), Some("shirts"));
        assert_eq!(merged.gender.as_deref(), Some("men"));
        assert_eq!(merged.primary_color, None);
        assert_eq!(merged.product_type, None);
    }

    #[test]
    fn test_messages_carry_bundle() {
        let messages = classification_messages("Title: Tee");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "Title: Tee");
    }
}
