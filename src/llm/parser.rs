use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{ReviewTopics, TopicCategory, TopicVerdict};

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtractionPayload {
    List(Vec<ExtractedItem>),
    Wrapped {
        #[serde(alias = "results")]
        reviews: Vec<ExtractedItem>,
    },
}

#[derive(Deserialize)]
struct ExtractedItem {
    #[serde(rename = "reviewId", alias = "review_id", alias = "id")]
    review_id: serde_json::Value,
    #[serde(rename = "extractedTopics", alias = "topics", default)]
    extracted_topics: Vec<String>,
}

pub fn parse_extraction_response(response: &str) -> Result<Vec<ReviewTopics>> {
    let json_str = extract_json(response)?;

    let payload: ExtractionPayload = serde_json::from_str(&json_str)
        .map_err(|e| Error::ParseError(format!("Failed to parse LLM response: {}", e)))?;

    let items = match payload {
        ExtractionPayload::List(items) => items,
        ExtractionPayload::Wrapped { reviews } => reviews,
    };

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let review_id = match item.review_id {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(ReviewTopics {
                review_id,
                phrases: item.extracted_topics,
            })
        })
        .collect())
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(alias = "isValid", alias = "valid")]
    is_valid: bool,
    #[serde(default, alias = "suggested_name", alias = "suggestedTopicName")]
    suggested_topic_name: Option<String>,
    #[serde(default, alias = "category", alias = "suggestedCategory")]
    suggested_category: Option<String>,
    #[serde(default, alias = "reason")]
    reasoning: Option<String>,
}

pub fn parse_validation_response(response: &str) -> Result<TopicVerdict> {
    let json_str = extract_json(response)?;
    let raw: RawVerdict = serde_json::from_str(&json_str)
        .map_err(|e| Error::ParseError(format!("Failed to parse topic verdict: {}", e)))?;

    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Ok(TopicVerdict {
        is_valid: raw.is_valid,
        suggested_name: non_empty(raw.suggested_topic_name),
        category: non_empty(raw.suggested_category).map(|c| TopicCategory::from(c.as_str())),
        reasoning: non_empty(raw.reasoning),
    })
}

fn extract_json(text: &str) -> Result<String> {
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return Ok(text[start..start + end].trim().to_string());
        }
    }

    // Plain fence, possibly with another language tag
    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with('[') || content.starts_with('{') {
                return Ok(content.to_string());
            }
        }
    }

    if let Some(start) = text.find(['[', '{']) {
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, c) in text[start..].char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }

            match c {
                '\\' if in_string => escape_next = true,
                '"' => in_string = !in_string,
                '[' | '{' if !in_string => depth += 1,
                ']' | '}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text[start..start + i + 1].to_string());
                    }
                }
                _ => {}
            }
        }
    }

    Err(Error::ParseError("No valid JSON found in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_array() {
        let input = r#"Here are the topics:
```json
[{"reviewId": "r1", "extractedTopics": ["late delivery", "cold food"]}]
```
"#;
        let parsed = parse_extraction_response(input).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].review_id, "r1");
        assert_eq!(parsed[0].phrases, vec!["late delivery", "cold food"]);
    }

    #[test]
    fn test_parses_array_inside_prose() {
        let input = r#"Sure! [{"reviewId": "a", "extractedTopics": ["says \"hi]\""]}, {"reviewId": 7}] Hope it helps [x]"#;
        let parsed = parse_extraction_response(input).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].phrases, vec!["says \"hi]\""]);
        assert_eq!(parsed[1].review_id, "7");
        assert!(parsed[1].phrases.is_empty());
    }

    #[test]
    fn test_parses_wrapped_object() {
        let input = r#"{"results": [{"review_id": "r9", "topics": ["refund pending"]}]}"#;
        let parsed = parse_extraction_response(input).unwrap();
        assert_eq!(parsed[0].review_id, "r9");
        assert_eq!(parsed[0].phrases, vec!["refund pending"]);
    }

    #[test]
    fn test_rejects_text_without_json() {
        assert!(matches!(
            parse_extraction_response("I could not process these reviews."),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn test_parses_topic_verdict() {
        let input = r#"```json
{"topic": "dark mode", "is_valid": true, "suggested_topic_name": " Dark Mode Support ",
 "suggested_category": "Request", "reasoning": "A concrete feature ask"}
```"#;
        let verdict = parse_validation_response(input).unwrap();
        assert!(verdict.is_valid);
        assert_eq!(verdict.suggested_name.as_deref(), Some("Dark Mode Support"));
        assert_eq!(verdict.category, Some(TopicCategory::Request));

        let rejected = parse_validation_response(r#"{"is_valid": false, "suggested_topic_name": ""}"#).unwrap();
        assert!(!rejected.is_valid);
        assert_eq!(rejected.suggested_name, None);
        assert!(parse_validation_response(r#"{"topic": "x"}"#).is_err());
    }
}
