//! Best-effort structured parsing of generator output.
//!
//! Backends answer in free text that usually, but not always, contains one
//! JSON object. These helpers find that object and deserialize it; anything
//! unusable becomes `None` (or the caller's default) rather than an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Find the first balanced JSON object in `text`.
///
/// Prefers a ```json fenced block. Otherwise scans from the first `{`,
/// tracking string literals and escapes so braces inside strings do not end
/// the object early.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.find("```") {
            let fenced = body[..end].trim();
            if fenced.starts_with('{') {
                return Some(fenced);
            }
        }
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and deserialize the first JSON object in `text`.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Option<T> {
    let json = extract_json_object(text)?;
    serde_json::from_str(json).ok()
}

/// [`parse_structured`] with a typed fallback.
pub fn parse_or_default<T: DeserializeOwned>(text: &str, default: T) -> T {
    parse_structured(text).unwrap_or(default)
}

/// Jaccard similarity of the lowercase word sets of `a` and `b`, 0.0–1.0.
/// Two empty texts count as identical.
pub fn word_similarity(a: &str, b: &str) -> f64 {
    fn words(s: &str) -> std::collections::HashSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
    let (wa, wb) = (words(a), words(b));
    if wa.is_empty() && wb.is_empty() {
        return 1.0;
    }
    let shared = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    shared as f64 / union as f64
}

/// Loose shape of a persona's answer. Every field is optional; the persona
/// strategy decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredPosition {
    #[serde(alias = "claim", alias = "thesis", alias = "recommendation")]
    pub position: Option<String>,
    #[serde(alias = "rationale", alias = "argument")]
    pub reasoning: Option<String>,
    #[serde(alias = "supporting_evidence", alias = "supportingEvidence")]
    pub evidence: Vec<serde_json::Value>,
    /// Accepts 0–100 or 0.0–1.0.
    pub confidence: Option<f64>,
    #[serde(
        alias = "suggestedActions",
        alias = "actions",
        alias = "recommended_actions"
    )]
    pub suggested_actions: Vec<String>,
}

impl StructuredPosition {
    /// Confidence on a 0–100 scale, clamped.
    pub fn confidence_percent(&self) -> Option<u8> {
        let raw = self.confidence?;
        if !raw.is_finite() {
            return None;
        }
        let scaled = if raw > 0.0 && raw <= 1.0 { raw * 100.0 } else { raw };
        Some(scaled.round().clamp(0.0, 100.0) as u8)
    }

    /// Has at least a non-empty position.
    pub fn is_usable(&self) -> bool {
        self.position
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_prose() {
        let text = r#"Sure! Here is my answer: {"position": "Cut scrap", "confidence": 72} Hope that helps."#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"position": "Cut scrap", "confidence": 72}"#)
        );
    }

    #[test]
    fn test_extract_fenced() {
        let text = "intro\n```json\n{\"position\": \"x\"}\n```\ntrailer {not json}";
        assert_eq!(extract_json_object(text), Some("{\"position\": \"x\"}"));
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"reasoning": "use {braces} and \"quotes\"", "n": {"a": 1}} tail }"#;
        let json = extract_json_object(text).unwrap();
        assert!(json.ends_with("{\"a\": 1}}"));
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(v["n"]["a"], 1);
    }

    #[test]
    fn test_unbalanced_is_none() {
        assert_eq!(extract_json_object("{\"a\": 1"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_aliases_and_scale() {
        let text = r#"{"claim": "Raise safety stock", "rationale": "lead times", "confidence": 0.64, "suggestedActions": ["Add 2 weeks cover"]}"#;
        let pos: StructuredPosition = parse_structured(text).unwrap();
        assert_eq!(pos.position.as_deref(), Some("Raise safety stock"));
        assert_eq!(pos.confidence_percent(), Some(64));
        assert_eq!(pos.suggested_actions.len(), 1);
        assert!(pos.is_usable());
    }

    #[test]
    fn test_parse_or_default() {
        let fallback = StructuredPosition::default();
        let parsed: StructuredPosition = parse_or_default("garbage", fallback.clone());
        assert_eq!(parsed, fallback);
        assert!(!parsed.is_usable());
    }

    #[test]
    fn test_word_similarity() {
        assert_eq!(word_similarity("Cut scrap now", "cut SCRAP, now!"), 1.0);
        assert_eq!(word_similarity("a b", "c d"), 0.0);
        let s = word_similarity("raise safety stock", "raise safety stock levels");
        assert!((s - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_clamped() {
        let pos = StructuredPosition {
            confidence: Some(180.0),
            ..Default::default()
        };
        assert_eq!(pos.confidence_percent(), Some(100));
    }
}
