use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::grading::{RawGrading, RawSection, Section};

pub const MISSING_FEEDBACK: &str = "No feedback available";

/// 截取第一个`{`到最后一个`}`之间的内容
pub fn extract_json_span(text: &str) -> Result<&str, AppError> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&text[start..=end]),
        _ => Err(AppError::MalformedResponse("no JSON object found in response".to_string())),
    }
}

/// 解析模型回复，缺少字段的评分项用默认值补齐
pub fn parse_response(text: &str) -> Result<RawGrading, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::MalformedResponse("empty response".to_string()));
    }
    let span = extract_json_span(text)?;
    log::debug!("提取到的json: {}", span);

    let value: Value = serde_json::from_str(span)
        .map_err(|e| AppError::MalformedResponse(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::MalformedResponse("response is not a JSON object".to_string()))?;

    let section = |section: Section| -> Result<RawSection, AppError> {
        let entry = object
            .get(section.key())
            .ok_or_else(|| AppError::MalformedResponse(format!("missing required field: {}", section.key())))?;
        Ok(repair_section(section, entry))
    };

    Ok(RawGrading {
        introduction: section(Section::Introduction)?,
        main_body: section(Section::MainBody)?,
        conclusion: section(Section::Conclusion)?,
        examples: section(Section::Examples)?,
        diagrams: section(Section::Diagrams)?,
        ai_detection_score: object.get("ai_detection_score").cloned().unwrap_or_else(|| json!(0.0)),
    })
}

fn repair_section(section: Section, entry: &Value) -> RawSection {
    match entry.as_object().and_then(marks_and_feedback) {
        Some((marks, feedback)) => RawSection {
            marks: marks.clone(),
            feedback: feedback.clone(),
        },
        None => {
            log::warn!("评分项{}格式不完整，使用默认值", section.key());
            RawSection {
                marks: json!(0),
                feedback: json!(MISSING_FEEDBACK),
            }
        }
    }
}

fn marks_and_feedback(map: &Map<String, Value>) -> Option<(&Value, &Value)> {
    Some((map.get("marks")?, map.get("feedback")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_response(diagrams: &str) -> String {
        format!(
            r#"{{
                "introduction": {{"marks": 3, "feedback": "ok"}},
                "main_body": {{"marks": "3.5", "feedback": "good"}},
                "conclusion": {{"marks": 1, "feedback": "short"}},
                "examples": {{"marks": 0, "feedback": "none"}},
                "diagrams": {}
            }}"#,
            diagrams
        )
    }

    #[test]
    fn extracts_only_the_object_span() {
        let text = r#"Here is the result: {"introduction":{"marks":1}} extra"#;
        assert_eq!(extract_json_span(text).unwrap(), r#"{"introduction":{"marks":1}}"#);
    }

    #[test]
    fn no_brace_is_malformed() {
        assert!(matches!(
            extract_json_span("the answer is great"),
            Err(AppError::MalformedResponse(_))
        ));
        assert!(matches!(extract_json_span("} backwards {"), Err(AppError::MalformedResponse(_))));
        assert!(matches!(parse_response("no json here"), Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn empty_reply_is_malformed() {
        assert!(matches!(parse_response("  \n"), Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_response("```json\n{\"introduction\": }\n```"),
            Err(AppError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_section_key_is_malformed() {
        let text = r#"{"introduction": {"marks": 1, "feedback": "x"}}"#;
        let err = parse_response(text).unwrap_err();
        assert!(err.to_string().contains("main_body"));
    }

    #[test]
    fn parses_fenced_response() {
        let text = format!("```json\n{}\n```", full_response(r#"{"marks": 1, "feedback": "chart"}"#));
        let raw = parse_response(&text).unwrap();
        assert_eq!(raw.introduction.marks, json!(3));
        assert_eq!(raw.main_body.marks, json!("3.5"));
        assert_eq!(raw.diagrams.feedback, json!("chart"));
        assert_eq!(raw.ai_detection_score, json!(0.0));
    }

    #[test]
    fn incomplete_sections_are_repaired() {
        for diagrams in [r#""a string""#, r#"{"marks": 2}"#, r#"{"feedback": "nice figure"}"#, "null"] {
            let raw = parse_response(&full_response(diagrams)).unwrap();
            assert_eq!(raw.diagrams.marks, json!(0), "case {}", diagrams);
            assert_eq!(raw.diagrams.feedback, json!(MISSING_FEEDBACK), "case {}", diagrams);
        }
    }

    #[test]
    fn keeps_ai_detection_score_when_present() {
        let text = full_response(r#"{"marks": 0, "feedback": "none"}"#).replacen('{', r#"{"ai_detection_score": 0.75,"#, 1);
        let raw = parse_response(&text).unwrap();
        assert_eq!(raw.ai_detection_score, json!(0.75));
    }
}
