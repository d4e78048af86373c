use serde_json::Value;

use crate::error::ValidationError;
use crate::grading::{GradingResult, RawGrading, RawSection, Section, SectionMark};

/// 模型打分使用的基准满分
pub const BASE_SCALE: f64 = 10.0;

/// 图示反馈中必须出现其中之一，否则图示分记为0
pub const DIAGRAM_INDICATORS: [&str; 6] = ["diagram", "figure", "chart", "graph", "illustration", "visual"];

pub const CALCULATION_ERROR_FEEDBACK: &str = "Error calculating marks";

/// 把0-10基准分换算到题目满分，并限制每项和总分的上限
#[derive(Debug, Clone, Copy)]
pub struct ScoreNormalizer {
    max_marks: f64,
    diagrams_required: bool,
}

impl ScoreNormalizer {
    pub fn new(max_marks: u32, diagrams_required: bool) -> Self {
        ScoreNormalizer {
            max_marks: f64::from(max_marks),
            diagrams_required,
        }
    }

    pub fn scaling_factor(&self) -> f64 {
        self.max_marks / BASE_SCALE
    }

    /// 各评分项换算后的上限
    pub fn cap(&self, section: Section) -> f64 {
        let share = match section {
            Section::Introduction | Section::MainBody => 0.4,
            Section::Conclusion => 0.2,
            Section::Diagrams if self.diagrams_required => 0.2,
            Section::Examples | Section::Diagrams => 0.1,
        };
        self.max_marks * share
    }

    pub fn normalize(&self, raw: &RawGrading) -> GradingResult {
        let mark = |section: Section| {
            if section.is_bonus() {
                self.bonus_section(section, raw.section(section))
            } else {
                self.base_section(section, raw.section(section))
            }
        };
        let introduction = mark(Section::Introduction);
        let main_body = mark(Section::MainBody);
        let conclusion = mark(Section::Conclusion);
        let examples = mark(Section::Examples);
        let diagrams = mark(Section::Diagrams);

        let base = introduction.marks + main_body.marks + conclusion.marks;
        let bonus = examples.marks + diagrams.marks;
        // 各项单独截断后总和仍可能略超满分
        let total_marks = (base + bonus).min(self.max_marks).max(0.0);

        GradingResult {
            introduction,
            main_body,
            conclusion,
            examples,
            diagrams,
            total_marks,
            ai_detection_score: ai_detection_score(&raw.ai_detection_score),
        }
    }

    fn base_section(&self, section: Section, raw: &RawSection) -> SectionMark {
        match read_marks(&raw.marks) {
            Ok(marks) => SectionMark {
                marks: self.scale(section, marks),
                feedback: feedback_text(&raw.feedback),
            },
            Err(e) => {
                log::warn!("评分项{}分数无效: {}", section.key(), e);
                calculation_error()
            }
        }
    }

    fn bonus_section(&self, section: Section, raw: &RawSection) -> SectionMark {
        let mut marks = match read_marks(&raw.marks) {
            Ok(marks) => marks,
            Err(e) => {
                log::warn!("评分项{}分数无效: {}", section.key(), e);
                return calculation_error();
            }
        };
        let feedback = feedback_text(&raw.feedback);

        // 模型常把对图示的文字描述也算作图示
        if section == Section::Diagrams && !mentions_diagram(&feedback) {
            log::debug!("图示反馈中没有图示相关词语，图示分记为0");
            marks = 0.0;
        }

        if marks > 0.0 {
            SectionMark {
                marks: self.scale(section, marks),
                feedback,
            }
        } else {
            SectionMark {
                marks: 0.0,
                feedback: format!("No {} provided", section.key()),
            }
        }
    }

    fn scale(&self, section: Section, marks: f64) -> f64 {
        (marks * self.scaling_factor()).min(self.cap(section)).max(0.0)
    }
}

pub fn mentions_diagram(feedback: &str) -> bool {
    let feedback = feedback.to_lowercase();
    DIAGRAM_INDICATORS.iter().any(|word| feedback.contains(word))
}

/// 分数可以是数字或数字字符串
fn read_marks(value: &Value) -> Result<f64, ValidationError> {
    let marks = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    marks
        .filter(|marks| marks.is_finite())
        .ok_or_else(|| ValidationError(value.to_string()))
}

fn feedback_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn ai_detection_score(value: &Value) -> f64 {
    read_marks(value).map(|score| score.clamp(0.0, 1.0)).unwrap_or(0.0)
}

fn calculation_error() -> SectionMark {
    SectionMark {
        marks: 0.0,
        feedback: CALCULATION_ERROR_FEEDBACK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn raw_section(marks: Value, feedback: &str) -> RawSection {
        RawSection {
            marks,
            feedback: json!(feedback),
        }
    }

    fn raw(marks: [Value; 5], diagram_feedback: &str) -> RawGrading {
        let [introduction, main_body, conclusion, examples, diagrams] = marks;
        RawGrading {
            introduction: raw_section(introduction, "intro feedback"),
            main_body: raw_section(main_body, "body feedback"),
            conclusion: raw_section(conclusion, "conclusion feedback"),
            examples: raw_section(examples, "used a good example"),
            diagrams: raw_section(diagrams, diagram_feedback),
            ai_detection_score: json!(0.2),
        }
    }

    // 把换算结果重新当作模型回复
    fn refeed(result: &GradingResult) -> RawGrading {
        let section = |mark: &SectionMark| RawSection {
            marks: json!(mark.marks),
            feedback: json!(mark.feedback),
        };
        RawGrading {
            introduction: section(&result.introduction),
            main_body: section(&result.main_body),
            conclusion: section(&result.conclusion),
            examples: section(&result.examples),
            diagrams: section(&result.diagrams),
            ai_detection_score: json!(result.ai_detection_score),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
    }

    #[test]
    fn end_to_end_scenario() {
        let raw = raw(
            [json!(3), json!(3), json!(1), json!(1), json!(1)],
            "a nice diagram showing the process",
        );
        let result = ScoreNormalizer::new(20, false).normalize(&raw);
        assert_close(result.introduction.marks, 6.0);
        assert_close(result.main_body.marks, 6.0);
        assert_close(result.conclusion.marks, 2.0);
        assert_close(result.examples.marks, 2.0);
        assert_close(result.diagrams.marks, 2.0);
        assert_close(result.total_marks, 18.0);
        assert_eq!(result.diagrams.feedback, "a nice diagram showing the process");
    }

    #[test]
    fn sections_are_capped() {
        let raw = raw([json!(10), json!(9), json!(8), json!(7), json!(6)], "labelled figure");
        let normalizer = ScoreNormalizer::new(10, false);
        let result = normalizer.normalize(&raw);
        assert_close(result.introduction.marks, 4.0);
        assert_close(result.main_body.marks, 4.0);
        assert_close(result.conclusion.marks, 2.0);
        assert_close(result.examples.marks, 1.0);
        assert_close(result.diagrams.marks, 1.0);
        assert_close(result.total_marks, 10.0);
    }

    #[rstest]
    #[case(true, 0.2)]
    #[case(false, 0.1)]
    fn diagram_cap_depends_on_requirement(#[case] required: bool, #[case] share: f64) {
        let normalizer = ScoreNormalizer::new(30, required);
        assert_close(normalizer.cap(Section::Diagrams), 30.0 * share);
        let result = normalizer.normalize(&raw([json!(0), json!(0), json!(0), json!(0), json!(2)], "a flow chart"));
        assert_close(result.diagrams.marks, 30.0 * share);
    }

    #[rstest]
    #[case("Includes a DIAGRAM of the heart")]
    #[case("see figure 2")]
    #[case("bar chart is clear")]
    #[case("the graph is labelled")]
    #[case("helpful illustration")]
    #[case("strong visual layout")]
    fn indicator_words_keep_diagram_marks(#[case] feedback: &str) {
        let result = ScoreNormalizer::new(10, true).normalize(&raw(
            [json!(0), json!(0), json!(0), json!(0), json!(1.5)],
            feedback,
        ));
        assert_close(result.diagrams.marks, 1.5);
        assert_eq!(result.diagrams.feedback, feedback);
    }

    #[rstest]
    #[case(json!(2))]
    #[case(json!(0.5))]
    #[case(json!("2"))]
    fn prose_without_indicator_forces_zero(#[case] marks: Value) {
        let result = ScoreNormalizer::new(10, true).normalize(&raw(
            [json!(4), json!(4), json!(2), json!(0), marks],
            "The student describes the water cycle in words",
        ));
        assert_eq!(result.diagrams.marks, 0.0);
        assert_eq!(result.diagrams.feedback, "No diagrams provided");
    }

    #[test]
    fn zero_bonus_reports_missing_section() {
        let result = ScoreNormalizer::new(10, false).normalize(&raw(
            [json!(1), json!(1), json!(1), json!(0), json!(0)],
            "diagram",
        ));
        assert_eq!(result.examples.marks, 0.0);
        assert_eq!(result.examples.feedback, "No examples provided");
        assert_eq!(result.diagrams.feedback, "No diagrams provided");
    }

    #[test]
    fn non_numeric_marks_only_zero_their_section() {
        let result = ScoreNormalizer::new(10, false).normalize(&raw(
            [json!("three"), json!(3), json!(null), json!({"a": 1}), json!(1)],
            "chart",
        ));
        assert_eq!(result.introduction.marks, 0.0);
        assert_eq!(result.introduction.feedback, CALCULATION_ERROR_FEEDBACK);
        assert_close(result.main_body.marks, 3.0);
        assert_eq!(result.main_body.feedback, "body feedback");
        assert_eq!(result.conclusion.feedback, CALCULATION_ERROR_FEEDBACK);
        assert_eq!(result.examples.feedback, CALCULATION_ERROR_FEEDBACK);
        assert_close(result.diagrams.marks, 1.0);
        assert_close(result.total_marks, 4.0);
    }

    #[test]
    fn negative_marks_never_go_below_zero() {
        let result = ScoreNormalizer::new(10, false).normalize(&raw(
            [json!(-5), json!(-1), json!(2), json!(-2), json!(-2)],
            "chart",
        ));
        assert_eq!(result.introduction.marks, 0.0);
        assert_eq!(result.main_body.marks, 0.0);
        assert_close(result.conclusion.marks, 2.0);
        assert_eq!(result.examples.marks, 0.0);
        assert_eq!(result.diagrams.marks, 0.0);
        assert_close(result.total_marks, 2.0);
    }

    #[test]
    fn total_stays_within_max_marks() {
        let samples = [0.0, 0.3, 1.0, 2.5, 4.0, 7.7, 10.0, 55.0];
        for max_marks in [1, 3, 7, 10, 13, 20, 99, 100] {
            for required in [true, false] {
                let normalizer = ScoreNormalizer::new(max_marks, required);
                for &a in &samples {
                    for &b in &samples {
                        let raw = raw([json!(a), json!(b), json!(a), json!(b), json!(a)], "figure");
                        let result = normalizer.normalize(&raw);
                        assert!(result.total_marks >= 0.0);
                        assert!(result.total_marks <= f64::from(max_marks));
                        for section in Section::ALL {
                            let marks = result.section(section).marks;
                            assert!(marks >= 0.0 && marks <= normalizer.cap(section));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn renormalizing_at_base_scale_is_stable() {
        let normalizer = ScoreNormalizer::new(10, true);
        assert_close(normalizer.scaling_factor(), 1.0);
        let first = normalizer.normalize(&raw(
            [json!(3.5), json!(4), json!(1.5), json!(0.5), json!(2)],
            "clear diagram",
        ));
        let second = normalizer.normalize(&refeed(&first));
        assert_eq!(first, second);

        let zeroed = normalizer.normalize(&raw([json!(1), json!(1), json!(1), json!(0), json!(2)], "text only"));
        assert_eq!(normalizer.normalize(&refeed(&zeroed)), zeroed);
    }

    #[test]
    fn ai_detection_score_defaults_and_clamps() {
        let mut raw = raw([json!(1), json!(1), json!(1), json!(0), json!(0)], "");
        raw.ai_detection_score = json!("0.4");
        assert_close(ScoreNormalizer::new(10, false).normalize(&raw).ai_detection_score, 0.4);
        raw.ai_detection_score = json!(3);
        assert_close(ScoreNormalizer::new(10, false).normalize(&raw).ai_detection_score, 1.0);
        raw.ai_detection_score = json!("unknown");
        assert_eq!(ScoreNormalizer::new(10, false).normalize(&raw).ai_detection_score, 0.0);
    }
}
