use crate::grading::normalizer::BASE_SCALE;

/// 评分请求，生成发给模型的完整提示词
#[derive(Debug, Clone)]
pub struct GradingRequest<'a> {
    question_text: &'a str,
    answer_text: &'a str,
    max_marks: u32,
    diagrams_required: bool,
}

impl<'a> GradingRequest<'a> {
    pub fn new(question_text: &'a str, answer_text: &'a str, max_marks: u32, diagrams_required: bool) -> Self {
        GradingRequest {
            question_text,
            answer_text,
            max_marks,
            diagrams_required,
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            r#"You are a grading assistant. Grade the student answer below and reply with ONLY a single JSON object. Do not add any text, explanation or markdown before or after the JSON.

Question: {question}
Student Answer: {answer}
Maximum marks: {max_marks}
Diagrams Required: {diagrams}

Grading Rules:
1. Base scoring, out of {base}:
   - Introduction: up to 4 marks (40%)
   - Main Body: up to 4 marks (40%)
   - Conclusion: up to 2 marks (20%)
2. Bonus scoring, each scored independently from 0 to 2:
   - Examples: 0 if the answer contains no examples.
   - Diagrams: 0 unless the answer contains an actual diagram, figure or other visual element. A text description of a diagram is NOT a diagram and must get 0.

Return exactly this JSON structure:
{{
    "introduction": {{"marks": <number 0-4>, "feedback": "<clear feedback>"}},
    "main_body": {{"marks": <number 0-4>, "feedback": "<clear feedback>"}},
    "conclusion": {{"marks": <number 0-2>, "feedback": "<clear feedback>"}},
    "examples": {{"marks": <number 0-2>, "feedback": "<clear feedback>"}},
    "diagrams": {{"marks": <number 0-2>, "feedback": "<clear feedback>"}},
    "ai_detection_score": <number 0-1>
}}"#,
            question = self.question_text,
            answer = self.answer_text,
            max_marks = self.max_marks,
            diagrams = if self.diagrams_required { "Yes" } else { "No" },
            base = BASE_SCALE,
        )
    }
}

/// 自由点评模式的提示词，回复原样返回
pub fn review_prompt(question_text: &str, answer_text: &str) -> String {
    format!(
        "Review this answer and provide feedback.\n\
         Question: {}\n\
         Student's Answer: {}\n\n\
         Focus on strengths, areas for improvement, and specific suggestions.",
        question_text, answer_text
    )
}
