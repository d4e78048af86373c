//! 答案评分流程
//!
//! 构造提示词 -> 调用模型并解析(失败重试) -> 分数换算 -> 决定是否为最佳版本。

pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod selector;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time;

use crate::error::AppError;
use crate::model_client::ModelClient;
use normalizer::ScoreNormalizer;
use prompt::{review_prompt, GradingRequest};
use retry::RetryPolicy;

pub const REVIEW_FALLBACK: &str = "No feedback available";
pub const REVIEW_FAILED: &str = "AI review generation failed. Please try again later.";

/// 评分项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Introduction,
    MainBody,
    Conclusion,
    Examples,
    Diagrams,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Introduction,
        Section::MainBody,
        Section::Conclusion,
        Section::Examples,
        Section::Diagrams,
    ];

    /// 模型回复和数据库中使用的名称
    pub fn key(self) -> &'static str {
        match self {
            Section::Introduction => "introduction",
            Section::MainBody => "main_body",
            Section::Conclusion => "conclusion",
            Section::Examples => "examples",
            Section::Diagrams => "diagrams",
        }
    }

    pub fn is_bonus(self) -> bool {
        matches!(self, Section::Examples | Section::Diagrams)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMark {
    pub marks: f64,
    pub feedback: String,
}

/// 换算到题目满分后的评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub introduction: SectionMark,
    pub main_body: SectionMark,
    pub conclusion: SectionMark,
    pub examples: SectionMark,
    pub diagrams: SectionMark,
    pub total_marks: f64,
    pub ai_detection_score: f64,
}

impl GradingResult {
    pub fn section(&self, section: Section) -> &SectionMark {
        match section {
            Section::Introduction => &self.introduction,
            Section::MainBody => &self.main_body,
            Section::Conclusion => &self.conclusion,
            Section::Examples => &self.examples,
            Section::Diagrams => &self.diagrams,
        }
    }
}

/// 模型给出的单项原始值，尚未校验类型
#[derive(Debug, Clone, PartialEq)]
pub struct RawSection {
    pub marks: Value,
    pub feedback: Value,
}

/// 解析并修复后的模型回复，分数仍是0-10基准分
#[derive(Debug, Clone, PartialEq)]
pub struct RawGrading {
    pub introduction: RawSection,
    pub main_body: RawSection,
    pub conclusion: RawSection,
    pub examples: RawSection,
    pub diagrams: RawSection,
    pub ai_detection_score: Value,
}

impl RawGrading {
    pub fn section(&self, section: Section) -> &RawSection {
        match section {
            Section::Introduction => &self.introduction,
            Section::MainBody => &self.main_body,
            Section::Conclusion => &self.conclusion,
            Section::Examples => &self.examples,
            Section::Diagrams => &self.diagrams,
        }
    }
}

pub struct Grader {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

impl Grader {
    pub fn new(client: Arc<dyn ModelClient>, retry: RetryPolicy) -> Self {
        Grader { client, retry }
    }

    /// 对答案评分，调用和解析整体按重试策略执行
    pub async fn grade(
        &self,
        question_text: &str,
        answer_text: &str,
        max_marks: u32,
        diagrams_required: bool,
    ) -> Result<GradingResult, AppError> {
        let prompt = GradingRequest::new(question_text, answer_text, max_marks, diagrams_required).prompt();
        let prompt = prompt.as_str();
        let client = &*self.client;

        let raw = self
            .retry
            .run(move |attempt| async move {
                log::debug!("第{}次请求模型评分", attempt);
                let text = client.generate(prompt, None).await?;
                log::debug!("模型原始回复: {}", text);
                parser::parse_response(&text)
            })
            .await?;

        let result = ScoreNormalizer::new(max_marks, diagrams_required).normalize(&raw);
        log::info!("评分完成，总分 {:.2}/{}", result.total_marks, max_marks);
        for section in Section::ALL {
            let mark = result.section(section);
            log::debug!("{}: {:.2} 分, {}", section.key(), mark.marks, mark.feedback);
        }
        Ok(result)
    }

    /// 生成自由格式的点评，失败时返回固定提示而不是报错
    pub async fn review(&self, question_text: &str, answer_text: &str) -> String {
        let prompt = review_prompt(question_text, answer_text);
        let reply = time::timeout(self.retry.attempt_timeout, self.client.generate(&prompt, None)).await;
        match reply {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => REVIEW_FALLBACK.to_string(),
            Ok(Err(e)) => {
                log::error!("生成点评失败: {}", e);
                REVIEW_FAILED.to_string()
            }
            Err(_) => {
                log::error!("生成点评超时");
                REVIEW_FAILED.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model_client::testing::ScriptedClient;

    const EXPECTED_SCENARIO: &str = r#"Sure! {
        "introduction": {"marks": 3, "feedback": "clear framing"},
        "main_body": {"marks": 3, "feedback": "solid argument"},
        "conclusion": {"marks": 1, "feedback": "brief"},
        "examples": {"marks": 1, "feedback": "one example"},
        "diagrams": {"marks": 1, "feedback": "a nice diagram showing the cycle"},
        "ai_detection_score": 0.1
    } Hope that helps."#;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            retry_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn grades_end_to_end_scenario() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(EXPECTED_SCENARIO.to_string())]));
        let grader = Grader::new(client.clone(), policy());

        let result = grader.grade("Explain the water cycle", "answer", 20, false).await.unwrap();

        assert_eq!(result.introduction.marks, 6.0);
        assert_eq!(result.main_body.marks, 6.0);
        assert_eq!(result.conclusion.marks, 2.0);
        assert_eq!(result.examples.marks, 2.0);
        assert_eq!(result.diagrams.marks, 2.0);
        assert_eq!(result.total_marks, 18.0);
        assert_eq!(result.ai_detection_score, 0.1);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_replies_are_retried() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("I cannot grade this".to_string()),
            Err(AppError::Model("503".to_string())),
            Ok(EXPECTED_SCENARIO.to_string()),
        ]));
        let grader = Grader::new(client.clone(), policy());

        let result = grader.grade("q", "a", 20, false).await.unwrap();
        assert_eq!(result.total_marks, 18.0);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_failures() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(String::new()),
            Ok("{ not json }".to_string()),
            Ok("no braces at all".to_string()),
            Ok(EXPECTED_SCENARIO.to_string()),
        ]));
        let grader = Grader::new(client.clone(), policy());

        let err = grader.grade("q", "a", 20, false).await.unwrap_err();
        assert!(matches!(err, AppError::GradingUnavailable { attempts: 3 }));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn review_returns_text_verbatim() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("Strong intro. {not json}".to_string())]));
        let grader = Grader::new(client.clone(), policy());
        assert_eq!(grader.review("q", "a").await, "Strong intro. {not json}");
        assert!(client.prompts()[0].contains("strengths"));
    }

    #[tokio::test]
    async fn review_failures_become_fixed_messages() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("   ".to_string()),
            Err(AppError::Model("down".to_string())),
        ]));
        let grader = Grader::new(client, policy());
        assert_eq!(grader.review("q", "a").await, REVIEW_FALLBACK);
        assert_eq!(grader.review("q", "a").await, REVIEW_FAILED);
    }
}
