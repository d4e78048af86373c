use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::grading::{GradingResult, SectionMark};
use crate::structs::types::{QuestionId, SubmissionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub class_name: Option<String>,
    #[serde(skip_serializing)]
    pub teacher_code: Option<String>,
    #[serde(skip_serializing)]
    pub student_code: Option<String>,
}

impl User {
    /// 双方都设置了班级且不同才视为不同班级
    pub fn shares_class_with(&self, other: &User) -> bool {
        match (&self.class_name, &other.class_name) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    pub question_text: String,
    pub max_marks: i64,
    /// unix时间戳(秒)
    pub deadline: i64,
    pub requires_examples: bool,
    pub requires_diagrams: bool,
    pub created_at: i64,
    pub teacher_id: UserId,
}

impl Question {
    pub fn is_open(&self, now: i64) -> bool {
        self.deadline > now
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Submission {
    pub id: SubmissionId,
    pub answer: String,
    pub question_id: QuestionId,
    pub student_id: UserId,
    pub version: i64,
    pub introduction_marks: f64,
    pub main_body_marks: f64,
    pub conclusion_marks: f64,
    pub examples_marks: f64,
    pub diagrams_marks: f64,
    pub total_marks: f64,
    pub introduction_feedback: String,
    pub main_body_feedback: String,
    pub conclusion_feedback: String,
    pub examples_feedback: String,
    pub diagrams_feedback: String,
    pub ai_detection_score: f64,
    pub is_best_submission: bool,
    pub submitted_at: i64,
}

impl Submission {
    /// 还原成评分结果，便于按评分项展示
    pub fn grading_result(&self) -> GradingResult {
        let mark = |marks: f64, feedback: &str| SectionMark {
            marks,
            feedback: feedback.to_string(),
        };
        GradingResult {
            introduction: mark(self.introduction_marks, &self.introduction_feedback),
            main_body: mark(self.main_body_marks, &self.main_body_feedback),
            conclusion: mark(self.conclusion_marks, &self.conclusion_feedback),
            examples: mark(self.examples_marks, &self.examples_feedback),
            diagrams: mark(self.diagrams_marks, &self.diagrams_feedback),
            total_marks: self.total_marks,
            ai_detection_score: self.ai_detection_score,
        }
    }
}

/// 教师查看提交列表时附带学生用户名
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BestSubmission {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub submission: Submission,
    pub username: String,
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub class_name: Option<String>,
    pub login_code: String,
}

#[derive(Debug)]
pub struct NewQuestion {
    pub title: String,
    pub question_text: String,
    pub max_marks: i64,
    pub deadline: i64,
    pub requires_examples: bool,
    pub requires_diagrams: bool,
    pub teacher_id: UserId,
}

#[derive(Debug)]
pub struct NewSubmission {
    pub answer: String,
    pub question_id: QuestionId,
    pub student_id: UserId,
    pub result: GradingResult,
}
