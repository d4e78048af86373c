use serde::Serialize;

use crate::grading::GradingResult;
use crate::structs::models::Submission;
use crate::structs::types::SubmissionId;
use crate::utils::format_timestamp;

#[derive(Serialize)]
pub struct Respond {
    pub(crate) code: u16,
    pub(crate) msg: String,
}

impl Respond {
    pub fn ok(msg: impl Into<String>) -> Self {
        Respond { code: 200, msg: msg.into() }
    }
}

// 评分完成后返回给学生的结果
#[derive(Serialize)]
pub struct SubmitResponse {
    pub(crate) code: u16,
    pub(crate) msg: String,
    pub(crate) submission_id: SubmissionId,
    pub(crate) version: i64,
    pub(crate) is_best: bool,
    pub(crate) max_marks: i64,
    pub(crate) result: GradingResult,
}

// 历史版本列表中的一项
#[derive(Serialize, Debug, PartialEq)]
pub struct HistoryEntry {
    pub(crate) id: SubmissionId,
    pub(crate) version: i64,
    pub(crate) date: String,
    pub(crate) score: f64,
    pub(crate) is_best: bool,
}

impl From<&Submission> for HistoryEntry {
    fn from(submission: &Submission) -> Self {
        HistoryEntry {
            id: submission.id,
            version: submission.version,
            date: format_timestamp(submission.submitted_at),
            score: submission.total_marks,
            is_best: submission.is_best_submission,
        }
    }
}
