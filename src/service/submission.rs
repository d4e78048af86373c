use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::grading::Grader;
use crate::service::question::visible_question;
use crate::service::{current_user, require_role};
use crate::session_server::SessionServerHandle;
use crate::sql_server::SqlServerHandle;
use crate::structs::models::{NewSubmission, Role};
use crate::structs::request::SubmitRequest;
use crate::structs::respond::SubmitResponse;
use crate::structs::types::{QuestionId, SubmissionId};
use crate::utils::now_unix;

// 提交或重新提交答案并评分
pub(crate) async fn submit(
    req: HttpRequest,
    path: web::Path<QuestionId>,
    req_body: web::Json<SubmitRequest>,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
    grader: web::Data<Grader>,
) -> AppResult<HttpResponse> {
    let student = require_role(&req, Role::Student, &sessions, &sql_server).await?;
    let question = visible_question(&sql_server, &student, path.into_inner()).await?;

    let answer = req_body.into_inner().answer.trim().to_string();
    if answer.is_empty() {
        return Err(AppError::BadRequest("Answer cannot be empty".to_string()));
    }
    if !question.is_open(now_unix()) {
        return Err(AppError::BadRequest("The deadline for this question has passed".to_string()));
    }
    let max_marks = u32::try_from(question.max_marks)
        .map_err(|_| AppError::Internal(format!("question {} has invalid max_marks", question.id)))?;

    // 评分失败时不保存任何记录
    let result = grader
        .grade(&question.question_text, &answer, max_marks, question.requires_diagrams)
        .await?;
    let submission = sql_server
        .record_submission(NewSubmission {
            answer,
            question_id: question.id,
            student_id: student.id,
            result,
        })
        .await?;

    let msg = if submission.is_best_submission {
        "Answer submitted. This is your best version so far."
    } else {
        "Answer submitted. Your best version is unchanged."
    };
    Ok(HttpResponse::Ok().json(SubmitResponse {
        code: 200,
        msg: msg.to_string(),
        submission_id: submission.id,
        version: submission.version,
        is_best: submission.is_best_submission,
        max_marks: question.max_marks,
        result: submission.grading_result(),
    }))
}

// 对某次提交生成文字点评，提交者本人或出题教师可用
pub(crate) async fn review(
    req: HttpRequest,
    path: web::Path<SubmissionId>,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
    grader: web::Data<Grader>,
) -> AppResult<HttpResponse> {
    let user = current_user(&req, &sessions, &sql_server).await?;
    let submission = sql_server.get_submission(path.into_inner()).await?;
    let question = sql_server.get_question(submission.question_id).await?;

    let allowed = match user.role {
        Role::Student => submission.student_id == user.id,
        Role::Teacher => question.teacher_id == user.id,
    };
    if !allowed {
        log::warn!("用户{}无权查看提交{}", user.username, submission.id);
        return Err(AppError::Unauthorized("Access denied".to_string()));
    }

    let review = grader.review(&question.question_text, &submission.answer).await;
    Ok(HttpResponse::Ok().json(json!({
        "code": 200,
        "review": review,
        "submission": submission,
        "question": question,
    })))
}
