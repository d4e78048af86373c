use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::service::require_role;
use crate::session_server::SessionServerHandle;
use crate::sql_server::SqlServerHandle;
use crate::structs::models::{NewQuestion, Question, Role, User};
use crate::structs::request::CreateQuestionRequest;
use crate::structs::respond::{HistoryEntry, Respond};
use crate::structs::types::QuestionId;
use crate::utils::{now_unix, parse_deadline};

/// 问题必须属于当前教师
async fn owned_question(sql_server: &SqlServerHandle, teacher: &User, id: QuestionId) -> AppResult<Question> {
    let question = sql_server.get_question(id).await?;
    if question.teacher_id != teacher.id {
        log::warn!("教师{}尝试访问不属于自己的问题{}", teacher.username, id);
        return Err(AppError::Unauthorized("Access denied".to_string()));
    }
    Ok(question)
}

/// 学生只能查看本班教师布置的问题
pub(crate) async fn visible_question(sql_server: &SqlServerHandle, student: &User, id: QuestionId) -> AppResult<Question> {
    let question = sql_server.get_question(id).await?;
    let teacher = sql_server.get_user(question.teacher_id).await?;
    if !student.shares_class_with(&teacher) {
        log::warn!("学生{}尝试访问其他班级的问题{}", student.username, id);
        return Err(AppError::Unauthorized("Access denied: this question is not for your class".to_string()));
    }
    Ok(question)
}

// 教师创建新问题
pub(crate) async fn create_question(
    req: HttpRequest,
    req_body: web::Json<CreateQuestionRequest>,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
) -> AppResult<HttpResponse> {
    let teacher = require_role(&req, Role::Teacher, &sessions, &sql_server).await?;
    let req_body = req_body.into_inner();

    let title = req_body.title.trim().to_string();
    let question_text = req_body.question_text.trim().to_string();
    if title.is_empty() || question_text.is_empty() {
        return Err(AppError::BadRequest("Title and question text are required".to_string()));
    }
    if req_body.max_marks <= 0 || req_body.max_marks > u32::MAX as i64 {
        return Err(AppError::BadRequest("max_marks must be a positive number".to_string()));
    }
    let deadline = parse_deadline(&req_body.deadline)?;

    let question = sql_server
        .create_question(NewQuestion {
            title,
            question_text,
            max_marks: req_body.max_marks,
            deadline,
            requires_examples: req_body.requires_examples,
            requires_diagrams: req_body.requires_diagrams,
            teacher_id: teacher.id,
        })
        .await?;
    log::info!("教师{}创建了问题{}", teacher.username, question.id);
    Ok(HttpResponse::Ok().json(json!({"code": 200, "msg": "Question created", "question": question})))
}

// 教师的问题列表，新建的在前
pub(crate) async fn teacher_questions(
    req: HttpRequest,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
) -> AppResult<HttpResponse> {
    let teacher = require_role(&req, Role::Teacher, &sessions, &sql_server).await?;
    let questions = sql_server.list_teacher_questions(teacher.id).await?;
    Ok(HttpResponse::Ok().json(json!({"code": 200, "questions": questions})))
}

// 删除问题，相关提交一起删除
pub(crate) async fn delete_question(
    req: HttpRequest,
    path: web::Path<QuestionId>,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
) -> AppResult<HttpResponse> {
    let teacher = require_role(&req, Role::Teacher, &sessions, &sql_server).await?;
    let question = owned_question(&sql_server, &teacher, path.into_inner()).await?;
    sql_server.delete_question(question.id).await?;
    Ok(HttpResponse::Ok().json(Respond::ok("Question deleted")))
}

// 每个学生的最佳提交，按总分从高到低
pub(crate) async fn best_submissions(
    req: HttpRequest,
    path: web::Path<QuestionId>,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
) -> AppResult<HttpResponse> {
    let teacher = require_role(&req, Role::Teacher, &sessions, &sql_server).await?;
    let question = owned_question(&sql_server, &teacher, path.into_inner()).await?;
    let submissions = sql_server.list_best_submissions(question.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "code": 200,
        "question": question,
        "submissions": submissions,
    })))
}

// 学生可作答的问题
pub(crate) async fn open_questions(
    req: HttpRequest,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
) -> AppResult<HttpResponse> {
    let student = require_role(&req, Role::Student, &sessions, &sql_server).await?;
    let questions = sql_server.list_open_questions(student.class_name.clone(), now_unix()).await?;
    Ok(HttpResponse::Ok().json(json!({"code": 200, "questions": questions})))
}

// 查看问题以及自己的最佳提交和历史版本
pub(crate) async fn view_question(
    req: HttpRequest,
    path: web::Path<QuestionId>,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
) -> AppResult<HttpResponse> {
    let student = require_role(&req, Role::Student, &sessions, &sql_server).await?;
    let question = visible_question(&sql_server, &student, path.into_inner()).await?;
    let submissions = sql_server.list_student_submissions(student.id, question.id).await?;
    let best = submissions.iter().find(|submission| submission.is_best_submission);
    let history: Vec<HistoryEntry> = submissions.iter().map(HistoryEntry::from).collect();
    Ok(HttpResponse::Ok().json(json!({
        "code": 200,
        "question": question,
        "is_open": question.is_open(now_unix()),
        "best_submission": best,
        "history": history,
    })))
}
