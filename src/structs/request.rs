use serde::Deserialize;

use crate::structs::models::Role;

#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) password: String,
    pub(crate) role: Role,
    #[serde(default)]
    pub(crate) class_name: Option<String>,
    // 教师码或学生码，登录时使用
    pub(crate) code: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub(crate) role: Role,
    pub(crate) code: String,
    pub(crate) password: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateQuestionRequest {
    pub(crate) title: String,
    pub(crate) question_text: String,
    pub(crate) max_marks: i64,
    pub(crate) deadline: String,
    #[serde(default)]
    pub(crate) requires_examples: bool,
    #[serde(default)]
    pub(crate) requires_diagrams: bool,
}

// 提交或重新提交答案
#[derive(Deserialize, Debug)]
pub struct SubmitRequest {
    pub(crate) answer: String,
}
