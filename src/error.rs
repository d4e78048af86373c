use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// 上传的文件中没有提取到任何文字
    #[error("No text could be extracted: {0}")]
    ExtractionFailed(String),

    /// 模型回复中找不到可以解析的json对象
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// 重试次数用尽
    #[error("Grading failed after {attempts} attempts")]
    GradingUnavailable { attempts: u32 },

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    /// 后台服务的管道已关闭
    #[error("Connection to a background server was closed")]
    ConnectionClosed,
}

pub type AppResult<T> = Result<T, AppError>;

/// 单个评分项的分数不是数字，只影响该项
#[derive(Debug, Error)]
#[error("Section marks are not numeric: {0}")]
pub struct ValidationError(pub String);

impl AppError {
    /// 返回给用户的文字，不泄露内部细节
    fn user_message(&self) -> String {
        match self {
            AppError::GradingUnavailable { .. }
            | AppError::MalformedResponse(_)
            | AppError::Model(_)
            | AppError::Timeout(_) => "grading failed, try again".to_string(),
            AppError::Database(_) => "A storage error occurred. Please try again.".to_string(),
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) | AppError::ConnectionClosed => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::GradingUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MalformedResponse(_) | AppError::Model(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Internal(_)
            | AppError::ConnectionClosed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("请求处理失败: {}", self);
        }
        HttpResponse::build(status).json(json!({
            "code": status.as_u16(),
            "msg": self.user_message(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grading_unavailable_hides_details() {
        let err = AppError::GradingUnavailable { attempts: 3 };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.user_message(), "grading failed, try again");
    }

    #[test]
    fn database_errors_are_generic() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.user_message().contains("RowNotFound"));
    }

    #[test]
    fn unauthorized_keeps_its_message() {
        let err = AppError::Unauthorized("You are not authorized to view this question.".into());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.user_message(), "You are not authorized to view this question.");
    }
}
