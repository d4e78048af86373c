use actix_web::HttpRequest;

use crate::error::{AppError, AppResult};
use crate::session_server::SessionServerHandle;
use crate::sql_server::SqlServerHandle;
use crate::structs::models::{Role, User};

pub mod auth;
pub mod pages;
pub mod question;
pub mod resources;
pub mod submission;
pub mod upload;

/// 保存会话token的cookie名
pub const SESSION_COOKIE: &str = "session";

/// 根据cookie中的会话token找到当前登录的用户
pub(crate) async fn current_user(
    req: &HttpRequest,
    sessions: &SessionServerHandle,
    sql_server: &SqlServerHandle,
) -> AppResult<User> {
    let not_logged_in = || AppError::Unauthorized("Please log in first".to_string());
    let token = req.cookie(SESSION_COOKIE).ok_or_else(not_logged_in)?.value().to_string();
    let user_id = sessions.resolve(token).await?.ok_or_else(not_logged_in)?;
    match sql_server.get_user(user_id).await {
        Ok(user) => Ok(user),
        // 会话还在但用户已不存在
        Err(AppError::NotFound(_)) => Err(not_logged_in()),
        Err(e) => Err(e),
    }
}

/// 当前用户必须是指定角色
pub(crate) async fn require_role(
    req: &HttpRequest,
    role: Role,
    sessions: &SessionServerHandle,
    sql_server: &SqlServerHandle,
) -> AppResult<User> {
    let user = current_user(req, sessions, sql_server).await?;
    if user.role != role {
        log::warn!("用户{}尝试访问{:?}专用接口", user.username, role);
        return Err(AppError::Unauthorized("Access denied".to_string()));
    }
    Ok(user)
}
