use actix_web::cookie::Cookie;
use actix_web::{web, HttpRequest, HttpResponse};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::service::SESSION_COOKIE;
use crate::session_server::SessionServerHandle;
use crate::sql_server::SqlServerHandle;
use crate::structs::models::{NewUser, Role, User};
use crate::structs::request::{LoginRequest, RegisterRequest};
use crate::structs::respond::Respond;

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            log::error!("无法解析密码哈希: {}", e);
            false
        }
    }
}

/// 登录失败的日志内容，不记录登录码
fn login_failure_note(role: Role, user: Option<&User>) -> String {
    match user {
        Some(user) => format!("用户{}登录失败，密码错误", user.username),
        None => format!("{:?}登录失败，登录码不存在", role),
    }
}

fn required(value: &str, name: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", name)));
    }
    Ok(value.to_string())
}

// 注册新的教师或学生账号
pub(crate) async fn register(
    req_body: web::Json<RegisterRequest>,
    sql_server: web::Data<SqlServerHandle>,
) -> AppResult<HttpResponse> {
    let req_body = req_body.into_inner();
    let username = required(&req_body.username, "username")?;
    let login_code = required(&req_body.code, "code")?;
    if req_body.password.is_empty() {
        return Err(AppError::BadRequest("password is required".to_string()));
    }
    let class_name = req_body
        .class_name
        .map(|class_name| class_name.trim().to_string())
        .filter(|class_name| !class_name.is_empty());

    let user = sql_server
        .create_user(NewUser {
            username,
            email: req_body.email.trim().to_string(),
            password_hash: hash_password(&req_body.password)?,
            role: req_body.role,
            class_name,
            login_code,
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({"code": 200, "msg": "Registration successful", "user": user})))
}

// 使用角色、登录码和密码登录
pub(crate) async fn login(
    req_body: web::Json<LoginRequest>,
    sql_server: web::Data<SqlServerHandle>,
    sessions: web::Data<SessionServerHandle>,
) -> AppResult<HttpResponse> {
    let req_body = req_body.into_inner();
    let user = sql_server.find_login_user(req_body.role, req_body.code.trim().to_string()).await?;
    let user = match user {
        Some(user) if verify_password(&req_body.password, &user.password_hash) => user,
        other => {
            log::warn!("{}", login_failure_note(req_body.role, other.as_ref()));
            return Err(AppError::Unauthorized("Invalid code or password".to_string()));
        }
    };

    let token = sessions.create(user.id).await?;
    log::info!("用户{}登录成功", user.username);
    let cookie = Cookie::build(SESSION_COOKIE, token).path("/").http_only(true).finish();
    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({"code": 200, "msg": "Login successful", "user": user})))
}

pub(crate) async fn logout(req: HttpRequest, sessions: web::Data<SessionServerHandle>) -> AppResult<HttpResponse> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        sessions.remove(cookie.value().to_string()).await?;
    }
    let mut removal = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    removal.make_removal();
    Ok(HttpResponse::Ok().cookie(removal).json(Respond::ok("Logged out")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn corrupt_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(matches!(required("   ", "username"), Err(AppError::BadRequest(_))));
        assert_eq!(required(" amy ", "username").unwrap(), "amy");
    }

    #[test]
    fn failed_login_note_omits_login_code() {
        let user = User {
            id: 1,
            username: "sam".to_string(),
            email: "sam@school.test".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Student,
            class_name: None,
            teacher_code: None,
            student_code: Some("S-200".to_string()),
        };
        let known = login_failure_note(Role::Student, Some(&user));
        assert!(known.contains("sam"));
        assert!(!known.contains("S-200"));
        let unknown = login_failure_note(Role::Teacher, None);
        assert!(unknown.contains("Teacher"));
    }
}
