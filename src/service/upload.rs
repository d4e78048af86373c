use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::json;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::extraction::TextExtractor;
use crate::service::current_user;
use crate::session_server::SessionServerHandle;
use crate::sql_server::SqlServerHandle;
use crate::utils::is_allowed_file;

// 上传图片或PDF并识别其中的文字
pub(crate) async fn extract(
    req: HttpRequest,
    mut payload: Multipart,
    config: web::Data<Config>,
    sessions: web::Data<SessionServerHandle>,
    sql_server: web::Data<SqlServerHandle>,
    extractor: web::Data<TextExtractor>,
) -> AppResult<HttpResponse> {
    let user = current_user(&req, &sessions, &sql_server).await?;
    let limit = config.server.max_upload_bytes;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        let (name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().map(str::to_string),
                disposition.get_filename().map(str::to_string),
            ),
            None => (None, None),
        };
        // 只处理名为file的字段
        if name.as_deref() != Some("file") {
            continue;
        }
        let filename = match filename {
            Some(filename) if !filename.is_empty() => filename,
            _ => return Err(AppError::BadRequest("No file selected".to_string())),
        };
        if !is_allowed_file(&filename) {
            return Err(AppError::BadRequest("Invalid file type".to_string()));
        }

        // 将接收的数据写入内存
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e)))?;
            if data.len() + chunk.len() > limit {
                return Err(AppError::BadRequest(format!("File is larger than {} bytes", limit)));
            }
            data.extend_from_slice(&chunk);
        }
        log::info!("用户{}上传了文件{}，大小{}字节", user.username, filename, data.len());

        let text = extractor.extract_text(&filename, data).await?;
        return Ok(HttpResponse::Ok().json(json!({"success": true, "text": text})));
    }
    Err(AppError::BadRequest("No file uploaded".to_string()))
}
