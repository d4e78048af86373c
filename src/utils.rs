use time::format_description::well_known::Rfc3339;
use time::{format_description, OffsetDateTime, PrimitiveDateTime};

use crate::error::AppError;

// 允许上传的文件类型
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

/// 合并连续的空白字符并去掉首尾空白
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn is_allowed_file(filename: &str) -> bool {
    match file_extension(filename) {
        Some(ext) => ALLOWED_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// 解析截止时间，支持RFC 3339以及不带时区的表单格式(按UTC处理)
pub fn parse_deadline(input: &str) -> Result<i64, AppError> {
    let input = input.trim();
    if let Ok(datetime) = OffsetDateTime::parse(input, &Rfc3339) {
        return Ok(datetime.unix_timestamp());
    }
    for pattern in [
        "[year]-[month]-[day]T[hour]:[minute]:[second]",
        "[year]-[month]-[day]T[hour]:[minute]",
    ] {
        let description = format_description::parse(pattern)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if let Ok(datetime) = PrimitiveDateTime::parse(input, &description) {
            return Ok(datetime.assume_utc().unix_timestamp());
        }
    }
    Err(AppError::BadRequest(format!("Invalid deadline: {}", input)))
}

pub fn format_timestamp(timestamp: i64) -> String {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|datetime| datetime.format(&Rfc3339).ok())
        .unwrap_or_else(|| timestamp.to_string())
}
