use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::error::AppError;
use crate::extraction::TextExtractor;
use crate::grading::Grader;
use crate::model_client::{GeminiClient, ModelClient};
use crate::session_server::SessionServer;
use crate::sql_server::SqlServer;

mod config;
mod error;
mod extraction;
mod grading;
mod model_client;
mod service;
mod session_server;
mod sql_server;
mod structs;
mod utils;
mod webserver;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_file = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = Config::load(&config_file)?;
    if config.model.api_key.is_empty() {
        log::warn!("未配置模型API密钥，评分和文字识别将不可用");
    }

    // 启动数据库服务
    let (sql_server, sql_server_handle) =
        SqlServer::new(config.database.file.clone(), config.database.max_connections).await?;
    tokio::spawn(sql_server.run());

    // 启动会话服务
    let (session_server, session_server_handle) =
        SessionServer::new(Duration::from_secs(config.server.session_ttl_secs));
    tokio::spawn(session_server.run());

    let client: Arc<dyn ModelClient> = Arc::new(GeminiClient::new(&config.model));
    let retry_policy = config.model.retry_policy();
    let extractor = TextExtractor::new(client.clone(), retry_policy.attempt_timeout);
    let grader = Grader::new(client, retry_policy);

    webserver::run(config, sql_server_handle, session_server_handle, grader, extractor).await?;
    Ok(())
}
