use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::AppError;

/// 随提示词一起发送的图片
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// 生成式模型接口，返回模型的原始文字回复
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str, image: Option<&InlineImage>) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
}

#[derive(Debug, Serialize)]
struct GeminiBlob {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiReplyContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Self {
        GeminiClient {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

fn build_request(prompt: &str, image: Option<&InlineImage>) -> GeminiRequest {
    let mut parts = vec![GeminiPart::Text {
        text: prompt.to_string(),
    }];
    if let Some(image) = image {
        parts.push(GeminiPart::InlineData {
            inline_data: GeminiBlob {
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.data),
            },
        });
    }
    GeminiRequest {
        contents: vec![GeminiContent { parts }],
    }
}

/// 拼接第一个候选回复中的全部文字
fn response_text(response: GeminiResponse) -> Result<String, AppError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Model("no candidates in response".to_string()))?;
    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AppError::Model("empty response from model".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, prompt: &str, image: Option<&InlineImage>) -> Result<String, AppError> {
        if self.api_key.is_empty() {
            return Err(AppError::Config("model api key is not configured".to_string()));
        }
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&build_request(prompt, image))
            .send()
            .await
            .map_err(|e| {
                log::error!("请求模型接口失败: {}", e);
                AppError::Model(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::error!("模型接口返回错误: {} {}", status, body);
            return Err(AppError::Model(format!("model API returned {}", status)));
        }

        let response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Model(format!("unreadable model response: {}", e)))?;
        response_text(response)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// 按顺序返回预设回复的假模型
    pub(crate) struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, AppError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(replies: Vec<Result<String, AppError>>) -> Self {
            ScriptedClient {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn push(&self, reply: Result<String, AppError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn generate(&self, prompt: &str, _image: Option<&InlineImage>) -> Result<String, AppError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Model("no scripted reply left".to_string())))
        }
    }
}
