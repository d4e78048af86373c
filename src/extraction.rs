use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::error::AppError;
use crate::model_client::{InlineImage, ModelClient};
use crate::utils::{clean_text, file_extension};

/// PDF暂不支持识别，直接返回提示
pub const PDF_ADVISORY: &str =
    "PDF extraction is being updated. Please upload images directly for better results.";

const EXTRACTION_PROMPT: &str = "Extract all text from this image.\n\
    Maintain original formatting, structure, and preserve text exactly as shown.";

/// 从上传的图片中识别文字
pub struct TextExtractor {
    client: Arc<dyn ModelClient>,
    /// 单次识别请求的超时时间
    timeout: Duration,
}

impl TextExtractor {
    pub fn new(client: Arc<dyn ModelClient>, timeout: Duration) -> Self {
        TextExtractor { client, timeout }
    }

    pub async fn extract_text(&self, filename: &str, data: Vec<u8>) -> Result<String, AppError> {
        let extension = file_extension(filename).unwrap_or_default();
        match extension.as_str() {
            "pdf" => {
                log::info!("收到PDF文件{}，返回提示信息", filename);
                Ok(PDF_ADVISORY.to_string())
            }
            "png" | "jpg" | "jpeg" => {
                let image = InlineImage {
                    mime_type: mime_guess::from_path(filename).first_or_octet_stream().essence_str().to_string(),
                    data,
                };
                let text = match time::timeout(self.timeout, self.client.generate(EXTRACTION_PROMPT, Some(&image))).await {
                    Ok(reply) => reply.map_err(|e| AppError::ExtractionFailed(e.to_string()))?,
                    Err(_) => {
                        log::error!("识别图片{}超时", filename);
                        return Err(AppError::ExtractionFailed(format!("model did not answer within {:?}", self.timeout)));
                    }
                };
                let text = clean_text(&text);
                if text.is_empty() {
                    return Err(AppError::ExtractionFailed("No text was extracted from the image".to_string()));
                }
                log::info!("从图片{}中识别出{}个字符", filename, text.len());
                Ok(text)
            }
            _ => Err(AppError::BadRequest("Invalid file type".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::model_client::testing::ScriptedClient;
    use crate::model_client::InlineImage;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// 永远不回复的模型
    struct StalledClient;

    #[async_trait]
    impl ModelClient for StalledClient {
        async fn generate(&self, _prompt: &str, _image: Option<&InlineImage>) -> Result<String, AppError> {
            time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn pdf_returns_advisory_without_model_call() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let extractor = TextExtractor::new(client.clone(), TIMEOUT);
        assert_eq!(extractor.extract_text("essay.PDF", vec![1, 2]).await.unwrap(), PDF_ADVISORY);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn image_text_is_cleaned() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("  Photosynthesis\n\n uses   light ".to_string())]));
        let extractor = TextExtractor::new(client.clone(), TIMEOUT);
        let text = extractor.extract_text("page1.jpg", vec![0xff, 0xd8]).await.unwrap();
        assert_eq!(text, "Photosynthesis uses light");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn blank_or_failed_extraction() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(" \n\t ".to_string()),
            Err(AppError::Model("quota".to_string())),
        ]));
        let extractor = TextExtractor::new(client, TIMEOUT);
        assert!(matches!(
            extractor.extract_text("a.png", vec![]).await,
            Err(AppError::ExtractionFailed(_))
        ));
        assert!(matches!(
            extractor.extract_text("a.jpeg", vec![]).await,
            Err(AppError::ExtractionFailed(_))
        ));
    }

    #[tokio::test]
    async fn other_files_are_rejected() {
        let extractor = TextExtractor::new(Arc::new(ScriptedClient::new(vec![])), TIMEOUT);
        assert!(matches!(
            extractor.extract_text("notes.docx", vec![]).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn stalled_model_times_out() {
        let extractor = TextExtractor::new(Arc::new(StalledClient), Duration::from_millis(50));
        let result = time::timeout(Duration::from_secs(5), extractor.extract_text("a.png", vec![1])).await;
        assert!(matches!(result, Ok(Err(AppError::ExtractionFailed(_)))));
    }
}
