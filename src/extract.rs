use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;

use crate::config::MediaOptions;
use crate::frame::FrameSelector;
use crate::model::{Embedding, FaceModel};
use crate::utils::CancelToken;
use crate::video::FfmpegVideoSource;

/// 按扩展名划分的媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// 从媒体文件中提取人脸嵌入向量
///
/// 图片直接送检测器；视频先抽出最佳帧再按图片处理。
/// 不识别的扩展名返回空列表，不算错误。本组件不修改任何持久化状态。
pub struct EmbeddingExtractor {
    model: Arc<dyn FaceModel>,
    options: MediaOptions,
    image_suffixes: Vec<String>,
    video_suffixes: Vec<String>,
    cancel: CancelToken,
}

impl EmbeddingExtractor {
    pub fn new(model: Arc<dyn FaceModel>, options: MediaOptions) -> Self {
        let image_suffixes = options.image_suffixes();
        let video_suffixes = options.video_suffixes();
        Self { model, options, image_suffixes, video_suffixes, cancel: CancelToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let suffix = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.image_suffixes.iter().any(|s| *s == suffix) {
            return Some(MediaKind::Image);
        }
        if self.video_suffixes.iter().any(|s| *s == suffix) {
            return Some(MediaKind::Video);
        }
        None
    }

    /// 提取一个文件的全部人脸向量
    ///
    /// 没有人脸（包括视频中选不出帧）返回空列表。
    pub fn extract(&self, path: &Path) -> Result<Vec<Embedding>> {
        match self.classify(path) {
            Some(MediaKind::Image) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("读取图片失败: {}", path.display()))?;
                self.embed_image(&bytes)
            }
            Some(MediaKind::Video) => {
                let mut video = FfmpegVideoSource::open(path)
                    .with_context(|| format!("打开视频失败: {}", path.display()))?;
                let selector = FrameSelector::new(
                    &*self.model,
                    self.options.sample_target_fps,
                    self.options.confidence_threshold,
                )
                .with_cancel(self.cancel.clone());
                match selector.select(&mut video)? {
                    Some(frame) => self.embed_image(&frame),
                    None => {
                        debug!("视频中没有检测到人脸: {}", path.display());
                        Ok(vec![])
                    }
                }
            }
            None => Ok(vec![]),
        }
    }

    fn embed_image(&self, image: &[u8]) -> Result<Vec<Embedding>> {
        let detections = self.model.detect_and_embed(image)?;
        Ok(detections.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::model::Detection;
    use crate::utils::tests::one_hot;

    struct NullModel;

    impl FaceModel for NullModel {
        fn detect_and_embed(&self, _image: &[u8]) -> Result<Vec<Detection>> {
            Ok(vec![Detection { bbox: [0.0; 4], confidence: 0.9, embedding: one_hot(0) }])
        }
    }

    fn extractor() -> EmbeddingExtractor {
        let options = MediaOptions::parse_from(["test"]);
        EmbeddingExtractor::new(Arc::new(NullModel), options)
    }

    #[test]
    fn test_classify() {
        let e = extractor();
        assert_eq!(e.classify(Path::new("a.jpg")), Some(MediaKind::Image));
        assert_eq!(e.classify(Path::new("a.JPEG")), Some(MediaKind::Image));
        assert_eq!(e.classify(Path::new("b.mp4")), Some(MediaKind::Video));
        assert_eq!(e.classify(Path::new("c.txt")), None);
        assert_eq!(e.classify(Path::new("noext")), None);
    }

    #[test]
    fn test_unknown_suffix_yields_nothing() -> Result<()> {
        let e = extractor();
        assert!(e.extract(Path::new("c.txt"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_image_extraction() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake image bytes")?;

        let embeddings = extractor().extract(&path)?;
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0], one_hot(0));
        Ok(())
    }
}
