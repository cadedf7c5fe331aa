use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

/// 人脸嵌入向量的固定维度
pub const EMBEDDING_DIM: usize = 512;

/// 一条 512 维的人脸嵌入向量，按内积比较相似度
pub type Embedding = Vec<f32>;

/// 一次检测结果：人脸框、置信度、嵌入向量
#[derive(Debug, Clone, Deserialize)]
pub struct Detection {
    /// 人脸框 [x1, y1, x2, y2]
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub embedding: Embedding,
}

/// 人脸检测与嵌入模型
///
/// 模型本身是外部协作方，核心代码只依赖这一个接口，
/// 测试时用确定性的假实现替换。实现不得修改任何持久化状态。
pub trait FaceModel: Send + Sync {
    /// 检测图片中的所有人脸，返回每张人脸的框、置信度和嵌入向量
    ///
    /// `image` 为编码后的图片字节（jpg/png 等），顺序为检测器输出顺序。
    fn detect_and_embed(&self, image: &[u8]) -> Result<Vec<Detection>>;
}

/// 通过 HTTP 调用推理服务的模型实现
///
/// 推理服务接收图片字节，返回 JSON 数组：
/// `[{"bbox": [x1, y1, x2, y2], "confidence": 0.9, "embedding": [...]}]`
pub struct HttpFaceModel {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpFaceModel {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent =
            ureq::Agent::config_builder().timeout_global(Some(timeout)).build().into();
        Self { endpoint: endpoint.into(), agent }
    }
}

impl FaceModel for HttpFaceModel {
    fn detect_and_embed(&self, image: &[u8]) -> Result<Vec<Detection>> {
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "application/octet-stream")
            .send(image)?;
        let detections: Vec<Detection> = response.body_mut().read_json()?;
        for det in &detections {
            ensure!(
                det.embedding.len() == EMBEDDING_DIM,
                "模型返回的向量维度不正确: {} != {}",
                det.embedding.len(),
                EMBEDDING_DIM
            );
        }
        Ok(detections)
    }
}
