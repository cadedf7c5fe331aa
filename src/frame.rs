use std::io::Cursor;

use anyhow::Result;
use image::ImageFormat;
use image::imageops::FilterType;
use log::debug;

use crate::model::FaceModel;
use crate::utils::CancelToken;
use crate::video::VideoSource;

/// 送入检测器前帧的缩放尺寸
const DETECT_SIZE: u32 = 640;
/// 头尾两个密集采样窗口的帧数上限
const DENSE_WINDOW: u64 = 100;

/// 在视频中搜索人脸最清晰的一帧
///
/// 三段式采样：开头约 10%（上限 100 帧）逐帧扫描，结尾 100 帧
/// 逐帧扫描，中间按目标帧率抽样。任何一帧的置信度达到阈值就
/// 立即采用，否则返回全程的最高分帧。同一视频同一参数下结果确定。
pub struct FrameSelector<'a> {
    model: &'a dyn FaceModel,
    target_fps: f64,
    threshold: f32,
    cancel: CancelToken,
}

impl<'a> FrameSelector<'a> {
    pub fn new(model: &'a dyn FaceModel, target_fps: f64, threshold: f32) -> Self {
        Self { model, target_fps, threshold, cancel: CancelToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 返回选中帧的图片字节；全程没有检测到人脸时返回 None
    pub fn select(&self, video: &mut dyn VideoSource) -> Result<Option<Vec<u8>>> {
        let total = video.frame_count();
        let stride = (video.fps() / self.target_fps).round().max(1.0) as u64;

        let mut best: Option<(f32, Vec<u8>)> = None;

        for (start, end, stride) in sample_windows(total, stride) {
            if start >= end {
                continue;
            }
            let mut index = start;
            while index < end {
                if self.cancel.is_cancelled() {
                    return Ok(None);
                }

                let Some(frame) = video.read_frame(index)? else {
                    break;
                };
                let confidence = self.frame_confidence(&frame)?;
                if confidence >= self.threshold {
                    debug!("帧 {index} 置信度 {confidence:.3} 达到阈值，提前结束");
                    return Ok(Some(frame));
                }
                if confidence > best.as_ref().map_or(0.0, |(score, _)| *score) {
                    best = Some((confidence, frame));
                }

                index += stride;
            }
        }

        Ok(best.map(|(_, frame)| frame))
    }

    /// 缩放到固定尺寸后检测，取所有人脸的最高置信度
    fn frame_confidence(&self, frame: &[u8]) -> Result<f32> {
        let preview = resize_for_detect(frame)?;
        let detections = self.model.detect_and_embed(&preview)?;
        Ok(detections.iter().map(|d| d.confidence).fold(0.0, f32::max))
    }
}

/// 三个采样窗口 (起始帧, 结束帧, 步长)，按检查顺序排列
fn sample_windows(total: u64, stride: u64) -> [(u64, u64, u64); 3] {
    [
        (0, (total / 10).min(DENSE_WINDOW), 1),
        (total.saturating_sub(DENSE_WINDOW), total, 1),
        (DENSE_WINDOW, total.saturating_sub(DENSE_WINDOW), stride),
    ]
}

fn resize_for_detect(frame: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(frame)?;
    let resized = image.resize_exact(DETECT_SIZE, DETECT_SIZE, FilterType::Triangle);
    let mut buffer = Cursor::new(Vec::new());
    resized.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
