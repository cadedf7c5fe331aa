use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

fn ffmpeg_path() -> String {
    std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string())
}

fn ffprobe_path() -> String {
    std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string())
}

/// 按帧号随机读取的视频源
///
/// 抽帧算法只依赖这个接口，测试时用内存中的假视频替换。
pub trait VideoSource {
    /// 视频总帧数
    fn frame_count(&self) -> u64;
    /// 视频帧率
    fn fps(&self) -> f64;
    /// 解码第 index 帧，返回编码后的图片字节；越界返回 None
    fn read_frame(&mut self, index: u64) -> Result<Option<Vec<u8>>>;
}

/// 通过 ffmpeg/ffprobe 子进程解码的视频源
///
/// 可执行文件路径可用 FFMPEG_PATH / FFPROBE_PATH 环境变量覆盖。
pub struct FfmpegVideoSource {
    path: PathBuf,
    frame_count: u64,
    fps: f64,
}

impl FfmpegVideoSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let output = Command::new(ffprobe_path())
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                path.to_str().context("非法的视频路径")?,
            ])
            .output()
            .context("ffprobe 执行失败")?;
        if !output.status.success() {
            bail!("ffprobe 退出码异常: {}", output.status);
        }

        let parsed: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("ffprobe 输出不是合法 JSON")?;
        let streams = parsed["streams"].as_array().context("ffprobe 输出缺少 streams")?;
        let video_stream = streams
            .iter()
            .find(|stream| stream["codec_type"] == "video")
            .context("视频中没有视频流")?;

        let fps = parse_frame_rate(video_stream["r_frame_rate"].as_str().unwrap_or(""))
            .context("无法解析视频帧率")?;

        // 部分容器不带 nb_frames，用时长估算
        let frame_count = match video_stream["nb_frames"].as_str().and_then(|s| s.parse().ok()) {
            Some(n) => n,
            None => {
                let duration = parsed["format"]["duration"]
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .context("无法获取视频时长")?;
                (duration * fps) as u64
            }
        };

        Ok(Self { path: path.to_path_buf(), frame_count, fps })
    }
}

impl VideoSource for FfmpegVideoSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn read_frame(&mut self, index: u64) -> Result<Option<Vec<u8>>> {
        if index >= self.frame_count {
            return Ok(None);
        }
        // -ss 放在 -i 之前按时间戳跳转，解码从最近的关键帧开始，
        // 避免每取一帧都从视频开头顺序解码
        let output = Command::new(ffmpeg_path())
            .args([
                "-v",
                "quiet",
                "-ss",
                &format!("{:.6}", frame_timestamp(index, self.fps)),
                "-i",
                self.path.to_str().context("非法的视频路径")?,
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-c:v",
                "png",
                "pipe:1",
            ])
            .output()
            .context("ffmpeg 执行失败")?;
        if !output.status.success() {
            bail!("ffmpeg 退出码异常: {}", output.status);
        }
        if output.stdout.is_empty() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }
}

/// 第 index 帧在视频中的时间戳（秒）
fn frame_timestamp(index: u64, fps: f64) -> f64 {
    index as f64 / fps
}

/// 解析 ffprobe 的 "30000/1001" 形式帧率
fn parse_frame_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timestamp() {
        assert_eq!(frame_timestamp(0, 30.0), 0.0);
        assert_eq!(frame_timestamp(30, 30.0), 1.0);
        assert_eq!(frame_timestamp(15, 30.0), 0.5);
        let ntsc = frame_timestamp(30, 30000.0 / 1001.0);
        assert!((ntsc - 1.001).abs() < 1e-9);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }
}
