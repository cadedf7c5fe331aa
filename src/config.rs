use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "facesearch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "facesearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// facesearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 扫描媒体文件并将人脸向量添加到索引
    Add(AddCommand),
    /// 用一张图片或视频从索引中搜索相似人脸
    Search(SearchCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct ModelOptions {
    /// 推理服务地址，接收图片字节并返回人脸检测结果
    #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:8686/detect")]
    pub model_endpoint: String,
    /// 推理请求超时时间（秒）
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub model_timeout: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct MediaOptions {
    /// 识别为图片的文件后缀，逗号分隔
    #[arg(long, value_name = "SUFFIX", default_value = "jpg,jpeg,png,bmp,tiff,webp")]
    pub image_suffix: String,
    /// 识别为视频的文件后缀，逗号分隔
    #[arg(long, value_name = "SUFFIX", default_value = "mp4,avi,mov,wmv,flv,mkv")]
    pub video_suffix: String,
    /// 超过该字节数的文件会被跳过
    #[arg(long, value_name = "BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_file_bytes: u64,
    /// 视频抽帧的目标帧率
    #[arg(long, value_name = "FPS", default_value_t = 5.0)]
    pub sample_target_fps: f64,
    /// 帧置信度达到该阈值后立即采用，不再继续扫描
    #[arg(long, value_name = "SCORE", default_value_t = 0.8)]
    pub confidence_threshold: f32,
}

impl MediaOptions {
    pub fn image_suffixes(&self) -> Vec<String> {
        split_suffixes(&self.image_suffix)
    }

    pub fn video_suffixes(&self) -> Vec<String> {
        split_suffixes(&self.video_suffix)
    }
}

fn split_suffixes(s: &str) -> Vec<String> {
    s.split(',').map(|s| s.trim().to_ascii_lowercase()).filter(|s| !s.is_empty()).collect()
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 每个查询向量返回的最近邻数量
    #[arg(short = 'k', long, value_name = "K", default_value_t = 10)]
    pub top_k: usize,
    /// 过滤低于该相似度的结果
    #[arg(long, value_name = "SCORE", default_value_t = 0.5)]
    pub min_score: f32,
    /// 显示的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回向量索引文件的路径
    pub fn index(&self) -> PathBuf {
        self.path.join("face.index")
    }

    /// 返回元数据文件的路径
    pub fn metadata(&self) -> PathBuf {
        self.path.join("datameta.json")
    }

    /// 返回写入锁文件的路径
    pub fn lock(&self) -> PathBuf {
        self.path.join(".lock")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
