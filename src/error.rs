use std::path::PathBuf;

use thiserror::Error;

/// 存储层错误分类
///
/// 单个文件的提取失败不属于这里：那类错误只影响当前文件，
/// 由摄取流程记录日志后跳过。这里的错误会中止当前操作。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 索引文件存在但无法解析，或维度不符
    #[error("索引文件损坏: {path}: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },
    /// 元数据文件存在但不是合法的 JSON 对象
    #[error("元数据文件损坏: {path}: {reason}")]
    MetadataCorrupt { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
