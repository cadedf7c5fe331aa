use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ConfDir;
use crate::extract::EmbeddingExtractor;
use crate::metadata::MetadataStore;
use crate::model::Embedding;
use crate::utils::CancelToken;
use crate::writer::{Batch, IndexWriter};

/// 媒体摄取流程
///
/// 展开输入路径、过滤已索引文件、逐个提取向量、按批落盘。
/// 单个文件的失败只记录日志并跳过，存储层错误会中止整个运行。
pub struct Ingestor {
    conf_dir: ConfDir,
    extractor: EmbeddingExtractor,
    writer: IndexWriter,
    max_file_bytes: u64,
    batch_size: usize,
    cancel: CancelToken,
}

impl Ingestor {
    pub fn new(
        conf_dir: ConfDir,
        extractor: EmbeddingExtractor,
        max_file_bytes: u64,
        batch_size: usize,
    ) -> Self {
        let writer = IndexWriter::new(conf_dir.clone());
        Self { conf_dir, extractor, writer, max_file_bytes, batch_size, cancel: CancelToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 展开输入并启动一次摄取运行
    ///
    /// 返回惰性的进度序列：每处理一个文件产出一项 `(已处理, 总数)`，
    /// 最后追加一项 `(总数, 总数)` 表示完成。已索引路径的快照在
    /// 这里一次性读取，运行期间不再重查。
    pub fn run(&self, inputs: &[PathBuf]) -> Result<IngestProgress<'_>> {
        let existing = MetadataStore::load(self.conf_dir.metadata())?.existing_paths();

        let mut files = vec![];
        let mut seen = HashSet::new();
        for input in inputs {
            if input.is_file() {
                push_new(&mut files, &mut seen, input, &existing);
            } else if input.is_dir() {
                // 深度优先，排序保证同一目录两次运行的顺序一致
                for entry in WalkDir::new(input).sort_by_file_name() {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            warn!("目录扫描失败: {e}");
                            continue;
                        }
                    };
                    if entry.file_type().is_file() {
                        push_new(&mut files, &mut seen, entry.path(), &existing);
                    }
                }
            }
        }
        info!("待处理文件 {} 个", files.len());

        Ok(IngestProgress {
            ingestor: self,
            files,
            pos: 0,
            batch: vec![],
            flushes: 0,
            finished: false,
        })
    }

    /// 处理单个文件，返回其向量；所有按文件恢复的失败都在这里消化
    fn process_file(&self, path: &Path) -> Option<(String, Vec<Embedding>)> {
        let size = match path.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("读取文件信息失败: {}: {e}", path.display());
                return None;
            }
        };
        if size > self.max_file_bytes {
            info!("文件过大，跳过: {}", path.display());
            return None;
        }

        match self.extractor.extract(path) {
            Ok(embeddings) if embeddings.is_empty() => {
                debug!("未识别到人脸: {}", path.display());
                None
            }
            Ok(embeddings) => Some((path.to_string_lossy().into_owned(), embeddings)),
            Err(e) => {
                warn!("提取失败: {}: {e:#}", path.display());
                None
            }
        }
    }
}

/// 过滤已索引的路径和本次输入中的重复路径，保证批次内路径唯一
fn push_new(
    files: &mut Vec<PathBuf>,
    seen: &mut HashSet<String>,
    path: &Path,
    existing: &HashSet<String>,
) {
    let key = path.to_string_lossy();
    if existing.contains(key.as_ref()) {
        debug!("路径已在索引中，跳过: {}", path.display());
        return;
    }
    if !seen.insert(key.into_owned()) {
        debug!("输入中的重复路径，跳过: {}", path.display());
        return;
    }
    files.push(path.to_path_buf());
}

/// 一次摄取运行的进度序列
///
/// 迭代器每前进一步处理一个文件，消费者（CLI 进度条）驱动到结束。
/// 取消后把当前批次落盘并提前结束序列。
pub struct IngestProgress<'a> {
    ingestor: &'a Ingestor,
    files: Vec<PathBuf>,
    pos: usize,
    batch: Batch,
    flushes: u64,
    finished: bool,
}

impl IngestProgress<'_> {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    /// 到目前为止执行过的落盘次数
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.ingestor.writer.commit(&self.batch)?;
        self.batch.clear();
        self.flushes += 1;
        Ok(())
    }
}

impl Iterator for IngestProgress<'_> {
    type Item = Result<(usize, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let total = self.files.len();

        if self.ingestor.cancel.is_cancelled() {
            self.finished = true;
            info!("摄取被取消，落盘当前批次后退出");
            return match self.flush() {
                Ok(()) => None,
                Err(e) => Some(Err(e)),
            };
        }

        if self.pos < total {
            let path = self.files[self.pos].clone();
            self.pos += 1;

            if let Some(entry) = self.ingestor.process_file(&path) {
                self.batch.push(entry);
                if self.batch.len() >= self.ingestor.batch_size {
                    if let Err(e) = self.flush() {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }
            return Some(Ok((self.pos, total)));
        }

        // 末尾批次落盘后补上 (total, total) 结束哨兵
        self.finished = true;
        match self.flush() {
            Ok(()) => Some(Ok((total, total))),
            Err(e) => Some(Err(e)),
        }
    }
}
