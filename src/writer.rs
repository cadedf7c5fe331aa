use std::fs::File;

use anyhow::Result;
use fs2::FileExt;
use log::{debug, info};

use crate::config::ConfDir;
use crate::index::VectorIndex;
use crate::metadata::MetadataStore;
use crate::model::Embedding;

/// 一批待写入的 (路径, 向量列表)，路径在批内唯一
pub type Batch = Vec<(String, Vec<Embedding>)>;

/// 将一批向量合并进元数据与索引并落盘
///
/// 每次提交都重新从磁盘加载两个存储，整体改写后再保存。
/// 整个 load-mutate-save 周期持有排它文件锁，避免并发写入者
/// 互相覆盖对方的修改。
pub struct IndexWriter {
    conf_dir: ConfDir,
}

impl IndexWriter {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir }
    }

    /// 提交一个批次，返回本次新分配的 id 数量
    ///
    /// 已索引过的路径（以元数据中的 value 为准）会被整体跳过，
    /// 不会重复分配 id。同一路径的多条向量获得连续的 id，
    /// 计数器跨整个批次递增，批次中途不会重置。
    pub fn commit(&self, batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        std::fs::create_dir_all(self.conf_dir.path())?;
        // 锁随 lock_file 关闭自动释放
        let lock_file = File::create(self.conf_dir.lock())?;
        FileExt::lock_exclusive(&lock_file)?;
        self.commit_locked(batch)
    }

    fn commit_locked(&self, batch: &Batch) -> Result<u64> {
        let mut metadata = MetadataStore::load(self.conf_dir.metadata())?;
        let index = VectorIndex::open(self.conf_dir.index())?;

        let mut existing = metadata.existing_paths();
        let mut next_id = metadata.max_id();
        let mut added = 0u64;

        for (path, embeddings) in batch {
            if existing.contains(path) {
                debug!("路径已在索引中，跳过: {path}");
                continue;
            }
            existing.insert(path.clone());

            for embedding in embeddings {
                next_id += 1;
                index.add(next_id, embedding)?;
                metadata.record(next_id, path.clone());
                added += 1;
            }
        }

        if added == 0 {
            return Ok(0);
        }

        // 先写元数据，后写索引。两次写入之间崩溃会留下
        // 引用了索引中不存在 id 的元数据，下次运行靠路径去重跳过重做。
        metadata.save(self.conf_dir.metadata())?;
        index.save(self.conf_dir.index())?;

        info!("批次提交完成: {} 条向量, max_id = {}", added, next_id);
        Ok(added)
    }
}
