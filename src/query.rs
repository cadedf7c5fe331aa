use anyhow::Result;
use log::warn;
use rayon::prelude::*;

use crate::config::ConfDir;
use crate::index::VectorIndex;
use crate::metadata::MetadataStore;
use crate::model::Embedding;

/// 以向量查询已索引的媒体文件
///
/// 每次构造都从磁盘完整加载索引和元数据，与写入方共享同一份
/// 持久化状态，但不会修改它。
pub struct QueryEngine {
    index: VectorIndex,
    metadata: MetadataStore,
}

impl QueryEngine {
    pub fn open(conf_dir: &ConfDir) -> Result<Self> {
        let index = VectorIndex::open(conf_dir.index())?;
        let metadata = MetadataStore::load(conf_dir.metadata())?;
        Ok(Self { index, metadata })
    }

    /// 对每条查询向量独立做 k 近邻搜索，合并所有结果
    ///
    /// 返回 (分数, 路径)，已按 `min_score` 过滤。不同查询向量的结果
    /// 直接拼接，不去重也不统一排序；一个文件匹配多张查询人脸时会
    /// 出现多次。需要单一排序的调用方自行排序。
    pub fn query(
        &self,
        embeddings: &[Embedding],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<(f32, String)>> {
        let results = embeddings
            .par_iter()
            .map(|embedding| self.query_one(embedding, k))
            .collect::<Result<Vec<_>>>()?;

        Ok(results
            .into_iter()
            .flatten()
            .filter(|(score, _)| *score >= min_score)
            .collect())
    }

    fn query_one(&self, embedding: &Embedding, k: usize) -> Result<Vec<(f32, String)>> {
        let mut matched = vec![];
        for (score, id) in self.index.search(embedding, k)? {
            // id <= 0 是"无匹配"哨兵
            if id <= 0 {
                continue;
            }
            match self.metadata.path_of(id as u64) {
                Some(path) => matched.push((score, path.to_string())),
                // 元数据先于索引落盘的崩溃窗口可能留下悬空 id
                None => warn!("索引返回了元数据中不存在的 id: {id}"),
            }
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::{conf_dir, one_hot};
    use crate::writer::IndexWriter;

    fn populated(dir: &std::path::Path) -> Result<ConfDir> {
        let conf = conf_dir(dir);
        let writer = IndexWriter::new(conf.clone());
        writer.commit(&vec![
            ("a.jpg".to_string(), vec![one_hot(0)]),
            ("b.jpg".to_string(), vec![one_hot(1), one_hot(2)]),
        ])?;
        Ok(conf)
    }

    #[test]
    fn test_exact_match() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conf = populated(dir.path())?;

        let engine = QueryEngine::open(&conf)?;
        let result = engine.query(&[one_hot(0)], 1, 0.99)?;
        assert_eq!(result.len(), 1);
        assert!((result[0].0 - 1.0).abs() < 1e-5);
        assert_eq!(result[0].1, "a.jpg");
        Ok(())
    }

    #[test]
    fn test_min_score_filter() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conf = populated(dir.path())?;

        let engine = QueryEngine::open(&conf)?;
        // one_hot(0) 与 one_hot(1)/one_hot(2) 内积为 0
        let result = engine.query(&[one_hot(0)], 3, 0.5)?;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1, "a.jpg");
        Ok(())
    }

    #[test]
    fn test_multi_embedding_concat() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conf = populated(dir.path())?;

        let engine = QueryEngine::open(&conf)?;
        // 两条查询向量命中同一文件时允许重复出现
        let result = engine.query(&[one_hot(1), one_hot(2)], 1, 0.9)?;
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|(_, path)| path == "b.jpg"));
        Ok(())
    }

    #[test]
    fn test_empty_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conf = conf_dir(dir.path());

        let engine = QueryEngine::open(&conf)?;
        assert!(engine.query(&[one_hot(0)], 10, 0.0)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_dangling_id_dropped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conf = populated(dir.path())?;

        // 重写元数据抹掉 id=1，索引里的对应向量成为悬空 id，
        // 模拟两次落盘之间崩溃留下的不一致状态
        std::fs::write(conf.metadata(), br#"{"2": "b.jpg", "3": "b.jpg"}"#)?;

        let engine = QueryEngine::open(&conf)?;
        // 最近邻恰是悬空的 id=1，它应被丢弃而不是报错
        let result = engine.query(&[one_hot(0)], 3, 0.0)?;
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|(_, path)| path == "b.jpg"));
        Ok(())
    }

    #[test]
    fn test_no_sentinel_leak() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conf = conf_dir(dir.path());
        IndexWriter::new(conf.clone())
            .commit(&vec![("a.jpg".to_string(), vec![one_hot(0)])])?;

        let engine = QueryEngine::open(&conf)?;
        // 索引条目少于 k，结果里不能混入哨兵 id
        let result = engine.query(&[one_hot(0)], 10, 0.0)?;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1, "a.jpg");
        Ok(())
    }
}
