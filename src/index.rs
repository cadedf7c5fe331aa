use std::path::Path;

use anyhow::Result;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::StoreError;
use crate::model::EMBEDDING_DIM;

/// 人脸向量索引
///
/// usearch 的内积度量返回的是距离 `1 - ip`，这里统一转换为
/// 相似度分数（越大越相似），与 faiss IndexFlatIP 的语义保持一致。
pub struct VectorIndex {
    index: Index,
}

impl VectorIndex {
    fn empty() -> Result<Self> {
        let options = IndexOptions {
            dimensions: EMBEDDING_DIM,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            ..Default::default()
        };
        let index = Index::new(&options)?;
        Ok(Self { index })
    }

    /// 打开索引文件，文件不存在时返回空索引
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let corrupt = |reason: String| StoreError::IndexCorrupt { path: path.to_path_buf(), reason };

        let s = Self::empty().map_err(|e| corrupt(e.to_string()))?;
        if !path.exists() {
            return Ok(s);
        }

        s.index
            .load(path.to_str().unwrap())
            .map_err(|e| corrupt(e.to_string()))?;
        if s.index.dimensions() != EMBEDDING_DIM {
            return Err(corrupt(format!("维度不符: {} != {}", s.index.dimensions(), EMBEDDING_DIM)));
        }
        Ok(s)
    }

    /// 添加一条向量，id 的唯一性由调用方保证
    pub fn add(&self, id: u64, embedding: &[f32]) -> Result<()> {
        if self.index.size() >= self.index.capacity() {
            self.index.reserve((self.index.size() + 1).next_power_of_two().max(64))?;
        }
        self.index.add(id, embedding)?;
        Ok(())
    }

    /// 搜索最近的 k 条向量，返回 (分数, id)，按分数降序
    ///
    /// 空索引返回空列表。返回的 id 可能含有 <= 0 的哨兵值，
    /// 由调用方过滤。
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, i64)>> {
        if self.index.size() == 0 {
            return Ok(vec![]);
        }
        let matches = self.index.search(query, k)?;
        // 距离升序即分数降序，顺序无需再排
        let result = matches
            .keys
            .into_iter()
            .zip(matches.distances)
            .map(|(key, distance)| (1.0 - distance, key as i64))
            .collect();
        Ok(result)
    }

    /// 将完整索引写入文件，覆盖旧文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.index.save(path.as_ref().to_str().unwrap())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.index.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::one_hot;

    #[test]
    fn test_empty_search() -> Result<()> {
        let index = VectorIndex::open("/nonexistent/face.index")?;
        assert_eq!(index.len(), 0);
        assert!(index.search(&one_hot(0), 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_add_search() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let index = VectorIndex::open(dir.path().join("face.index"))?;
        index.add(1, &one_hot(0))?;
        index.add(2, &one_hot(1))?;

        let result = index.search(&one_hot(0), 2)?;
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].1, 1);
        assert!((result[0].0 - 1.0).abs() < 1e-5);
        assert!(result[0].0 >= result[1].0);
        Ok(())
    }

    #[test]
    fn test_search_fewer_than_k() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let index = VectorIndex::open(dir.path().join("face.index"))?;
        index.add(1, &one_hot(3))?;

        let result = index.search(&one_hot(3), 10)?;
        assert!(result.len() <= 10);
        assert!(!result.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_open_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("face.index");

        let index = VectorIndex::open(&path)?;
        for i in 0..3u64 {
            index.add(i + 1, &one_hot(i as usize))?;
        }
        let before = index.search(&one_hot(1), 3)?;
        index.save(&path)?;

        let reloaded = VectorIndex::open(&path)?;
        assert_eq!(reloaded.len(), 3);
        let after = reloaded.search(&one_hot(1), 3)?;
        assert_eq!(before.len(), after.len());
        for ((s1, id1), (s2, id2)) in before.iter().zip(&after) {
            assert_eq!(id1, id2);
            assert!((s1 - s2).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_empty_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("face.index");

        VectorIndex::open(&path)?.save(&path)?;
        let reloaded = VectorIndex::open(&path)?;
        assert!(reloaded.is_empty());
        assert!(reloaded.search(&one_hot(0), 5)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupt_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("face.index");
        std::fs::write(&path, b"not an index")?;

        match VectorIndex::open(&path) {
            Err(StoreError::IndexCorrupt { .. }) => Ok(()),
            other => panic!("expected IndexCorrupt, got {:?}", other.map(|_| ())),
        }
    }
}
