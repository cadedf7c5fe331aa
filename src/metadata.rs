use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::StoreError;

/// id 到源文件路径的映射
///
/// 同一个文件可以产出多张人脸，因此多个 id 可能指向同一路径。
/// 去重以"路径是否出现在任意 value 中"为准，id 分配以最大 key 为准。
#[derive(Debug, Default)]
pub struct MetadataStore {
    records: BTreeMap<u64, String>,
}

impl MetadataStore {
    /// 从文件加载，文件不存在时返回空映射
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let corrupt = |reason: String| StoreError::MetadataCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path)?;
        // JSON 对象的 key 是十进制字符串形式的 id
        let raw: HashMap<String, String> =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| corrupt(e.to_string()))?;

        let mut records = BTreeMap::new();
        for (key, value) in raw {
            let id = key.parse::<u64>().map_err(|_| corrupt(format!("非法的 id: {key}")))?;
            records.insert(id, value);
        }
        Ok(Self { records })
    }

    /// 全量重写到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let raw: BTreeMap<String, &String> =
            self.records.iter().map(|(id, path)| (id.to_string(), path)).collect();
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &raw).map_err(|e| StoreError::Io(e.into()))?;
        writer.flush()?;
        Ok(())
    }

    /// 当前已分配的最大 id，空映射为 0
    pub fn max_id(&self) -> u64 {
        self.records.keys().next_back().copied().unwrap_or(0)
    }

    /// 已索引的所有源文件路径
    pub fn existing_paths(&self) -> HashSet<String> {
        self.records.values().cloned().collect()
    }

    pub fn record(&mut self, id: u64, path: impl Into<String>) {
        self.records.insert(id, path.into());
    }

    pub fn path_of(&self, id: u64) -> Option<&str> {
        self.records.get(&id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
