use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::info;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{MediaOptions, ModelOptions, Opts, SearchOptions};
use crate::extract::EmbeddingExtractor;
use crate::model::HttpFaceModel;
use crate::query::QueryEngine;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub media: MediaOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 查询用的图片或视频路径
    pub media_path: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let model = Arc::new(HttpFaceModel::new(
            &self.model.model_endpoint,
            Duration::from_secs(self.model.model_timeout),
        ));
        let extractor = EmbeddingExtractor::new(model, self.media.clone());

        let embeddings = block_in_place(|| extractor.extract(&self.media_path))?;
        if embeddings.is_empty() {
            info!("查询媒体中未检测到人脸: {}", self.media_path.display());
            return print_result(&[], self);
        }
        info!("查询人脸数量: {}", embeddings.len());

        let engine = QueryEngine::open(&opts.conf_dir)?;
        let mut result = engine.query(&embeddings, self.search.top_k, self.search.min_score)?;

        // 各查询向量的结果只是拼接，展示前统一排序
        result.sort_by(|a, b| b.0.total_cmp(&a.0));
        result.truncate(self.search.count);
        print_result(&result, self)
    }
}

fn print_result(result: &[(f32, String)], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for (score, path) in result {
                println!("{:.2}\t{}", score, path);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}
