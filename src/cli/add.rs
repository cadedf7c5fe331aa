use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::ProgressBar;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{MediaOptions, ModelOptions, Opts};
use crate::extract::EmbeddingExtractor;
use crate::ingest::Ingestor;
use crate::model::HttpFaceModel;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub media: MediaOptions,
    /// 待索引的文件或目录，目录会被递归展开
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// 累积到该数量的文件后落盘一次
    #[arg(short, long, value_name = "N", default_value_t = 100)]
    pub batch_size: usize,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let model = Arc::new(HttpFaceModel::new(
            &self.model.model_endpoint,
            Duration::from_secs(self.model.model_timeout),
        ));
        let extractor = EmbeddingExtractor::new(model, self.media.clone());
        let ingestor = Ingestor::new(
            opts.conf_dir.clone(),
            extractor,
            self.media.max_file_bytes,
            self.batch_size,
        );

        let pb = ProgressBar::no_length().with_style(pb_style());

        block_in_place(|| -> anyhow::Result<()> {
            let mut progress = ingestor.run(&self.paths)?;
            pb.set_length(progress.total() as u64);
            for item in &mut progress {
                let (processed, _) = item?;
                pb.set_position(processed as u64);
            }
            Ok(())
        })?;

        pb.finish_with_message("索引完成");
        Ok(())
    }
}
