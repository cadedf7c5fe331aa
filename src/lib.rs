pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod frame;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod model;
pub mod query;
pub mod utils;
pub mod video;
pub mod writer;

pub use config::Opts;
pub use error::StoreError;
pub use model::{Detection, EMBEDDING_DIM, Embedding, FaceModel};
