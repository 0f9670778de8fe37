pub mod app_config;
pub mod categories;
pub mod config;
pub mod dates;
pub mod merge;
pub mod products;

pub use app_config::AppConfig;
pub use categories::{load_categories, parse_categories};
pub use config::{load_app_config, load_app_config_from_env};
pub use dates::{date_key, today_key};
pub use merge::{
    apply_to_entries, merge, normalize_color, MergeContext, MergePlan, SkipReason, SkippedSku,
    SkuUpdate, WriteOp,
};
pub use products::{
    coerce_decimal, Category, CategoryLevel, FreshSku, ItemInfo, PricePoint, ProductDocument,
    ProductRecord, SkuDetail, SkuEntry,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read categories file {path}: {source}")]
    CategoriesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse categories file: {0}")]
    CategoriesFileParse(#[from] serde_json::Error),
}
