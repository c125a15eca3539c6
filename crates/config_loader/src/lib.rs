//! # Config Loader
//!
//! 读取同步引擎配置：按扩展名选择 TOML/JSON，反序列化后统一校验。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("sync.toml"))?;
//! println!("strategy: {}", config.default_strategy);
//! # Ok::<(), contracts::SyncError>(())
//! ```

mod parser;
mod validator;

pub use contracts::SyncEngineConfig;
pub use parser::ConfigFormat;

use contracts::SyncError;
use std::path::Path;
use tracing::debug;

/// 配置加载入口
pub struct ConfigLoader;

impl ConfigLoader {
    /// # Errors
    /// 扩展名无法识别、读取失败、解析失败或校验失败。
    pub fn load_from_path(path: &Path) -> Result<SyncEngineConfig, SyncError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::load_from_str(&content, format)?;
        debug!(path = %path.display(), %format, strategy = %config.default_strategy, "config loaded");
        Ok(config)
    }

    /// 解析并校验
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SyncEngineConfig, SyncError> {
        let config = format.parse(content)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// 校验已构造的配置（例如预设加覆盖项）
    pub fn validate(config: &SyncEngineConfig) -> Result<(), SyncError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &SyncEngineConfig) -> Result<String, SyncError> {
        ConfigFormat::Toml.render(config)
    }

    pub fn to_json(config: &SyncEngineConfig) -> Result<String, SyncError> {
        ConfigFormat::Json.render(config)
    }
}
