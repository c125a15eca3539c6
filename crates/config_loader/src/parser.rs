//! 配置文件格式
//!
//! TOML 与 JSON 共用同一套 serde 定义，缺省字段取默认值。

use std::fmt;
use std::path::Path;

use contracts::{SyncEngineConfig, SyncError};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 按扩展名识别格式，大小写不敏感
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// # Errors
    /// 无扩展名或扩展名不受支持时返回 `ConfigParse`。
    pub fn from_path(path: &Path) -> Result<Self, SyncError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            SyncError::config_parse(format!(
                "cannot determine config format of {}",
                path.display()
            ))
        })?;
        Self::from_extension(ext)
            .ok_or_else(|| SyncError::config_parse(format!("unsupported config format: .{ext}")))
    }

    /// 反序列化，不做校验
    pub fn parse(self, content: &str) -> Result<SyncEngineConfig, SyncError> {
        let parsed: Result<SyncEngineConfig, BoxedError> = match self {
            Self::Toml => toml::from_str(content).map_err(Into::into),
            Self::Json => serde_json::from_str(content).map_err(Into::into),
        };
        parsed.map_err(|e| SyncError::ConfigParse {
            message: format!("{self} parse error: {e}"),
            source: Some(e),
        })
    }

    pub fn render(self, config: &SyncEngineConfig) -> Result<String, SyncError> {
        let rendered = match self {
            Self::Toml => toml::to_string_pretty(config).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
        };
        rendered.map_err(|e| SyncError::config_parse(format!("{self} serialize error: {e}")))
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        })
    }
}
