//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (阈值与平滑系数在 [0, 1]，尺寸与间隔为正) 由 `validator` 派生规则给出
//! - drift_calculation_window <= max_offset_history
//! - exchange_timeout_ms <= ntp_sync_interval_ms
//! - correlation_window_ms <= max_event_age_ms

use std::collections::BTreeMap;

use contracts::{SyncEngineConfig, SyncError};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// 校验 SyncEngineConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &SyncEngineConfig) -> Result<(), SyncError> {
    validate_ranges(config)?;
    validate_hardware(config)?;
    validate_software(config)?;
    validate_event(config)?;
    Ok(())
}

/// 字段范围校验 (派生规则)
fn validate_ranges(config: &SyncEngineConfig) -> Result<(), SyncError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_error("", &errors).unwrap_or_else(|| {
                ("config".to_string(), "invalid configuration".to_string())
            });
            Err(SyncError::config_validation(field, message))
        }
    }
}

/// 按字段路径排序后取第一个错误，保证报错顺序稳定
fn first_error(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let sorted: BTreeMap<_, _> = errors.errors().iter().collect();
    for (field, kind) in sorted {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|e| (path, describe(e))),
            ValidationErrorsKind::Struct(nested) => first_error(&path, nested),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, nested)| first_error(&format!("{path}[{idx}]"), nested)),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    let param = |name: &str| error.params.get(name).map(|v| v.to_string());
    match (param("min"), param("max"), param("value")) {
        (Some(min), Some(max), Some(value)) => {
            format!("must be between {min} and {max}, got {value}")
        }
        (Some(min), None, Some(value)) => format!("must be >= {min}, got {value}"),
        (None, Some(max), Some(value)) => format!("must be <= {max}, got {value}"),
        _ => format!("failed '{}' check", error.code),
    }
}

/// 校验硬件时间戳配置
fn validate_hardware(config: &SyncEngineConfig) -> Result<(), SyncError> {
    let hardware = &config.hardware;
    if hardware.drift_calculation_window > hardware.max_offset_history {
        return Err(SyncError::config_validation(
            "hardware.drift_calculation_window",
            format!(
                "drift_calculation_window ({}) must be <= max_offset_history ({})",
                hardware.drift_calculation_window, hardware.max_offset_history
            ),
        ));
    }
    Ok(())
}

/// 校验软件时钟同步配置
fn validate_software(config: &SyncEngineConfig) -> Result<(), SyncError> {
    let software = &config.software;
    if software.exchange_timeout_ms > software.ntp_sync_interval_ms {
        return Err(SyncError::config_validation(
            "software.exchange_timeout_ms",
            format!(
                "exchange_timeout_ms ({}) must be <= ntp_sync_interval_ms ({})",
                software.exchange_timeout_ms, software.ntp_sync_interval_ms
            ),
        ));
    }
    Ok(())
}

/// 校验事件关联配置
fn validate_event(config: &SyncEngineConfig) -> Result<(), SyncError> {
    let event = &config.event;
    if event.correlation_window_ms > event.max_event_age_ms {
        return Err(SyncError::config_validation(
            "event.correlation_window_ms",
            format!(
                "correlation_window_ms ({}) must be <= max_event_age_ms ({})",
                event.correlation_window_ms, event.max_event_age_ms
            ),
        ));
    }
    Ok(())
}
