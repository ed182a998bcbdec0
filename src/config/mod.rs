// ==========================================
// 排班草案引擎 - 配置层
// ==========================================
// 职责: 系统配置管理,支持默认值 + global 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod engine_config;
pub mod strategy_profile;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use engine_config::{
    CollaborationConfig, ConstraintConfig, EngineConfig, PublishConfig, RankerConfig,
    ReconnectPolicy, SyncConfig,
};
pub use strategy_profile::{CustomStrategyParameters, CustomStrategyProfile};

/// 默认数据库路径
///
/// 优先读取环境变量 SHIFT_DRAFT_DB_PATH，否则落在用户数据目录下。
pub fn default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SHIFT_DRAFT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./shift_draft.db");
    if let Some(data_dir) = dirs::data_dir() {
        let app_dir = data_dir.join("shift-draft-engine");
        if std::fs::create_dir_all(&app_dir).is_ok() {
            path = app_dir.join("shift_draft.db");
        }
    }

    path.to_string_lossy().to_string()
}
