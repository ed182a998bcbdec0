// ==========================================
// 排班草案引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 规则: 默认值 ← global 覆写,未配置的键沿用默认
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::strategy_profile::CustomStrategyProfile;
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            crate::db::init_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取自定义策略配置（存储于 config_kv: custom_strategy/{strategy_id}）
    pub fn get_custom_strategy_profile(
        &self,
        strategy_id: &str,
    ) -> Result<Option<CustomStrategyProfile>, Box<dyn Error>> {
        let id = strategy_id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        let key = format!("custom_strategy/{}", id);
        let raw = match self.get_config_value(&key)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let profile: CustomStrategyProfile = serde_json::from_str(&raw)?;
        Ok(Some(profile))
    }

    /// 保存自定义策略配置
    pub fn save_custom_strategy_profile(
        &self,
        profile: &CustomStrategyProfile,
    ) -> Result<(), Box<dyn Error>> {
        let id = profile.strategy_id.trim();
        if id.is_empty() {
            return Err("自定义策略ID不能为空".into());
        }
        let raw = serde_json::to_string(profile)?;
        self.set_global_config_value(&format!("custom_strategy/{}", id), &raw)
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 发布草案时记录配置快照，保证结果可复现
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 解析数值型配置（格式错误时告警并沿用默认值）
    fn read_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(Some(v)),
                Err(_) => {
                    warn!(key, value = %raw, "配置值格式错误，沿用默认值");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// 加载引擎配置（默认值 + global 覆写）
    pub fn load_engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let mut cfg = EngineConfig::default();

        // ===== 约束 =====
        if let Some(v) = self.read_parsed::<f64>(config_keys::WEEKLY_HOUR_TARGET)? {
            cfg.constraints.weekly_hour_target = v;
        }
        if let Some(v) = self.read_parsed::<f64>(config_keys::MIN_REST_HOURS)? {
            cfg.constraints.min_rest_hours = v;
        }
        if let Some(v) = self.read_parsed::<u32>(config_keys::MAX_CONSECUTIVE_DAYS)? {
            cfg.constraints.max_consecutive_days = v;
        }
        if let Some(v) = self.read_parsed::<f64>(config_keys::LABOR_COST_CEILING)? {
            cfg.constraints.labor_cost_ceiling = if v > 0.0 { Some(v) } else { None };
        }
        if let Some(v) = self.read_parsed::<u32>(config_keys::DISTRIBUTION_TOLERANCE)? {
            cfg.constraints.distribution_tolerance = v;
        }
        if let Some(raw) = self.get_config_value(config_keys::PENALTY_WEIGHTS)? {
            match serde_json::from_str(&raw) {
                Ok(weights) => cfg.constraints.penalty_weights = weights,
                Err(e) => warn!(error = %e, "惩罚权重配置解析失败，沿用默认值"),
            }
        }

        // ===== 排序 =====
        if let Some(v) = self.read_parsed::<u64>(config_keys::ORACLE_TIMEOUT_MS)? {
            cfg.ranker.oracle_timeout_ms = v;
        }
        if let Some(v) = self.read_parsed::<f64>(config_keys::ORACLE_WEIGHT)? {
            cfg.ranker.oracle_weight = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.read_parsed::<bool>(config_keys::PARALLEL_GROUPS)? {
            cfg.ranker.parallel_groups = v;
        }

        // ===== 同步 / 协同 / 发布 =====
        if let Some(v) = self.read_parsed::<u64>(config_keys::SYNC_QUIET_WINDOW_MS)? {
            cfg.sync.quiet_window_ms = v;
        }
        if let Some(v) = self.read_parsed::<u64>(config_keys::LOCK_TIMEOUT_MS)? {
            cfg.collaboration.lock_timeout_ms = v;
        }
        if let Some(v) = self.read_parsed::<u64>(config_keys::CONFLICT_WINDOW_MS)? {
            cfg.collaboration.conflict_window_ms = v;
        }
        if let Some(v) = self.read_parsed::<u64>(config_keys::NOTIFICATION_TIMEOUT_MS)? {
            cfg.publish.notification_timeout_ms = v;
        }

        debug!(?cfg, "引擎配置加载完成");
        Ok(cfg)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const WEEKLY_HOUR_TARGET: &str = "constraint/weekly_hour_target";
    pub const MIN_REST_HOURS: &str = "constraint/min_rest_hours";
    pub const MAX_CONSECUTIVE_DAYS: &str = "constraint/max_consecutive_days";
    pub const LABOR_COST_CEILING: &str = "constraint/labor_cost_ceiling";
    pub const DISTRIBUTION_TOLERANCE: &str = "constraint/distribution_tolerance";
    pub const PENALTY_WEIGHTS: &str = "constraint/penalty_weights";
    pub const ORACLE_TIMEOUT_MS: &str = "ranker/oracle_timeout_ms";
    pub const ORACLE_WEIGHT: &str = "ranker/oracle_weight";
    pub const PARALLEL_GROUPS: &str = "ranker/parallel_groups";
    pub const SYNC_QUIET_WINDOW_MS: &str = "sync/quiet_window_ms";
    pub const LOCK_TIMEOUT_MS: &str = "collab/lock_timeout_ms";
    pub const CONFLICT_WINDOW_MS: &str = "collab/conflict_window_ms";
    pub const NOTIFICATION_TIMEOUT_MS: &str = "publish/notification_timeout_ms";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::strategy_profile::CustomStrategyParameters;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let cfg = manager().load_engine_config().unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_overrides_applied() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::WEEKLY_HOUR_TARGET, "32").unwrap();
        mgr.set_global_config_value(config_keys::LABOR_COST_CEILING, "5000").unwrap();
        mgr.set_global_config_value(config_keys::MIN_REST_HOURS, "abc").unwrap();

        let cfg = mgr.load_engine_config().unwrap();
        assert_eq!(cfg.constraints.weekly_hour_target, 32.0);
        assert_eq!(cfg.constraints.labor_cost_ceiling, Some(5000.0));
        // 格式错误沿用默认
        assert_eq!(cfg.constraints.min_rest_hours, 10.0);
    }

    #[test]
    fn test_custom_strategy_round() {
        let mgr = manager();
        let profile = CustomStrategyProfile {
            strategy_id: "weekend_saver".to_string(),
            title: "周末省钱".to_string(),
            description: None,
            base_strategy: "cost_optimized".to_string(),
            parameters: CustomStrategyParameters {
                cost_weight: Some(0.8),
                ..Default::default()
            },
        };
        mgr.save_custom_strategy_profile(&profile).unwrap();

        let loaded = mgr.get_custom_strategy_profile("weekend_saver").unwrap().unwrap();
        assert_eq!(loaded.base_strategy, "cost_optimized");
        assert_eq!(loaded.parameters.cost_weight, Some(0.8));
        assert!(mgr.get_custom_strategy_profile(" ").unwrap().is_none());

        let snapshot = mgr.get_config_snapshot().unwrap();
        assert!(snapshot.contains("custom_strategy/weekend_saver"));
    }
}
