use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

// 全局容量预算，所有 genus 共享
pub const MAX_TOTAL_CAPACITY: u32 = 90;
// 新注册表分配的第一个 id，id 永不复用
pub const GENUS_ID_ORIGIN: u64 = 1;
// 进程没有 genus 时查询调用返回的哨兵值
pub const NO_GENUS: i64 = -1;

pub const INIT_PID: u64 = 1;
pub const INIT_IMAGE: &str = "init";

pub const CONFIG_ENV_PREFIX: &str = "GENUS";
pub const LOG_LEVEL_ENV: &str = "GENUS_LOG";

/// 注册表配置
///
/// 加载顺序: 内置默认值 -> 可选的 TOML 文件 -> `GENUS_*` 环境变量。
/// 预算在注册表创建后固定不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_total_budget")]
    pub total_budget: u32,
    #[serde(default = "default_id_origin")]
    pub id_origin: u64,
}

fn default_total_budget() -> u32 {
    MAX_TOTAL_CAPACITY
}

fn default_id_origin() -> u64 {
    GENUS_ID_ORIGIN
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            total_budget: MAX_TOTAL_CAPACITY,
            id_origin: GENUS_ID_ORIGIN,
        }
    }
}

impl RegistryConfig {
    /// 从默认值和环境变量加载
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// 从可选配置文件加载，环境变量优先级最高
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder()
            .set_default("total_budget", i64::from(MAX_TOTAL_CAPACITY))?
            .set_default("id_origin", GENUS_ID_ORIGIN as i64)?;

        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix(CONFIG_ENV_PREFIX).try_parsing(true))
            .build()?;

        let loaded: RegistryConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_budget == 0 {
            return Err(ConfigError::InvalidBudget {
                value: self.total_budget,
            });
        }
        if i64::try_from(self.id_origin).is_err() {
            return Err(ConfigError::InvalidIdOrigin {
                value: self.id_origin,
            });
        }
        Ok(())
    }
}
