use crate::core::aggregations::RateThresholds;
use crate::domain::model::TenantId;
use crate::utils::error::{PmsError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const AUDIT_STEPS: [&str; 4] = ["no_shows", "room_charges", "room_reconciliation", "close_day"];

pub const VIEW_NAMES: [&str; 7] = [
    "daily_occupancy",
    "channel_revenue",
    "guest_stats",
    "housekeeping_board",
    "folio_aging",
    "folio_aging_totals",
    "rate_recommendations",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmsConfig {
    pub tenants: Vec<TenantConfig>,
    pub api: ApiConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Stop,
    Continue,
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    pub steps: Option<Vec<String>>,
    pub tax_rate: Option<f64>,
    pub no_show_fee_percent: Option<f64>,
    pub on_step_failure: Option<FailurePolicy>,
    pub step_retry_attempts: Option<u32>,
    pub step_retry_delay_seconds: Option<u64>,
    pub report_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    pub backend: Option<String>, // "memory" or "redis"
    pub url: Option<String>,
    pub key_prefix: Option<String>,
    pub default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ViewsConfig {
    pub enabled: Option<Vec<String>>,
    pub days_back: Option<i64>,
    pub days_forward: Option<i64>,
    pub output_path: Option<String>,
    pub output_formats: Option<Vec<String>>,
    pub top_guests: Option<usize>,
    pub view_ttl_seconds: Option<u64>,
    pub rate_thresholds: Option<RateThresholds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

impl PmsConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PmsError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| PmsError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PMS_API_TOKEN})；未設定的變數原樣保留
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PmsError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(PmsError::MissingConfigError {
                field: "tenants".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for tenant in &self.tenants {
            validation::validate_identifier("tenants.id", &tenant.id)?;
            if !seen.insert(tenant.id.as_str()) {
                return Err(PmsError::ConfigValidationError {
                    field: "tenants.id".to_string(),
                    message: format!("Tenant '{}' is listed more than once", tenant.id),
                });
            }
        }

        validation::validate_url("api.base_url", &self.api.base_url)?;

        if let Some(token) = &self.api.token {
            if token.contains("${") {
                return Err(PmsError::MissingConfigError {
                    field: format!("api.token (unresolved {})", token),
                });
            }
        }

        if let Some(steps) = &self.audit.steps {
            validation::validate_allowed_values("audit.steps", steps, &AUDIT_STEPS)?;
            // 關帳必須是最後一步
            if let Some(pos) = steps.iter().position(|s| s == "close_day") {
                if pos + 1 != steps.len() {
                    return Err(PmsError::ConfigValidationError {
                        field: "audit.steps".to_string(),
                        message: "close_day must be the last audit step".to_string(),
                    });
                }
            }
        }

        validation::validate_range("audit.tax_rate", self.tax_rate(), 0.0, 1.0)?;
        validation::validate_range("audit.no_show_fee_percent", self.no_show_fee_percent(), 0.0, 100.0)?;
        validation::validate_path("audit.report_path", self.report_path())?;

        match self.cache_backend() {
            "memory" => {}
            "redis" => {
                let url = validation::validate_required_field("cache.url", &self.cache.url)?;
                validation::validate_redis_url("cache.url", url)?;
            }
            other => {
                return Err(PmsError::InvalidConfigValueError {
                    field: "cache.backend".to_string(),
                    value: other.to_string(),
                    reason: "Supported backends: memory, redis".to_string(),
                });
            }
        }

        validation::validate_allowed_values("views.enabled", &self.enabled_views(), &VIEW_NAMES)?;
        validation::validate_allowed_values("views.output_formats", &self.view_formats(), &["json", "csv"])?;
        validation::validate_path("views.output_path", self.views_output_path())?;
        validation::validate_positive_number("views.top_guests", self.top_guests(), 1)?;

        Ok(())
    }

    /// 啟用中的 tenant
    pub fn active_tenants(&self) -> Vec<TenantId> {
        self.tenants
            .iter()
            .filter(|t| t.enabled.unwrap_or(true))
            .map(|t| TenantId::new(t.id.clone()))
            .collect()
    }

    /// 依 `--tenant` 篩選啟用中的 tenant；未設定或已停用的 tenant 視為錯誤
    pub fn select_tenants(&self, filter: Option<&str>) -> Result<Vec<TenantId>> {
        let active = self.active_tenants();

        match filter {
            Some(id) => {
                let tenant = TenantId::new(id);
                if !active.contains(&tenant) {
                    return Err(PmsError::InvalidConfigValueError {
                        field: "tenant".to_string(),
                        value: id.to_string(),
                        reason: "Tenant is not configured or is disabled".to_string(),
                    });
                }
                Ok(vec![tenant])
            }
            None => Ok(active),
        }
    }

    pub fn audit_steps(&self) -> Vec<String> {
        self.audit
            .steps
            .clone()
            .unwrap_or_else(|| AUDIT_STEPS.iter().map(|s| s.to_string()).collect())
    }

    pub fn tax_rate(&self) -> f64 {
        self.audit.tax_rate.unwrap_or(0.0)
    }

    pub fn no_show_fee_percent(&self) -> f64 {
        self.audit.no_show_fee_percent.unwrap_or(100.0)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.audit.on_step_failure.unwrap_or_default()
    }

    pub fn step_retry_attempts(&self) -> u32 {
        self.audit.step_retry_attempts.unwrap_or(2)
    }

    pub fn step_retry_delay(&self) -> Duration {
        Duration::from_secs(self.audit.step_retry_delay_seconds.unwrap_or(5))
    }

    pub fn report_path(&self) -> &str {
        self.audit.report_path.as_deref().unwrap_or("./output")
    }

    pub fn cache_backend(&self) -> &str {
        self.cache.backend.as_deref().unwrap_or("memory")
    }

    pub fn cache_prefix(&self) -> &str {
        self.cache.key_prefix.as_deref().unwrap_or("pms")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_seconds.unwrap_or(300))
    }

    pub fn enabled_views(&self) -> Vec<String> {
        self.views
            .enabled
            .clone()
            .unwrap_or_else(|| VIEW_NAMES.iter().map(|s| s.to_string()).collect())
    }

    pub fn view_formats(&self) -> Vec<String> {
        self.views
            .output_formats
            .clone()
            .unwrap_or_else(|| vec!["json".to_string(), "csv".to_string()])
    }

    pub fn views_output_path(&self) -> &str {
        self.views.output_path.as_deref().unwrap_or("./output")
    }

    pub fn days_back(&self) -> i64 {
        self.views.days_back.unwrap_or(30)
    }

    pub fn days_forward(&self) -> i64 {
        self.views.days_forward.unwrap_or(60)
    }

    pub fn top_guests(&self) -> usize {
        self.views.top_guests.unwrap_or(20)
    }

    pub fn view_ttl(&self) -> Duration {
        Duration::from_secs(self.views.view_ttl_seconds.unwrap_or(3600))
    }

    pub fn rate_thresholds(&self) -> RateThresholds {
        self.views.rate_thresholds.clone().unwrap_or_default()
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(30))
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.unwrap_or(2)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(500))
    }
}

impl Validate for PmsConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
