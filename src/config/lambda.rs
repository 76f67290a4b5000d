use crate::config::pms_config::PmsConfig;
use crate::utils::error::{PmsError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_path, Validate};
use std::env;

/// Lambda 執行時的設定：PMS 設定檔位置與報表輸出的 S3 位置
#[derive(Debug, Clone)]
pub struct LambdaConfig {
    pub config_path: String,
    pub s3_bucket: String,
    pub s3_prefix: String,
    pub s3_region: String,
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: env::var("PMS_OPS_CONFIG").unwrap_or_else(|_| "pms-ops.toml".to_string()),
            s3_bucket: env::var("S3_BUCKET").map_err(|_| PmsError::MissingConfigError {
                field: "S3_BUCKET".to_string(),
            })?,
            s3_prefix: env::var("S3_PREFIX").unwrap_or_else(|_| "pms-ops".to_string()),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "ap-southeast-2".to_string()),
        })
    }

    pub fn load_pms_config(&self) -> Result<PmsConfig> {
        PmsConfig::from_file(&self.config_path)
    }
}

impl Validate for LambdaConfig {
    fn validate(&self) -> Result<()> {
        validate_path("config_path", &self.config_path)?;
        validate_s3_bucket_name("s3_bucket", &self.s3_bucket)?;
        validate_aws_region("s3_region", &self.s3_region)?;

        tracing::info!("✅ Lambda configuration validation passed");
        Ok(())
    }
}

fn validate_s3_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    let invalid = |reason: &str| PmsError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: bucket_name.to_string(),
        reason: reason.to_string(),
    };

    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(invalid("S3 bucket name must be between 3 and 63 characters"));
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            "S3 bucket name can only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        return Err(invalid("S3 bucket name cannot start or end with a hyphen"));
    }

    Ok(())
}

fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    validate_non_empty_string(field_name, region)?;

    if !region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(PmsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "AWS region can only contain lowercase letters, numbers, and hyphens".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_and_region_rules() {
        assert!(validate_s3_bucket_name("s3_bucket", "pms-reports").is_ok());
        assert!(validate_s3_bucket_name("s3_bucket", "PMS").is_err());
        assert!(validate_s3_bucket_name("s3_bucket", "-reports").is_err());
        assert!(validate_aws_region("s3_region", "ap-southeast-2").is_ok());
        assert!(validate_aws_region("s3_region", "AP_SOUTH").is_err());
    }
}
