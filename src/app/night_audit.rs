use crate::config::pms_config::{FailurePolicy, PmsConfig};
use crate::core::audit_sequence::{AuditContext, AuditException, AuditSequence, StepResult, StepStatus};
use crate::core::audit_steps::{build_step, AuditSettings};
use crate::domain::model::TenantId;
use crate::domain::ports::{PmsApi, Storage};
use crate::utils::error::{PmsError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use zip::write::{FileOptions, ZipWriter};

/// 單次夜審的執行選項
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub business_date: Option<NaiveDate>,
    pub dry_run: bool,
    pub only: Vec<String>,
    pub skip: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub step_name: String,
    pub status: StepStatus,
    pub actions: usize,
    pub exceptions: usize,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl From<&StepResult> for StepSummary {
    fn from(result: &StepResult) -> Self {
        Self {
            step_name: result.step_name.clone(),
            status: result.status,
            actions: result.actions.len(),
            exceptions: result.exceptions.len(),
            attempts: result.attempts,
            duration_ms: result.duration.as_millis() as u64,
            error: result.error.clone(),
        }
    }
}

/// 一個 tenant 的夜審結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub tenant_id: TenantId,
    pub business_date: NaiveDate,
    pub execution_id: String,
    pub dry_run: bool,
    pub next_business_date: Option<NaiveDate>,
    pub steps: Vec<StepSummary>,
    pub summary: HashMap<String, serde_json::Value>,
    pub report_path: String,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Failed)
    }

    pub fn day_closed(&self) -> bool {
        self.next_business_date.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ActionRow<'a> {
    step: &'a str,
    action: &'static str,
    target: String,
    detail: String,
    amount: f64,
}

/// 夜審執行器：決定營業日、組裝步驟、執行並寫出報表壓縮檔
pub struct NightAuditRunner<S: Storage> {
    api: Arc<dyn PmsApi>,
    storage: S,
    steps: Vec<String>,
    settings: AuditSettings,
    policy: FailurePolicy,
    retry_attempts: u32,
    retry_delay: Duration,
    monitor_enabled: bool,
}

impl<S: Storage> NightAuditRunner<S> {
    pub fn new(api: Arc<dyn PmsApi>, storage: S, config: &PmsConfig) -> Self {
        Self {
            api,
            storage,
            steps: config.audit_steps(),
            settings: AuditSettings {
                tax_rate: config.tax_rate(),
                no_show_fee_percent: config.no_show_fee_percent(),
            },
            policy: config.failure_policy(),
            retry_attempts: config.step_retry_attempts(),
            retry_delay: config.step_retry_delay(),
            monitor_enabled: config.monitoring_enabled(),
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor_enabled = self.monitor_enabled || enabled;
        self
    }

    /// 套用 --only / --skip 後實際要執行的步驟
    pub fn selected_steps(&self, options: &AuditOptions) -> Result<Vec<String>> {
        for name in options.only.iter().chain(options.skip.iter()) {
            if !self.steps.contains(name) {
                return Err(PmsError::InvalidConfigValueError {
                    field: "steps".to_string(),
                    value: name.clone(),
                    reason: format!("Step is not configured (configured: {})", self.steps.join(", ")),
                });
            }
        }

        Ok(self
            .steps
            .iter()
            .filter(|s| options.only.is_empty() || options.only.contains(*s))
            .filter(|s| !options.skip.contains(*s))
            .cloned()
            .collect())
    }

    /// 依序對每個 tenant 執行夜審；單一 tenant 失敗不影響其他 tenant
    pub async fn run_all(&self, tenants: &[TenantId], options: &AuditOptions) -> Vec<(TenantId, Result<AuditReport>)> {
        let mut outcomes = Vec::with_capacity(tenants.len());

        for tenant in tenants {
            let outcome = self.run_tenant(tenant, options).await;
            if let Err(e) = &outcome {
                tracing::error!("❌ Night audit failed for tenant {}: {}", tenant, e);
            }
            outcomes.push((tenant.clone(), outcome));
        }

        outcomes
    }

    pub async fn run_tenant(&self, tenant: &TenantId, options: &AuditOptions) -> Result<AuditReport> {
        let business_date = self.resolve_business_date(tenant, options.business_date).await?;
        let execution_id = format!("audit_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"));

        tracing::info!(
            "🌙 Night audit for tenant {} (business date {}, execution {}{})",
            tenant,
            business_date,
            execution_id,
            if options.dry_run { ", dry run" } else { "" }
        );

        let mut sequence = AuditSequence::new(self.api.clone())
            .with_failure_policy(self.policy, self.retry_attempts, self.retry_delay)
            .with_monitoring(self.monitor_enabled);
        for name in self.selected_steps(options)? {
            sequence.add_step(build_step(&name, self.api.clone(), self.settings)?);
        }
        tracing::debug!("📋 Steps: {}", sequence.step_names().join(" → "));

        let context = AuditContext::new(tenant.clone(), business_date, execution_id.clone()).with_dry_run(options.dry_run);
        let context = sequence.execute_all(context).await?;

        let next_business_date = context
            .get_shared_data("next_business_date")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<NaiveDate>().ok());

        let report_path = format!("night_audit/{}/{}_{}.zip", tenant, business_date, execution_id);
        let report = AuditReport {
            tenant_id: tenant.clone(),
            business_date,
            execution_id,
            dry_run: options.dry_run,
            next_business_date,
            steps: context.previous_results.iter().map(StepSummary::from).collect(),
            summary: AuditSequence::get_execution_summary(&context.previous_results),
            report_path,
        };

        let archive = build_archive(&report, &context.previous_results)?;
        self.storage.write_file(&report.report_path, &archive).await?;

        tracing::info!(
            "✅ Night audit finished for {}: {} actions, {} exceptions, report {}",
            tenant,
            report.summary.get("total_actions").cloned().unwrap_or_default(),
            report.summary.get("total_exceptions").cloned().unwrap_or_default(),
            report.report_path
        );

        Ok(report)
    }

    async fn resolve_business_date(&self, tenant: &TenantId, requested: Option<NaiveDate>) -> Result<NaiveDate> {
        let current = self.api.business_date(tenant).await?;

        match requested {
            Some(date) if date != current => {
                tracing::warn!(
                    "⚠️ Business date override {} differs from PMS business date {} for tenant {}",
                    date,
                    current,
                    tenant
                );
                Ok(date)
            }
            Some(date) => Ok(date),
            None => Ok(current),
        }
    }
}

/// summary.json、actions.csv、exceptions.csv 打包成 zip
fn build_archive(report: &AuditReport, results: &[StepResult]) -> Result<Vec<u8>> {
    let summary_json = serde_json::to_string_pretty(report)?;
    let actions_csv = actions_csv(results)?;
    let exceptions: Vec<&AuditException> = results.iter().flat_map(|r| r.exceptions.iter()).collect();
    let exceptions_csv = to_csv(&exceptions, "step,entity,entity_id,message")?;

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file::<_, ()>("summary.json", FileOptions::default())?;
    zip.write_all(summary_json.as_bytes())?;

    zip.start_file::<_, ()>("actions.csv", FileOptions::default())?;
    zip.write_all(&actions_csv)?;

    zip.start_file::<_, ()>("exceptions.csv", FileOptions::default())?;
    zip.write_all(&exceptions_csv)?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn actions_csv(results: &[StepResult]) -> Result<Vec<u8>> {
    let rows: Vec<ActionRow> = results
        .iter()
        .flat_map(|r| {
            r.actions.iter().map(move |a| ActionRow {
                step: &r.step_name,
                action: a.kind(),
                target: a.target(),
                detail: a.detail(),
                amount: a.amount(),
            })
        })
        .collect();

    to_csv(&rows, "step,action,target,detail,amount")
}

/// 沒有資料列時只輸出標頭
fn to_csv<T: Serialize>(rows: &[T], header: &str) -> Result<Vec<u8>> {
    if rows.is_empty() {
        return Ok(format!("{}\n", header).into_bytes());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    writer.into_inner().map_err(|e| PmsError::ProcessingError {
        message: format!("Failed to finish CSV: {}", e),
    })
}
