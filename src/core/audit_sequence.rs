use crate::config::pms_config::FailurePolicy;
use crate::domain::model::{Booking, BookingStatus, Folio, NewCharge, Record, Room, RoomStatus, TenantId};
use crate::domain::ports::PmsApi;
use crate::utils::error::{PmsError, Result};
use crate::utils::monitor::SystemMonitor;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 夜審要對 PMS 執行的一個動作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    PostCharge {
        folio_id: String,
        booking_id: Option<String>,
        charge: NewCharge,
    },
    SetBookingStatus {
        booking_id: String,
        from: BookingStatus,
        to: BookingStatus,
    },
    SetRoomStatus {
        room_id: String,
        from: RoomStatus,
        to: RoomStatus,
    },
    CloseDay {
        business_date: NaiveDate,
    },
}

impl AuditAction {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditAction::PostCharge { .. } => "post_charge",
            AuditAction::SetBookingStatus { .. } => "set_booking_status",
            AuditAction::SetRoomStatus { .. } => "set_room_status",
            AuditAction::CloseDay { .. } => "close_day",
        }
    }

    pub fn target(&self) -> String {
        match self {
            AuditAction::PostCharge { folio_id, .. } => folio_id.clone(),
            AuditAction::SetBookingStatus { booking_id, .. } => booking_id.clone(),
            AuditAction::SetRoomStatus { room_id, .. } => room_id.clone(),
            AuditAction::CloseDay { business_date } => business_date.to_string(),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            AuditAction::PostCharge { charge, .. } => {
                format!("{} {:.2} ({})", charge.category.as_str(), charge.amount, charge.reference)
            }
            AuditAction::SetBookingStatus { from, to, .. } => format!("{} -> {}", from, to),
            AuditAction::SetRoomStatus { from, to, .. } => format!("{} -> {}", from, to),
            AuditAction::CloseDay { business_date } => format!("close {}", business_date),
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            AuditAction::PostCharge { charge, .. } => charge.amount,
            _ => 0.0,
        }
    }
}

/// 需要人工處理、但不會中斷夜審的狀況
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditException {
    pub step: String,
    pub entity: String,
    pub entity_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPlan {
    pub actions: Vec<AuditAction>,
    pub exceptions: Vec<AuditException>,
}

/// 步驟 extract 階段讀到的資料；未使用的集合保持空白
#[derive(Debug, Clone, Default)]
pub struct AuditSnapshot {
    pub bookings: Vec<Booking>,
    pub rooms: Vec<Room>,
    pub folios: Vec<Folio>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// 步驟執行結果
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    pub actions: Vec<AuditAction>,
    pub exceptions: Vec<AuditException>,
    pub duration: Duration,
    pub attempts: u32,
    pub error: Option<String>,
}

impl StepResult {
    fn skipped(step_name: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            status: StepStatus::Skipped,
            actions: Vec::new(),
            exceptions: Vec::new(),
            duration: Duration::ZERO,
            attempts: 0,
            error: None,
        }
    }

    /// 報表用的扁平列
    pub fn action_records(&self) -> Result<Vec<Record>> {
        self.actions
            .iter()
            .map(|action| {
                Record::from_serializable(&serde_json::json!({
                    "step": self.step_name,
                    "action": action.kind(),
                    "target": action.target(),
                    "detail": action.detail(),
                    "amount": action.amount(),
                }))
            })
            .collect()
    }
}

/// 夜審執行上下文，用於在步驟間傳遞結果
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub tenant_id: TenantId,
    pub business_date: NaiveDate,
    pub execution_id: String,
    pub dry_run: bool,
    pub previous_results: Vec<StepResult>,
    pub shared_data: HashMap<String, serde_json::Value>,
    pub failures: Vec<String>,
}

impl AuditContext {
    pub fn new(tenant_id: TenantId, business_date: NaiveDate, execution_id: String) -> Self {
        Self {
            tenant_id,
            business_date,
            execution_id,
            dry_run: false,
            previous_results: Vec::new(),
            shared_data: HashMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn get_previous_result(&self) -> Option<&StepResult> {
        self.previous_results.last()
    }

    pub fn get_result_by_name(&self, name: &str) -> Option<&StepResult> {
        self.previous_results.iter().find(|r| r.step_name == name)
    }

    pub fn add_shared_data(&mut self, key: String, value: serde_json::Value) {
        self.shared_data.insert(key, value);
    }

    pub fn get_shared_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.shared_data.get(key)
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn add_result(&mut self, result: StepResult) {
        if result.status == StepStatus::Failed {
            self.failures.push(result.step_name.clone());
        }
        self.previous_results.push(result);
    }
}

/// 夜審步驟介面：extract 讀取資料、transform 規劃動作；動作由序列統一執行
#[async_trait::async_trait]
pub trait AuditStep: Send + Sync {
    async fn extract_with_context(&self, context: &AuditContext) -> Result<AuditSnapshot>;

    async fn transform_with_context(
        &self,
        snapshot: AuditSnapshot,
        context: &AuditContext,
    ) -> Result<StepPlan>;

    fn get_name(&self) -> &str;

    fn should_execute(&self, _context: &AuditContext) -> bool {
        true
    }
}

/// 夜審步驟序列，依序執行並套用失敗策略
pub struct AuditSequence {
    steps: Vec<Box<dyn AuditStep>>,
    api: Arc<dyn PmsApi>,
    policy: FailurePolicy,
    retry_attempts: u32,
    retry_delay: Duration,
    monitor: Option<SystemMonitor>,
}

impl AuditSequence {
    pub fn new(api: Arc<dyn PmsApi>) -> Self {
        Self {
            steps: Vec::new(),
            api,
            policy: FailurePolicy::Stop,
            retry_attempts: 0,
            retry_delay: Duration::ZERO,
            monitor: None,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy, retry_attempts: u32, retry_delay: Duration) -> Self {
        self.policy = policy;
        self.retry_attempts = retry_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// 啟用或禁用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    pub fn add_step(&mut self, step: Box<dyn AuditStep>) {
        self.steps.push(step);
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.get_name()).collect()
    }

    /// 執行所有步驟；回傳的 context 含各步驟結果與共享資料
    pub async fn execute_all(&self, mut context: AuditContext) -> Result<AuditContext> {
        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Night audit started");
        }

        for step in &self.steps {
            let name = step.get_name().to_string();

            if !step.should_execute(&context) {
                tracing::info!("⏭️ Skipping step: {} (condition not met)", name);
                context.add_result(StepResult::skipped(&name));
                continue;
            }

            let max_attempts = match self.policy {
                FailurePolicy::Retry => self.retry_attempts + 1,
                _ => 1,
            };

            let start_time = Instant::now();
            let mut attempt = 0;
            // 跨重試累計已實際套用的動作
            let mut applied = Vec::new();
            let outcome = loop {
                attempt += 1;
                match self.execute_step(step.as_ref(), &mut context, &mut applied).await {
                    Ok(plan) => break Ok(plan),
                    Err(e) if attempt < max_attempts => {
                        tracing::warn!(
                            "🔄 Step {} failed (attempt {}/{}): {} - retrying in {:?}",
                            name,
                            attempt,
                            max_attempts,
                            e,
                            self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    Err(e) => break Err(e),
                }
            };

            match outcome {
                Ok(plan) => {
                    let actions = if context.dry_run { plan.actions } else { applied };
                    let result = StepResult {
                        step_name: name.clone(),
                        status: StepStatus::Succeeded,
                        actions,
                        exceptions: plan.exceptions,
                        duration: start_time.elapsed(),
                        attempts: attempt,
                        error: None,
                    };

                    tracing::info!(
                        "✅ Step executed: {} (actions: {}, exceptions: {}, duration: {:?})",
                        result.step_name,
                        result.actions.len(),
                        result.exceptions.len(),
                        result.duration
                    );
                    context.add_result(result);
                }
                Err(e) => {
                    tracing::error!("❌ Step {} failed after {} applied actions: {}", name, applied.len(), e);
                    context.add_result(StepResult {
                        step_name: name.clone(),
                        status: StepStatus::Failed,
                        actions: applied,
                        exceptions: Vec::new(),
                        duration: start_time.elapsed(),
                        attempts: attempt,
                        error: Some(e.to_string()),
                    });

                    if self.policy != FailurePolicy::Continue {
                        return Err(PmsError::StepFailed {
                            step: name,
                            details: e.to_string(),
                        });
                    }
                    tracing::warn!("⚠️ Continuing despite failure of {} (configured behavior)", name);
                }
            }

            if let Some(monitor) = &self.monitor {
                monitor.log_stats(&format!("After step {}", name));
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }

        Ok(context)
    }

    /// 單一步驟：extract → transform → 套用動作（dry run 時只回傳規劃）
    async fn execute_step(
        &self,
        step: &dyn AuditStep,
        context: &mut AuditContext,
        applied: &mut Vec<AuditAction>,
    ) -> Result<StepPlan> {
        let snapshot = step.extract_with_context(context).await?;
        tracing::debug!(
            "📥 {}: {} bookings, {} rooms, {} folios",
            step.get_name(),
            snapshot.bookings.len(),
            snapshot.rooms.len(),
            snapshot.folios.len()
        );

        let plan = step.transform_with_context(snapshot, context).await?;
        tracing::debug!("🔄 {}: planned {} actions", step.get_name(), plan.actions.len());

        for exception in &plan.exceptions {
            tracing::warn!("⚠️ {}: {} {} - {}", exception.step, exception.entity, exception.entity_id, exception.message);
        }

        if context.dry_run {
            for action in &plan.actions {
                tracing::info!("🔍 [dry-run] {} {} {}", action.kind(), action.target(), action.detail());
            }
            return Ok(plan);
        }

        for action in &plan.actions {
            self.apply(action, context).await?;
            applied.push(action.clone());
        }

        Ok(plan)
    }

    async fn apply(&self, action: &AuditAction, context: &mut AuditContext) -> Result<()> {
        let tenant = &context.tenant_id;

        match action {
            AuditAction::PostCharge { folio_id, charge, .. } => {
                let posted = self.api.post_charge(tenant, folio_id, charge).await?;
                tracing::debug!("💳 Posted {} to folio {} as {}", charge.reference, folio_id, posted.id);
            }
            AuditAction::SetBookingStatus { booking_id, to, .. } => {
                self.api.update_booking_status(tenant, booking_id, *to).await?;
            }
            AuditAction::SetRoomStatus { room_id, to, .. } => {
                self.api.update_room_status(tenant, room_id, *to).await?;
            }
            AuditAction::CloseDay { business_date } => {
                let next = self.api.close_business_day(tenant, *business_date).await?;
                tracing::info!("📅 Business day {} closed, next business date {}", business_date, next);
                context.add_shared_data(
                    "next_business_date".to_string(),
                    serde_json::Value::String(next.to_string()),
                );
            }
        }

        Ok(())
    }

    /// 獲取執行摘要
    pub fn get_execution_summary(results: &[StepResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let count = |status: StepStatus| results.iter().filter(|r| r.status == status).count();
        let total_actions: usize = results.iter().map(|r| r.actions.len()).sum();
        let total_exceptions: usize = results.iter().map(|r| r.exceptions.len()).sum();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let posted_amount: f64 = results
            .iter()
            .flat_map(|r| r.actions.iter())
            .map(|a| a.amount())
            .sum();

        summary.insert("total_steps".to_string(), results.len().into());
        summary.insert("succeeded_steps".to_string(), count(StepStatus::Succeeded).into());
        summary.insert("failed_steps".to_string(), count(StepStatus::Failed).into());
        summary.insert("skipped_steps".to_string(), count(StepStatus::Skipped).into());
        summary.insert("total_actions".to_string(), total_actions.into());
        summary.insert("total_exceptions".to_string(), total_exceptions.into());
        summary.insert("total_duration_ms".to_string(), (total_duration.as_millis() as u64).into());
        summary.insert(
            "posted_amount".to_string(),
            crate::domain::model::round_money(posted_amount).into(),
        );

        let names: Vec<serde_json::Value> = results
            .iter()
            .filter(|r| r.status == StepStatus::Succeeded)
            .map(|r| serde_json::Value::String(r.step_name.clone()))
            .collect();
        summary.insert("executed_steps".to_string(), serde_json::Value::Array(names));

        summary
    }
}
