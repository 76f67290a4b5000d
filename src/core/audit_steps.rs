use crate::core::audit_sequence::{AuditAction, AuditContext, AuditException, AuditSnapshot, AuditStep, StepPlan};
use crate::domain::model::{
    open_folios_by_booking, round_money, Booking, BookingStatus, ChargeCategory, NewCharge, RoomStatus, TenantId,
};
use crate::domain::ports::PmsApi;
use crate::utils::error::{PmsError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// 夜審步驟共用的參數
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuditSettings {
    pub tax_rate: f64,
    pub no_show_fee_percent: f64,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            tax_rate: 0.0,
            no_show_fee_percent: 100.0,
        }
    }
}

pub fn room_charge_reference(booking_id: &str, date: chrono::NaiveDate) -> String {
    format!("room:{}:{}", booking_id, date)
}

pub fn tax_charge_reference(booking_id: &str, date: chrono::NaiveDate) -> String {
    format!("tax:{}:{}", booking_id, date)
}

pub fn no_show_reference(booking_id: &str) -> String {
    format!("no_show:{}", booking_id)
}

/// 依名稱建立步驟；名稱未知時回傳錯誤
pub fn build_step(name: &str, api: Arc<dyn PmsApi>, settings: AuditSettings) -> Result<Box<dyn AuditStep>> {
    let step: Box<dyn AuditStep> = match name {
        "no_shows" => Box::new(NoShowProcessing::new(api, settings)),
        "room_charges" => Box::new(RoomChargePosting::new(api, settings)),
        "room_reconciliation" => Box::new(RoomReconciliation::new(api)),
        "close_day" => Box::new(DayClose),
        other => {
            return Err(PmsError::InvalidConfigValueError {
                field: "audit.steps".to_string(),
                value: other.to_string(),
                reason: "Unknown night audit step".to_string(),
            })
        }
    };
    Ok(step)
}

fn ensure_tenant<'a, I>(tenant: &TenantId, owners: I) -> Result<()>
where
    I: IntoIterator<Item = &'a TenantId>,
{
    owners.into_iter().try_for_each(|owner| tenant.ensure_owns(owner))
}

fn exception(step: &str, entity: &str, entity_id: &str, message: impl Into<String>) -> AuditException {
    AuditException {
        step: step.to_string(),
        entity: entity.to_string(),
        entity_id: entity_id.to_string(),
        message: message.into(),
    }
}

/// 營業日前應到未到的訂房轉為 no-show，保證訂房加收 no-show 費
pub struct NoShowProcessing {
    api: Arc<dyn PmsApi>,
    settings: AuditSettings,
}

impl NoShowProcessing {
    pub fn new(api: Arc<dyn PmsApi>, settings: AuditSettings) -> Self {
        Self { api, settings }
    }
}

#[async_trait::async_trait]
impl AuditStep for NoShowProcessing {
    async fn extract_with_context(&self, context: &AuditContext) -> Result<AuditSnapshot> {
        let bookings = self.api.list_bookings(&context.tenant_id).await?;
        let folios = self.api.list_folios(&context.tenant_id).await?;
        ensure_tenant(&context.tenant_id, bookings.iter().map(|b| &b.tenant_id))?;
        ensure_tenant(&context.tenant_id, folios.iter().map(|f| &f.tenant_id))?;

        Ok(AuditSnapshot {
            bookings,
            folios,
            ..Default::default()
        })
    }

    async fn transform_with_context(&self, snapshot: AuditSnapshot, context: &AuditContext) -> Result<StepPlan> {
        Ok(plan_no_shows(&snapshot, context, &self.settings))
    }

    fn get_name(&self) -> &str {
        "no_shows"
    }
}

fn plan_no_shows(snapshot: &AuditSnapshot, context: &AuditContext, settings: &AuditSettings) -> StepPlan {
    let folios = open_folios_by_booking(&snapshot.folios);
    let mut plan = StepPlan::default();

    // 已是 no-show 但費用未過帳的保證訂房也要補收
    let due = snapshot.bookings.iter().filter(|b| {
        (b.status.is_arrival_pending() || b.status == BookingStatus::NoShow) && b.check_in <= context.business_date
    });

    for booking in due {
        let pending = booking.status.is_arrival_pending();

        // 費用先於狀態：狀態更新失敗時重跑仍會看到待處理的訂房
        if booking.is_guaranteed() && settings.no_show_fee_percent > 0.0 {
            let reference = no_show_reference(&booking.id);
            match folios.get(booking.id.as_str()) {
                Some(folio) if folio.has_reference(&reference) => {}
                Some(folio) => {
                    let amount = round_money(booking.nightly_rate() * settings.no_show_fee_percent / 100.0);
                    plan.actions.push(AuditAction::PostCharge {
                        folio_id: folio.id.clone(),
                        booking_id: Some(booking.id.clone()),
                        charge: NewCharge {
                            reference,
                            category: ChargeCategory::NoShowFee,
                            description: format!("No-show fee ({}%)", settings.no_show_fee_percent),
                            amount,
                            date: context.business_date,
                        },
                    });
                }
                None if pending => plan.exceptions.push(exception(
                    "no_shows",
                    "booking",
                    &booking.id,
                    "Guaranteed no-show has no open folio; fee not posted",
                )),
                None => {}
            }
        }

        if pending {
            plan.actions.push(AuditAction::SetBookingStatus {
                booking_id: booking.id.clone(),
                from: booking.status,
                to: BookingStatus::NoShow,
            });
        }
    }

    plan
}

/// 在住訂房過帳當晚房費（與稅）；已存在的 reference 不重複過帳
pub struct RoomChargePosting {
    api: Arc<dyn PmsApi>,
    settings: AuditSettings,
}

impl RoomChargePosting {
    pub fn new(api: Arc<dyn PmsApi>, settings: AuditSettings) -> Self {
        Self { api, settings }
    }
}

#[async_trait::async_trait]
impl AuditStep for RoomChargePosting {
    async fn extract_with_context(&self, context: &AuditContext) -> Result<AuditSnapshot> {
        let bookings = self.api.list_bookings(&context.tenant_id).await?;
        let folios = self.api.list_folios(&context.tenant_id).await?;
        ensure_tenant(&context.tenant_id, bookings.iter().map(|b| &b.tenant_id))?;
        ensure_tenant(&context.tenant_id, folios.iter().map(|f| &f.tenant_id))?;

        Ok(AuditSnapshot {
            bookings,
            folios,
            ..Default::default()
        })
    }

    async fn transform_with_context(&self, snapshot: AuditSnapshot, context: &AuditContext) -> Result<StepPlan> {
        Ok(plan_room_charges(&snapshot, context, &self.settings))
    }

    fn get_name(&self) -> &str {
        "room_charges"
    }
}

fn is_chargeable(booking: &Booking, date: chrono::NaiveDate) -> bool {
    // 超住（退房日已過仍在住）照樣收費
    booking.status.is_in_house() && booking.check_in <= date
}

fn plan_room_charges(snapshot: &AuditSnapshot, context: &AuditContext, settings: &AuditSettings) -> StepPlan {
    let date = context.business_date;
    let folios = open_folios_by_booking(&snapshot.folios);
    let mut plan = StepPlan::default();

    for booking in snapshot.bookings.iter().filter(|b| is_chargeable(b, date)) {
        if booking.check_out <= date {
            plan.exceptions.push(exception(
                "room_charges",
                "booking",
                &booking.id,
                format!("Overstay: check-out was {}", booking.check_out),
            ));
        }

        let Some(folio) = folios.get(booking.id.as_str()) else {
            plan.exceptions.push(exception(
                "room_charges",
                "booking",
                &booking.id,
                "In-house booking has no open folio",
            ));
            continue;
        };

        let rate = booking.nightly_rate();
        let room_ref = room_charge_reference(&booking.id, date);
        if !folio.has_reference(&room_ref) {
            plan.actions.push(AuditAction::PostCharge {
                folio_id: folio.id.clone(),
                booking_id: Some(booking.id.clone()),
                charge: NewCharge {
                    reference: room_ref,
                    category: ChargeCategory::Room,
                    description: format!("Room charge {}", date),
                    amount: rate,
                    date,
                },
            });
        }

        if settings.tax_rate > 0.0 {
            let tax_ref = tax_charge_reference(&booking.id, date);
            if !folio.has_reference(&tax_ref) {
                plan.actions.push(AuditAction::PostCharge {
                    folio_id: folio.id.clone(),
                    booking_id: Some(booking.id.clone()),
                    charge: NewCharge {
                        reference: tax_ref,
                        category: ChargeCategory::Tax,
                        description: format!("Room tax {}", date),
                        amount: round_money(rate * settings.tax_rate),
                        date,
                    },
                });
            }
        }
    }

    plan
}

/// 房態與在住訂房對帳
pub struct RoomReconciliation {
    api: Arc<dyn PmsApi>,
}

impl RoomReconciliation {
    pub fn new(api: Arc<dyn PmsApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl AuditStep for RoomReconciliation {
    async fn extract_with_context(&self, context: &AuditContext) -> Result<AuditSnapshot> {
        let bookings = self.api.list_bookings(&context.tenant_id).await?;
        let rooms = self.api.list_rooms(&context.tenant_id).await?;
        ensure_tenant(&context.tenant_id, bookings.iter().map(|b| &b.tenant_id))?;
        ensure_tenant(&context.tenant_id, rooms.iter().map(|r| &r.tenant_id))?;

        Ok(AuditSnapshot {
            bookings,
            rooms,
            ..Default::default()
        })
    }

    async fn transform_with_context(&self, snapshot: AuditSnapshot, _context: &AuditContext) -> Result<StepPlan> {
        Ok(plan_room_reconciliation(&snapshot))
    }

    fn get_name(&self) -> &str {
        "room_reconciliation"
    }
}

fn plan_room_reconciliation(snapshot: &AuditSnapshot) -> StepPlan {
    let mut plan = StepPlan::default();

    let in_house_rooms: HashSet<&str> = snapshot
        .bookings
        .iter()
        .filter(|b| b.status.is_in_house())
        .filter_map(|b| b.room_id.as_deref())
        .collect();

    for room in &snapshot.rooms {
        if room.status == RoomStatus::Occupied
            && !in_house_rooms.contains(room.id.as_str())
            && room.status.can_transition_to(RoomStatus::Dirty)
        {
            plan.actions.push(AuditAction::SetRoomStatus {
                room_id: room.id.clone(),
                from: room.status,
                to: RoomStatus::Dirty,
            });
        }
    }

    for booking in snapshot.bookings.iter().filter(|b| b.status.is_in_house()) {
        let Some(room_id) = booking.room_id.as_deref() else {
            plan.exceptions.push(exception(
                "room_reconciliation",
                "booking",
                &booking.id,
                "In-house booking has no room assigned",
            ));
            continue;
        };

        match snapshot.rooms.iter().find(|r| r.id == room_id) {
            Some(room) if room.status != RoomStatus::Occupied => plan.exceptions.push(exception(
                "room_reconciliation",
                "room",
                &room.id,
                format!("Room {} is {} but booking {} is in house", room.room_number, room.status, booking.id),
            )),
            Some(_) => {}
            None => plan.exceptions.push(exception(
                "room_reconciliation",
                "booking",
                &booking.id,
                format!("Assigned room {} not found", room_id),
            )),
        }
    }

    plan
}

/// 關帳並推進營業日；前面任一步驟失敗時不執行
pub struct DayClose;

#[async_trait::async_trait]
impl AuditStep for DayClose {
    async fn extract_with_context(&self, _context: &AuditContext) -> Result<AuditSnapshot> {
        Ok(AuditSnapshot::default())
    }

    async fn transform_with_context(&self, _snapshot: AuditSnapshot, context: &AuditContext) -> Result<StepPlan> {
        Ok(StepPlan {
            actions: vec![AuditAction::CloseDay {
                business_date: context.business_date,
            }],
            exceptions: Vec::new(),
        })
    }

    fn get_name(&self) -> &str {
        "close_day"
    }

    fn should_execute(&self, context: &AuditContext) -> bool {
        !context.has_failures()
    }
}
