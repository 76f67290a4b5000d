use crate::domain::model::{
    Booking, BookingStatus, Folio, FolioCharge, Guest, NewCharge, Room, RoomStatus, TenantId,
};
use crate::domain::ports::PmsApi;
use crate::utils::error::{PmsError, Result};
use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct TenantData {
    business_date: Option<NaiveDate>,
    bookings: Vec<Booking>,
    rooms: Vec<Room>,
    folios: Vec<Folio>,
    guests: Vec<Guest>,
}

/// 記憶體中的 PMS，套用與後端相同的狀態規則；測試與 `--demo` 使用
#[derive(Default)]
pub struct InMemoryPms {
    tenants: RwLock<HashMap<TenantId, TenantData>>,
    calls: RwLock<Vec<String>>,
    failing_calls: RwLock<HashMap<String, u32>>,
    next_charge_id: std::sync::atomic::AtomicU64,
}

impl InMemoryPms {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_business_date(&self, tenant: &TenantId, date: NaiveDate) {
        self.tenants.write().await.entry(tenant.clone()).or_default().business_date = Some(date);
    }

    pub async fn add_room(&self, room: Room) {
        self.tenants.write().await.entry(room.tenant_id.clone()).or_default().rooms.push(room);
    }

    pub async fn add_booking(&self, booking: Booking) {
        self.tenants
            .write()
            .await
            .entry(booking.tenant_id.clone())
            .or_default()
            .bookings
            .push(booking);
    }

    pub async fn add_folio(&self, folio: Folio) {
        self.tenants.write().await.entry(folio.tenant_id.clone()).or_default().folios.push(folio);
    }

    pub async fn add_guest(&self, guest: Guest) {
        self.tenants.write().await.entry(guest.tenant_id.clone()).or_default().guests.push(guest);
    }

    /// 讓接下來 `times` 次指定操作失敗（HTTP 503），用於測試重試
    pub async fn fail_next(&self, operation: &str, times: u32) {
        self.failing_calls.write().await.insert(operation.to_string(), times);
    }

    /// 已執行的操作紀錄，例如 `post_charge:f1`
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    pub async fn booking(&self, tenant: &TenantId, id: &str) -> Option<Booking> {
        let tenants = self.tenants.read().await;
        tenants.get(tenant)?.bookings.iter().find(|b| b.id == id).cloned()
    }

    pub async fn room(&self, tenant: &TenantId, id: &str) -> Option<Room> {
        let tenants = self.tenants.read().await;
        tenants.get(tenant)?.rooms.iter().find(|r| r.id == id).cloned()
    }

    pub async fn folio(&self, tenant: &TenantId, id: &str) -> Option<Folio> {
        let tenants = self.tenants.read().await;
        tenants.get(tenant)?.folios.iter().find(|f| f.id == id).cloned()
    }

    async fn record_call(&self, operation: &str, target: &str) -> Result<()> {
        let mut failing = self.failing_calls.write().await;
        if let Some(remaining) = failing.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PmsError::HttpStatus {
                    status: 503,
                    endpoint: operation.to_string(),
                    body: "injected failure".to_string(),
                });
            }
        }
        drop(failing);

        self.calls.write().await.push(format!("{}:{}", operation, target));
        Ok(())
    }

    async fn snapshot(&self, tenant: &TenantId) -> TenantData {
        self.tenants.read().await.get(tenant).cloned().unwrap_or_default()
    }
}

fn not_found(entity: &str, id: &str) -> PmsError {
    PmsError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

#[async_trait::async_trait]
impl PmsApi for InMemoryPms {
    async fn business_date(&self, tenant: &TenantId) -> Result<NaiveDate> {
        self.record_call("business_date", tenant.as_str()).await?;
        self.snapshot(tenant)
            .await
            .business_date
            .ok_or_else(|| not_found("business date", tenant.as_str()))
    }

    async fn list_bookings(&self, tenant: &TenantId) -> Result<Vec<Booking>> {
        self.record_call("list_bookings", tenant.as_str()).await?;
        Ok(self.snapshot(tenant).await.bookings)
    }

    async fn list_rooms(&self, tenant: &TenantId) -> Result<Vec<Room>> {
        self.record_call("list_rooms", tenant.as_str()).await?;
        Ok(self.snapshot(tenant).await.rooms)
    }

    async fn list_folios(&self, tenant: &TenantId) -> Result<Vec<Folio>> {
        self.record_call("list_folios", tenant.as_str()).await?;
        Ok(self.snapshot(tenant).await.folios)
    }

    async fn list_guests(&self, tenant: &TenantId) -> Result<Vec<Guest>> {
        self.record_call("list_guests", tenant.as_str()).await?;
        Ok(self.snapshot(tenant).await.guests)
    }

    async fn post_charge(
        &self,
        tenant: &TenantId,
        folio_id: &str,
        charge: &NewCharge,
    ) -> Result<FolioCharge> {
        self.record_call("post_charge", folio_id).await?;

        let mut tenants = self.tenants.write().await;
        let data = tenants.get_mut(tenant).ok_or_else(|| not_found("tenant", tenant.as_str()))?;
        let folio = data
            .folios
            .iter_mut()
            .find(|f| f.id == folio_id)
            .ok_or_else(|| not_found("folio", folio_id))?;

        if !folio.is_open() {
            return Err(PmsError::ValidationError {
                message: format!("Folio '{}' is not open", folio_id),
            });
        }

        let id = self.next_charge_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        let posted = FolioCharge {
            id: format!("chg-{}", id),
            reference: Some(charge.reference.clone()),
            category: charge.category,
            description: charge.description.clone(),
            amount: charge.amount,
            date: charge.date,
            voided: false,
        };
        folio.charges.push(posted.clone());
        Ok(posted)
    }

    async fn update_booking_status(
        &self,
        tenant: &TenantId,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<()> {
        self.record_call("update_booking_status", booking_id).await?;

        let mut tenants = self.tenants.write().await;
        let data = tenants.get_mut(tenant).ok_or_else(|| not_found("tenant", tenant.as_str()))?;
        let booking = data
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id)
            .ok_or_else(|| not_found("booking", booking_id))?;

        let next = booking.status.transition(status)?;
        // 離開 guaranteed 狀態後保證仍然有效
        if booking.status == BookingStatus::Guaranteed {
            booking.guaranteed = true;
        }
        booking.status = next;
        Ok(())
    }

    async fn update_room_status(
        &self,
        tenant: &TenantId,
        room_id: &str,
        status: RoomStatus,
    ) -> Result<()> {
        self.record_call("update_room_status", room_id).await?;

        let mut tenants = self.tenants.write().await;
        let data = tenants.get_mut(tenant).ok_or_else(|| not_found("tenant", tenant.as_str()))?;
        let room = data
            .rooms
            .iter_mut()
            .find(|r| r.id == room_id)
            .ok_or_else(|| not_found("room", room_id))?;

        room.status = room.status.transition(status)?;
        Ok(())
    }

    async fn close_business_day(&self, tenant: &TenantId, date: NaiveDate) -> Result<NaiveDate> {
        self.record_call("close_business_day", tenant.as_str()).await?;

        let mut tenants = self.tenants.write().await;
        let data = tenants.get_mut(tenant).ok_or_else(|| not_found("tenant", tenant.as_str()))?;

        if let Some(current) = data.business_date {
            if current != date {
                return Err(PmsError::ValidationError {
                    message: format!("Business date is {}, cannot close {}", current, date),
                });
            }
        }

        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| PmsError::ProcessingError {
                message: format!("Cannot advance business date past {}", date),
            })?;
        data.business_date = Some(next);
        Ok(next)
    }
}
