use crate::domain::model::{
    Booking, BookingStatus, Folio, FolioCharge, Guest, NewCharge, Room, RoomStatus, TenantId,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// PMS REST API 中夜審與報表需要的部分
#[async_trait]
pub trait PmsApi: Send + Sync {
    async fn business_date(&self, tenant: &TenantId) -> Result<NaiveDate>;
    async fn list_bookings(&self, tenant: &TenantId) -> Result<Vec<Booking>>;
    async fn list_rooms(&self, tenant: &TenantId) -> Result<Vec<Room>>;
    async fn list_folios(&self, tenant: &TenantId) -> Result<Vec<Folio>>;
    async fn list_guests(&self, tenant: &TenantId) -> Result<Vec<Guest>>;
    async fn post_charge(
        &self,
        tenant: &TenantId,
        folio_id: &str,
        charge: &NewCharge,
    ) -> Result<FolioCharge>;
    async fn update_booking_status(
        &self,
        tenant: &TenantId,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<()>;
    async fn update_room_status(
        &self,
        tenant: &TenantId,
        room_id: &str,
        status: RoomStatus,
    ) -> Result<()>;
    /// 關帳並回傳下一個營業日
    async fn close_business_day(&self, tenant: &TenantId, date: NaiveDate) -> Result<NaiveDate>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    /// 以 glob (`*`) 刪除，回傳刪除數量
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;
}
