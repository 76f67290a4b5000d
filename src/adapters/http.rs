use crate::config::pms_config::ApiConfig;
use crate::domain::model::{
    Booking, BookingStatus, Folio, FolioCharge, Guest, NewCharge, Room, RoomStatus, TenantId,
};
use crate::domain::ports::PmsApi;
use crate::utils::error::{PmsError, Result};
use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const TENANT_HEADER: &str = "X-Tenant-ID";

#[derive(Debug, Serialize, Deserialize)]
struct BusinessDateBody {
    business_date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct StatusBody<S: Serialize> {
    status: S,
}

/// 以 REST 呼叫 PMS 後端
pub struct HttpPmsClient {
    base_url: String,
    config: ApiConfig,
    client: Client,
}

impl HttpPmsClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, tenant: &TenantId, path: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(TENANT_HEADER, tenant.as_str());

        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        // 添加自定義標頭
        if let Some(headers) = &self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        request
    }

    /// 送出請求；網路錯誤、5xx 與 429 依設定重試
    async fn send_json<B, T>(
        &self,
        method: Method,
        tenant: &TenantId,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let max_attempts = self.config.retry_attempts() + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut request = self.request(method.clone(), tenant, path);
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!("📡 {} {} (tenant: {}, attempt {}/{})", method, path, tenant, attempt, max_attempts);

            match self.execute(request, path).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.retry_delay() * attempt;
                    tracing::warn!("🔁 {} {} failed: {} - retrying in {:?}", method, path, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PmsError::HttpStatus {
                status: status.as_u16(),
                endpoint: path.to_string(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            // 部分端點回 204，視為 JSON null
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 列表端點可能回傳陣列，或包在 data / items 之下
    async fn get_list<T: DeserializeOwned>(&self, tenant: &TenantId, path: &str) -> Result<Vec<T>> {
        let value: serde_json::Value = self
            .send_json::<(), _>(Method::GET, tenant, path, None)
            .await?;

        let items = match value {
            serde_json::Value::Array(_) => value,
            serde_json::Value::Object(mut obj) => obj
                .remove("data")
                .or_else(|| obj.remove("items"))
                .ok_or_else(|| PmsError::ProcessingError {
                    message: format!("Unexpected list payload from {}", path),
                })?,
            other => {
                return Err(PmsError::ProcessingError {
                    message: format!("Unexpected list payload from {}: {}", path, other),
                })
            }
        };

        let records: Vec<T> = serde_json::from_value(items)?;
        tracing::debug!("📥 {} returned {} items for tenant {}", path, records.len(), tenant);
        Ok(records)
    }

    /// 確認回傳的實體都屬於目前 tenant
    fn check_tenant<'a, I>(tenant: &TenantId, owners: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TenantId>,
    {
        for owner in owners {
            tenant.ensure_owns(owner)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PmsApi for HttpPmsClient {
    async fn business_date(&self, tenant: &TenantId) -> Result<NaiveDate> {
        let body: BusinessDateBody = self
            .send_json::<(), _>(Method::GET, tenant, "/api/night-audit/business-date", None)
            .await?;
        Ok(body.business_date)
    }

    async fn list_bookings(&self, tenant: &TenantId) -> Result<Vec<Booking>> {
        let bookings: Vec<Booking> = self.get_list(tenant, "/api/bookings").await?;
        Self::check_tenant(tenant, bookings.iter().map(|b| &b.tenant_id))?;
        Ok(bookings)
    }

    async fn list_rooms(&self, tenant: &TenantId) -> Result<Vec<Room>> {
        let rooms: Vec<Room> = self.get_list(tenant, "/api/rooms").await?;
        Self::check_tenant(tenant, rooms.iter().map(|r| &r.tenant_id))?;
        Ok(rooms)
    }

    async fn list_folios(&self, tenant: &TenantId) -> Result<Vec<Folio>> {
        let folios: Vec<Folio> = self.get_list(tenant, "/api/folios").await?;
        Self::check_tenant(tenant, folios.iter().map(|f| &f.tenant_id))?;
        Ok(folios)
    }

    async fn list_guests(&self, tenant: &TenantId) -> Result<Vec<Guest>> {
        let guests: Vec<Guest> = self.get_list(tenant, "/api/guests").await?;
        Self::check_tenant(tenant, guests.iter().map(|g| &g.tenant_id))?;
        Ok(guests)
    }

    async fn post_charge(
        &self,
        tenant: &TenantId,
        folio_id: &str,
        charge: &NewCharge,
    ) -> Result<FolioCharge> {
        let path = format!("/api/folios/{}/charges", folio_id);
        self.send_json(Method::POST, tenant, &path, Some(charge)).await
    }

    async fn update_booking_status(
        &self,
        tenant: &TenantId,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<()> {
        let path = format!("/api/bookings/{}/status", booking_id);
        let _: serde_json::Value = self
            .send_json(Method::PUT, tenant, &path, Some(&StatusBody { status }))
            .await?;
        Ok(())
    }

    async fn update_room_status(
        &self,
        tenant: &TenantId,
        room_id: &str,
        status: RoomStatus,
    ) -> Result<()> {
        let path = format!("/api/rooms/{}/status", room_id);
        let _: serde_json::Value = self
            .send_json(Method::PUT, tenant, &path, Some(&StatusBody { status }))
            .await?;
        Ok(())
    }

    async fn close_business_day(&self, tenant: &TenantId, date: NaiveDate) -> Result<NaiveDate> {
        let body: BusinessDateBody = self
            .send_json(
                Method::POST,
                tenant,
                "/api/night-audit/close-day",
                Some(&BusinessDateBody { business_date: date }),
            )
            .await?;
        Ok(body.business_date)
    }
}
