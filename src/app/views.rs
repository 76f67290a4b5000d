use crate::config::pms_config::PmsConfig;
use crate::core::aggregations::{
    self, AgingRow, AgingTotalRow, ChannelRow, GuestRow, HousekeepingRow, OccupancyRow, RateRow, RateThresholds,
};
use crate::core::cache::CacheAside;
use crate::domain::model::{Booking, Folio, Guest, Record, Room, TenantId};
use crate::domain::ports::{CacheStore, PmsApi, Storage};
use crate::utils::error::{PmsError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const VIEWS_NAMESPACE: &str = "views";

#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub enabled: Vec<String>,
    pub formats: Vec<String>,
    pub days_back: i64,
    pub days_forward: i64,
    pub top_guests: usize,
    pub view_ttl: Duration,
    pub thresholds: RateThresholds,
}

impl ViewSettings {
    pub fn from_config(config: &PmsConfig) -> Self {
        Self {
            enabled: config.enabled_views(),
            formats: config.view_formats(),
            days_back: config.days_back(),
            days_forward: config.days_forward(),
            top_guests: config.top_guests(),
            view_ttl: config.view_ttl(),
            thresholds: config.rate_thresholds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewOutput {
    pub view: String,
    pub rows: usize,
    pub files: Vec<String>,
}

/// 一次從 API 讀取的資料，供所有視圖共用
#[derive(Debug, Clone)]
struct SourceData {
    anchor: NaiveDate,
    bookings: Vec<Booking>,
    rooms: Vec<Room>,
    folios: Vec<Folio>,
    guests: Vec<Guest>,
}

/// 物化視圖重算：計算、寫檔並回填快取
pub struct ViewRefresher<S: Storage, C: CacheStore + ?Sized = dyn CacheStore> {
    api: Arc<dyn PmsApi>,
    storage: S,
    cache: Arc<CacheAside<C>>,
    settings: ViewSettings,
}

impl<S: Storage, C: CacheStore + ?Sized> ViewRefresher<S, C> {
    pub fn new(api: Arc<dyn PmsApi>, storage: S, cache: Arc<CacheAside<C>>, settings: ViewSettings) -> Self {
        Self {
            api,
            storage,
            cache,
            settings,
        }
    }

    pub async fn refresh_all(&self, tenants: &[TenantId], only: &[String]) -> Vec<(TenantId, Result<Vec<ViewOutput>>)> {
        let mut outcomes = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let outcome = self.refresh(tenant, only).await;
            if let Err(e) = &outcome {
                tracing::error!("❌ View refresh failed for tenant {}: {}", tenant, e);
            }
            outcomes.push((tenant.clone(), outcome));
        }
        outcomes
    }

    pub async fn refresh(&self, tenant: &TenantId, only: &[String]) -> Result<Vec<ViewOutput>> {
        let views = self.selected_views(only)?;
        tracing::info!("📊 Refreshing {} views for tenant {}", views.len(), tenant);

        let data = self.load(tenant).await?;

        // 先清掉舊視圖，失敗的重算不會留下過期資料
        self.cache.invalidate_namespace(tenant, VIEWS_NAMESPACE).await?;

        let mut outputs = Vec::with_capacity(views.len());
        for view in views {
            let rows = self.compute(&view, &data)?;
            let files = self.write_view(tenant, &view, &rows).await?;

            let key = self.cache.key(tenant, VIEWS_NAMESPACE, &[view.as_str()]);
            if !self.cache.put(&key, &rows, Some(self.settings.view_ttl)).await {
                tracing::warn!("⚠️ View {} for {} written but not cached", view, tenant);
            }

            tracing::debug!("✅ View {} refreshed ({} rows)", view, rows.len());
            outputs.push(ViewOutput {
                view,
                rows: rows.len(),
                files,
            });
        }

        Ok(outputs)
    }

    /// 讀取視圖：先查快取，未命中時即時重算
    pub async fn read_view(&self, tenant: &TenantId, view: &str) -> Result<Vec<Record>> {
        self.ensure_known(view)?;
        let key = self.cache.key(tenant, VIEWS_NAMESPACE, &[view]);

        self.cache
            .get_or_load(&key, Some(self.settings.view_ttl), || async {
                let data = self.load(tenant).await?;
                self.compute(view, &data)
            })
            .await
    }

    fn ensure_known(&self, view: &str) -> Result<()> {
        if self.settings.enabled.iter().any(|v| v == view) {
            Ok(())
        } else {
            Err(PmsError::InvalidConfigValueError {
                field: "view".to_string(),
                value: view.to_string(),
                reason: format!("View is not enabled (enabled: {})", self.settings.enabled.join(", ")),
            })
        }
    }

    fn selected_views(&self, only: &[String]) -> Result<Vec<String>> {
        if only.is_empty() {
            return Ok(self.settings.enabled.clone());
        }
        for view in only {
            self.ensure_known(view)?;
        }
        Ok(only.to_vec())
    }

    async fn load(&self, tenant: &TenantId) -> Result<SourceData> {
        let anchor = match self.api.business_date(tenant).await {
            Ok(date) => date,
            Err(e) => {
                let today = chrono::Utc::now().date_naive();
                tracing::warn!("⚠️ Business date unavailable for {} ({}), using {}", tenant, e, today);
                today
            }
        };

        let bookings = self.api.list_bookings(tenant).await?;
        let rooms = self.api.list_rooms(tenant).await?;
        let folios = self.api.list_folios(tenant).await?;
        let guests = self.api.list_guests(tenant).await?;

        for owner in bookings
            .iter()
            .map(|b| &b.tenant_id)
            .chain(rooms.iter().map(|r| &r.tenant_id))
            .chain(folios.iter().map(|f| &f.tenant_id))
            .chain(guests.iter().map(|g| &g.tenant_id))
        {
            tenant.ensure_owns(owner)?;
        }

        Ok(SourceData {
            anchor,
            bookings,
            rooms,
            folios,
            guests,
        })
    }

    fn compute(&self, view: &str, data: &SourceData) -> Result<Vec<Record>> {
        let settings = &self.settings;
        let (from, to) = aggregations::window(data.anchor, settings.days_back, settings.days_forward);

        match view {
            "daily_occupancy" => records(&aggregations::daily_occupancy(&data.bookings, &data.rooms, from, to)),
            "channel_revenue" => records(&aggregations::channel_revenue(&data.bookings)),
            "guest_stats" => records(&aggregations::guest_stats(&data.bookings, &data.guests, settings.top_guests)),
            "housekeeping_board" => records(&aggregations::housekeeping_board(&data.rooms)),
            "folio_aging" => records(&aggregations::folio_aging(&data.folios, data.anchor)),
            "folio_aging_totals" => {
                let aging = aggregations::folio_aging(&data.folios, data.anchor);
                records(&aggregations::aging_totals(&aging))
            }
            "rate_recommendations" => {
                let (_, horizon) = aggregations::window(data.anchor, 0, settings.days_forward);
                let occupancy = aggregations::daily_occupancy(&data.bookings, &data.rooms, data.anchor, horizon);
                records(&aggregations::rate_recommendations(&occupancy, data.anchor, &settings.thresholds))
            }
            other => Err(PmsError::InvalidConfigValueError {
                field: "view".to_string(),
                value: other.to_string(),
                reason: "Unknown view".to_string(),
            }),
        }
    }

    async fn write_view(&self, tenant: &TenantId, view: &str, rows: &[Record]) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for format in &self.settings.formats {
            let path = format!("views/{}/{}.{}", tenant, view, format);
            let bytes = match format.as_str() {
                "json" => serde_json::to_vec_pretty(&rows.iter().map(|r| &r.data).collect::<Vec<_>>())?,
                "csv" => records_to_csv(rows, view_columns(view))?,
                other => {
                    return Err(PmsError::InvalidConfigValueError {
                        field: "views.output_formats".to_string(),
                        value: other.to_string(),
                        reason: "Supported formats are json and csv".to_string(),
                    })
                }
            };

            self.storage.write_file(&path, &bytes).await?;
            files.push(path);
        }

        Ok(files)
    }
}

fn records<T: Serialize>(rows: &[T]) -> Result<Vec<Record>> {
    rows.iter().map(Record::from_serializable).collect()
}

fn view_columns(view: &str) -> &'static [&'static str] {
    match view {
        "daily_occupancy" => OccupancyRow::COLUMNS,
        "channel_revenue" => ChannelRow::COLUMNS,
        "guest_stats" => GuestRow::COLUMNS,
        "housekeeping_board" => HousekeepingRow::COLUMNS,
        "folio_aging" => AgingRow::COLUMNS,
        "folio_aging_totals" => AgingTotalRow::COLUMNS,
        "rate_recommendations" => RateRow::COLUMNS,
        _ => &[],
    }
}

/// 欄位依視圖的欄位清單；沒有資料列時只輸出標頭，巢狀值以 JSON 字串輸出
fn records_to_csv(rows: &[Record], columns: &[&str]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let headers: Vec<&str> = match rows.first() {
        Some(first) if columns.is_empty() => first.data.keys().map(|k| k.as_str()).collect(),
        _ => columns.to_vec(),
    };

    if !headers.is_empty() {
        writer.write_record(&headers)?;

        for row in rows {
            let fields: Vec<String> = headers
                .iter()
                .map(|h| match row.data.get(*h) {
                    None | Some(serde_json::Value::Null) => String::new(),
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
                .collect();
            writer.write_record(&fields)?;
        }
    }

    writer.flush()?;
    writer.into_inner().map_err(|e| PmsError::ProcessingError {
        message: format!("Failed to finish CSV: {}", e),
    })
}
