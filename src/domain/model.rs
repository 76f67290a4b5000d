use crate::utils::error::{PmsError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 金額一律四捨五入到分
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 一個飯店帳號；所有集合都以 tenant_id 區隔
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 確認實體屬於目前處理的 tenant
    pub fn ensure_owns(&self, found: &TenantId) -> Result<()> {
        if self != found {
            return Err(PmsError::TenantMismatch {
                expected: self.0.clone(),
                found: found.0.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Occupied,
    Dirty,
    Cleaning,
    Inspected,
    Maintenance,
    OutOfOrder,
}

impl RoomStatus {
    pub const ALL: [RoomStatus; 7] = [
        RoomStatus::Available,
        RoomStatus::Occupied,
        RoomStatus::Dirty,
        RoomStatus::Cleaning,
        RoomStatus::Inspected,
        RoomStatus::Maintenance,
        RoomStatus::OutOfOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Dirty => "dirty",
            RoomStatus::Cleaning => "cleaning",
            RoomStatus::Inspected => "inspected",
            RoomStatus::Maintenance => "maintenance",
            RoomStatus::OutOfOrder => "out_of_order",
        }
    }

    pub fn can_transition_to(&self, next: RoomStatus) -> bool {
        use RoomStatus::*;

        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Available, Occupied | Dirty | Maintenance | OutOfOrder)
                | (Occupied, Dirty)
                | (Dirty, Cleaning | Maintenance | OutOfOrder)
                | (Cleaning, Inspected | Dirty)
                | (Inspected, Available | Dirty)
                | (Maintenance, Dirty | Available | OutOfOrder)
                | (OutOfOrder, Maintenance | Dirty)
        )
    }

    pub fn transition(&self, next: RoomStatus) -> Result<RoomStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PmsError::InvalidTransition {
                entity: "room".to_string(),
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// 可售房：故障房不計入可售庫存
    pub fn is_sellable(&self) -> bool {
        !matches!(self, RoomStatus::OutOfOrder)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Guaranteed,
    CheckedIn,
    CheckedOut,
    NoShow,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Guaranteed => "guaranteed",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::CheckedOut => "checked_out",
            BookingStatus::NoShow => "no_show",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;

        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Pending, Confirmed | Guaranteed | Cancelled | NoShow)
                | (Confirmed, Guaranteed | CheckedIn | Cancelled | NoShow)
                | (Guaranteed, CheckedIn | Cancelled | NoShow)
                | (CheckedIn, CheckedOut)
        )
    }

    pub fn transition(&self, next: BookingStatus) -> Result<BookingStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PmsError::InvalidTransition {
                entity: "booking".to_string(),
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::CheckedOut | BookingStatus::NoShow | BookingStatus::Cancelled
        )
    }

    pub fn is_in_house(&self) -> bool {
        matches!(self, BookingStatus::CheckedIn)
    }

    /// 尚未入住、仍在等待抵達
    pub fn is_arrival_pending(&self) -> bool {
        matches!(
            self,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Guaranteed
        )
    }

    /// 計入已售房晚（報表用）
    pub fn counts_as_sold(&self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed
                | BookingStatus::Guaranteed
                | BookingStatus::CheckedIn
                | BookingStatus::CheckedOut
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Direct,
    Ota,
    Corporate,
    WalkIn,
    #[serde(other)]
    Other,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Direct => "direct",
            Channel::Ota => "ota",
            Channel::Corporate => "corporate",
            Channel::WalkIn => "walk_in",
            Channel::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub tenant_id: TenantId,
    pub room_number: String,
    #[serde(default)]
    pub room_type: String,
    #[serde(default)]
    pub floor: i32,
    pub status: RoomStatus,
    #[serde(default)]
    pub base_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    pub id: String,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub vip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub tenant_id: TenantId,
    pub guest_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: BookingStatus,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub guaranteed: bool,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days().max(0)
    }

    pub fn nightly_rate(&self) -> f64 {
        if let Some(rate) = self.rate {
            return round_money(rate);
        }

        let nights = self.nights();
        if nights == 0 {
            round_money(self.total_amount)
        } else {
            round_money(self.total_amount / nights as f64)
        }
    }

    /// 該日是否佔用房晚（入住日含、退房日不含）
    pub fn occupies(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }

    pub fn is_guaranteed(&self) -> bool {
        self.guaranteed || self.status == BookingStatus::Guaranteed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolioStatus {
    Open,
    Closed,
    Voided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeCategory {
    Room,
    Tax,
    NoShowFee,
    Food,
    Beverage,
    Minibar,
    #[serde(other)]
    Other,
}

impl ChargeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeCategory::Room => "room",
            ChargeCategory::Tax => "tax",
            ChargeCategory::NoShowFee => "no_show_fee",
            ChargeCategory::Food => "food",
            ChargeCategory::Beverage => "beverage",
            ChargeCategory::Minibar => "minibar",
            ChargeCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioCharge {
    pub id: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub category: ChargeCategory,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub voided: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub amount: f64,
    #[serde(default)]
    pub method: String,
    pub date: NaiveDate,
}

/// 尚未入帳的費用；reference 讓重複過帳可被偵測
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCharge {
    pub reference: String,
    pub category: ChargeCategory,
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folio {
    pub id: String,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub guest_id: Option<String>,
    pub status: FolioStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub charges: Vec<FolioCharge>,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

impl Folio {
    pub fn is_open(&self) -> bool {
        self.status == FolioStatus::Open
    }

    pub fn total_charges(&self) -> f64 {
        round_money(
            self.charges
                .iter()
                .filter(|c| !c.voided)
                .map(|c| c.amount)
                .sum(),
        )
    }

    pub fn total_payments(&self) -> f64 {
        round_money(self.payments.iter().map(|p| p.amount).sum())
    }

    pub fn balance(&self) -> f64 {
        round_money(self.total_charges() - self.total_payments())
    }

    pub fn has_reference(&self, reference: &str) -> bool {
        self.charges
            .iter()
            .any(|c| !c.voided && c.reference.as_deref() == Some(reference))
    }
}

/// booking_id -> 開啟中的帳夾
pub fn open_folios_by_booking(folios: &[Folio]) -> HashMap<&str, &Folio> {
    folios
        .iter()
        .filter(|f| f.is_open())
        .filter_map(|f| f.booking_id.as_deref().map(|id| (id, f)))
        .collect()
}

/// 報表與視圖的一列，保留欄位順序輸出 JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    pub fn from_serializable<T: Serialize>(row: &T) -> Result<Self> {
        match serde_json::to_value(row)? {
            serde_json::Value::Object(data) => Ok(Self { data }),
            other => {
                let mut data = serde_json::Map::new();
                data.insert("value".to_string(), other);
                Ok(Self { data })
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.data.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(check_in: &str, check_out: &str, total: f64) -> Booking {
        Booking {
            id: "b1".to_string(),
            tenant_id: TenantId::new("hotel-a"),
            guest_id: "g1".to_string(),
            room_id: Some("r101".to_string()),
            check_in: check_in.parse().unwrap(),
            check_out: check_out.parse().unwrap(),
            status: BookingStatus::Confirmed,
            total_amount: total,
            rate: None,
            channel: Channel::Direct,
            guaranteed: false,
        }
    }

    #[test]
    fn test_room_status_transitions() {
        assert!(RoomStatus::Occupied.can_transition_to(RoomStatus::Dirty));
        assert!(RoomStatus::Dirty.can_transition_to(RoomStatus::Cleaning));
        assert!(RoomStatus::Inspected.can_transition_to(RoomStatus::Available));
        assert!(RoomStatus::Available.can_transition_to(RoomStatus::Available));

        assert!(!RoomStatus::Occupied.can_transition_to(RoomStatus::Available));
        assert!(!RoomStatus::Dirty.can_transition_to(RoomStatus::Occupied));

        let err = RoomStatus::Cleaning.transition(RoomStatus::Occupied).unwrap_err();
        assert!(matches!(err, PmsError::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "Invalid room status transition: cleaning -> occupied");
    }

    #[test]
    fn test_booking_status_transitions() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::NoShow));
        assert!(BookingStatus::Guaranteed.can_transition_to(BookingStatus::CheckedIn));
        assert!(BookingStatus::CheckedIn.can_transition_to(BookingStatus::CheckedOut));

        assert!(!BookingStatus::CheckedIn.can_transition_to(BookingStatus::NoShow));
        assert!(!BookingStatus::Cancelled.can_transition_to(BookingStatus::Confirmed));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::CheckedIn));
        assert!(BookingStatus::NoShow.is_terminal());
    }

    #[test]
    fn test_nightly_rate_and_occupancy() {
        let b = booking("2024-03-01", "2024-03-04", 300.0);
        assert_eq!(b.nights(), 3);
        assert_eq!(b.nightly_rate(), 100.0);
        assert!(b.occupies("2024-03-01".parse().unwrap()));
        assert!(b.occupies("2024-03-03".parse().unwrap()));
        assert!(!b.occupies("2024-03-04".parse().unwrap()));

        let uneven = booking("2024-03-01", "2024-03-04", 100.0);
        assert_eq!(uneven.nightly_rate(), 33.33);

        let day_use = booking("2024-03-01", "2024-03-01", 80.0);
        assert_eq!(day_use.nights(), 0);
        assert_eq!(day_use.nightly_rate(), 80.0);

        let mut explicit = booking("2024-03-01", "2024-03-04", 300.0);
        explicit.rate = Some(120.0);
        assert_eq!(explicit.nightly_rate(), 120.0);
    }

    #[test]
    fn test_folio_balance_ignores_voided_charges() {
        let date: NaiveDate = "2024-03-01".parse().unwrap();
        let folio = Folio {
            id: "f1".to_string(),
            tenant_id: TenantId::new("hotel-a"),
            booking_id: Some("b1".to_string()),
            guest_id: None,
            status: FolioStatus::Open,
            opened_at: Utc::now(),
            charges: vec![
                FolioCharge {
                    id: "c1".to_string(),
                    reference: Some("room:b1:2024-03-01".to_string()),
                    category: ChargeCategory::Room,
                    description: "Room charge".to_string(),
                    amount: 100.0,
                    date,
                    voided: false,
                },
                FolioCharge {
                    id: "c2".to_string(),
                    reference: Some("minibar:1".to_string()),
                    category: ChargeCategory::Minibar,
                    description: "Minibar".to_string(),
                    amount: 25.5,
                    date,
                    voided: true,
                },
            ],
            payments: vec![Payment {
                id: "p1".to_string(),
                amount: 40.0,
                method: "card".to_string(),
                date,
            }],
        };

        assert_eq!(folio.balance(), 60.0);
        assert!(folio.has_reference("room:b1:2024-03-01"));
        assert!(!folio.has_reference("minibar:1"));
    }

    #[test]
    fn test_tenant_guard() {
        let tenant = TenantId::new("hotel-a");
        assert!(tenant.ensure_owns(&TenantId::new("hotel-a")).is_ok());
        assert!(matches!(
            tenant.ensure_owns(&TenantId::new("hotel-b")),
            Err(PmsError::TenantMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_channel_maps_to_other() {
        let channel: Channel = serde_json::from_str("\"metasearch\"").unwrap();
        assert_eq!(channel, Channel::Other);
        let status: BookingStatus = serde_json::from_str("\"checked_in\"").unwrap();
        assert_eq!(status, BookingStatus::CheckedIn);
    }
}
