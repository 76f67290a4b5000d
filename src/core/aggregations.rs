//! 物化視圖的計算邏輯，全部是純函數，方便測試與重算。

use crate::domain::model::{round_money, Booking, Channel, Folio, Guest, Room, RoomStatus};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn pct(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        round_money(part / whole * 100.0)
    }
}

fn dates_between(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyRow {
    pub date: NaiveDate,
    pub rooms_sold: u32,
    pub available_rooms: u32,
    pub occupancy_pct: f64,
    pub room_revenue: f64,
    pub adr: f64,
    pub revpar: f64,
}

impl OccupancyRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "date",
        "rooms_sold",
        "available_rooms",
        "occupancy_pct",
        "room_revenue",
        "adr",
        "revpar",
    ];
}

/// 每日住房率、ADR 與 RevPAR（from、to 皆含）
pub fn daily_occupancy(
    bookings: &[Booking],
    rooms: &[Room],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<OccupancyRow> {
    let available_rooms = rooms.iter().filter(|r| r.status.is_sellable()).count() as u32;
    let sold: Vec<&Booking> = bookings.iter().filter(|b| b.status.counts_as_sold()).collect();

    dates_between(from, to)
        .map(|date| {
            let occupying: Vec<&&Booking> = sold.iter().filter(|b| b.occupies(date)).collect();
            let rooms_sold = occupying.len() as u32;
            let room_revenue = round_money(occupying.iter().map(|b| b.nightly_rate()).sum());

            OccupancyRow {
                date,
                rooms_sold,
                available_rooms,
                occupancy_pct: pct(rooms_sold as f64, available_rooms as f64),
                room_revenue,
                adr: if rooms_sold == 0 {
                    0.0
                } else {
                    round_money(room_revenue / rooms_sold as f64)
                },
                revpar: if available_rooms == 0 {
                    0.0
                } else {
                    round_money(room_revenue / available_rooms as f64)
                },
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRow {
    pub channel: Channel,
    pub bookings: u32,
    pub room_nights: i64,
    pub revenue: f64,
    pub revenue_share_pct: f64,
}

impl ChannelRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "channel",
        "bookings",
        "room_nights",
        "revenue",
        "revenue_share_pct",
    ];
}

pub fn channel_revenue(bookings: &[Booking]) -> Vec<ChannelRow> {
    let mut by_channel: BTreeMap<Channel, (u32, i64, f64)> = BTreeMap::new();

    for booking in bookings.iter().filter(|b| b.status.counts_as_sold()) {
        let entry = by_channel.entry(booking.channel).or_default();
        entry.0 += 1;
        entry.1 += booking.nights();
        entry.2 += booking.total_amount;
    }

    let total: f64 = by_channel.values().map(|(_, _, revenue)| revenue).sum();

    by_channel
        .into_iter()
        .map(|(channel, (count, nights, revenue))| ChannelRow {
            channel,
            bookings: count,
            room_nights: nights,
            revenue: round_money(revenue),
            revenue_share_pct: pct(revenue, total),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestRow {
    pub guest_id: String,
    pub name: Option<String>,
    pub vip: bool,
    pub stays: u32,
    pub nights: i64,
    pub revenue: f64,
    pub last_check_out: Option<NaiveDate>,
}

impl GuestRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "guest_id",
        "name",
        "vip",
        "stays",
        "nights",
        "revenue",
        "last_check_out",
    ];
}

/// 依營收排序的常客統計
pub fn guest_stats(bookings: &[Booking], guests: &[Guest], top_n: usize) -> Vec<GuestRow> {
    let directory: HashMap<&str, &Guest> = guests.iter().map(|g| (g.id.as_str(), g)).collect();
    let mut rows: HashMap<&str, GuestRow> = HashMap::new();

    for booking in bookings.iter().filter(|b| b.status.counts_as_sold()) {
        let row = rows.entry(booking.guest_id.as_str()).or_insert_with(|| {
            let guest = directory.get(booking.guest_id.as_str());
            GuestRow {
                guest_id: booking.guest_id.clone(),
                name: guest.map(|g| g.name.clone()),
                vip: guest.map(|g| g.vip).unwrap_or(false),
                stays: 0,
                nights: 0,
                revenue: 0.0,
                last_check_out: None,
            }
        });

        row.stays += 1;
        row.nights += booking.nights();
        row.revenue = round_money(row.revenue + booking.total_amount);
        row.last_check_out = row.last_check_out.max(Some(booking.check_out));
    }

    let mut rows: Vec<GuestRow> = rows.into_values().collect();
    rows.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.guest_id.cmp(&b.guest_id))
    });
    rows.truncate(top_n);
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousekeepingRow {
    pub floor: Option<i32>,
    pub status: RoomStatus,
    pub rooms: u32,
}

impl HousekeepingRow {
    pub const COLUMNS: &'static [&'static str] = &["floor", "status", "rooms"];
}

/// 房務看板：整體（floor = None）與各樓層的房態數量
pub fn housekeeping_board(rooms: &[Room]) -> Vec<HousekeepingRow> {
    let mut totals: HashMap<RoomStatus, u32> = HashMap::new();
    let mut per_floor: BTreeMap<i32, HashMap<RoomStatus, u32>> = BTreeMap::new();

    for room in rooms {
        *totals.entry(room.status).or_default() += 1;
        *per_floor.entry(room.floor).or_default().entry(room.status).or_default() += 1;
    }

    let mut rows: Vec<HousekeepingRow> = RoomStatus::ALL
        .iter()
        .map(|status| HousekeepingRow {
            floor: None,
            status: *status,
            rooms: totals.get(status).copied().unwrap_or(0),
        })
        .collect();

    for (floor, counts) in per_floor {
        for status in RoomStatus::ALL {
            if let Some(count) = counts.get(&status) {
                rows.push(HousekeepingRow {
                    floor: Some(floor),
                    status,
                    rooms: *count,
                });
            }
        }
    }

    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "0-30")]
    Current,
    #[serde(rename = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    Days61To90,
    #[serde(rename = "90+")]
    Over90,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 4] = [
        AgingBucket::Current,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Over90,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgingBucket::Current => "0-30",
            AgingBucket::Days31To60 => "31-60",
            AgingBucket::Days61To90 => "61-90",
            AgingBucket::Over90 => "90+",
        }
    }

    pub fn for_age(days: i64) -> Self {
        match days {
            i64::MIN..=30 => AgingBucket::Current,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingRow {
    pub folio_id: String,
    pub booking_id: Option<String>,
    pub guest_id: Option<String>,
    pub age_days: i64,
    pub bucket: AgingBucket,
    pub balance: f64,
}

impl AgingRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "folio_id",
        "booking_id",
        "guest_id",
        "age_days",
        "bucket",
        "balance",
    ];
}

/// 未結帳夾的應收帳齡；只列餘額為正的開啟帳夾，最舊的在前
pub fn folio_aging(folios: &[Folio], as_of: NaiveDate) -> Vec<AgingRow> {
    let mut rows: Vec<AgingRow> = folios
        .iter()
        .filter(|f| f.is_open())
        .filter_map(|f| {
            let balance = f.balance();
            if balance <= 0.0 {
                return None;
            }
            let age_days = (as_of - f.opened_at.date_naive()).num_days().max(0);
            Some(AgingRow {
                folio_id: f.id.clone(),
                booking_id: f.booking_id.clone(),
                guest_id: f.guest_id.clone(),
                age_days,
                bucket: AgingBucket::for_age(age_days),
                balance,
            })
        })
        .collect();

    rows.sort_by(|a, b| b.age_days.cmp(&a.age_days).then_with(|| a.folio_id.cmp(&b.folio_id)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingTotalRow {
    pub bucket: String,
    pub folios: u32,
    pub balance: f64,
}

impl AgingTotalRow {
    pub const COLUMNS: &'static [&'static str] = &["bucket", "folios", "balance"];
}

/// 各帳齡區間的帳夾數與餘額合計；每個區間都列出，最後一列為總計
pub fn aging_totals(rows: &[AgingRow]) -> Vec<AgingTotalRow> {
    let mut totals: BTreeMap<AgingBucket, (u32, f64)> = AgingBucket::ALL.iter().map(|b| (*b, (0, 0.0))).collect();
    for row in rows {
        let entry = totals.entry(row.bucket).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 = round_money(entry.1 + row.balance);
    }

    let mut out: Vec<AgingTotalRow> = totals
        .into_iter()
        .map(|(bucket, (folios, balance))| AgingTotalRow {
            bucket: bucket.as_str().to_string(),
            folios,
            balance,
        })
        .collect();

    let folios = out.iter().map(|r| r.folios).sum();
    let balance = round_money(out.iter().map(|r| r.balance).sum());
    out.push(AgingTotalRow {
        bucket: "total".to_string(),
        folios,
        balance,
    });
    out
}

/// 房價建議的門檻（住房率 %）與調整幅度（%）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateThresholds {
    pub high_occupancy: f64,
    pub mid_occupancy: f64,
    pub low_occupancy: f64,
    pub high_adjust_pct: f64,
    pub mid_adjust_pct: f64,
    pub low_adjust_pct: f64,
}

impl Default for RateThresholds {
    fn default() -> Self {
        Self {
            high_occupancy: 90.0,
            mid_occupancy: 75.0,
            low_occupancy: 40.0,
            high_adjust_pct: 15.0,
            mid_adjust_pct: 8.0,
            low_adjust_pct: -10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    pub date: NaiveDate,
    pub occupancy_pct: f64,
    pub current_adr: f64,
    pub adjustment_pct: f64,
    pub suggested_rate: Option<f64>,
    pub signal: String,
}

impl RateRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "date",
        "occupancy_pct",
        "current_adr",
        "adjustment_pct",
        "suggested_rate",
        "signal",
    ];
}

/// 依預訂住房率建議房價調整；只看 `from` 之後（含）的日期
pub fn rate_recommendations(
    occupancy: &[OccupancyRow],
    from: NaiveDate,
    thresholds: &RateThresholds,
) -> Vec<RateRow> {
    occupancy
        .iter()
        .filter(|row| row.date >= from)
        .map(|row| {
            let (adjustment_pct, signal) = if row.occupancy_pct >= thresholds.high_occupancy {
                (thresholds.high_adjust_pct, "high_demand")
            } else if row.occupancy_pct >= thresholds.mid_occupancy {
                (thresholds.mid_adjust_pct, "strong_demand")
            } else if row.occupancy_pct < thresholds.low_occupancy {
                (thresholds.low_adjust_pct, "low_demand")
            } else {
                (0.0, "steady")
            };

            let suggested_rate = (row.adr > 0.0)
                .then(|| round_money(row.adr * (1.0 + adjustment_pct / 100.0)));

            RateRow {
                date: row.date,
                occupancy_pct: row.occupancy_pct,
                current_adr: row.adr,
                adjustment_pct,
                suggested_rate,
                signal: signal.to_string(),
            }
        })
        .collect()
}

/// 統計窗口：營業日往前 `days_back`、往後 `days_forward`
pub fn window(anchor: NaiveDate, days_back: i64, days_forward: i64) -> (NaiveDate, NaiveDate) {
    let from = anchor
        .checked_sub_days(Days::new(days_back.max(0) as u64))
        .unwrap_or(anchor);
    let to = anchor
        .checked_add_days(Days::new(days_forward.max(0) as u64))
        .unwrap_or(anchor);
    (from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BookingStatus, ChargeCategory, FolioCharge, FolioStatus, Payment, TenantId};
    use chrono::{TimeZone, Utc};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn room(id: &str, floor: i32, status: RoomStatus) -> Room {
        Room {
            id: id.to_string(),
            tenant_id: TenantId::new("hotel-a"),
            room_number: id.to_string(),
            room_type: "standard".to_string(),
            floor,
            status,
            base_price: 100.0,
        }
    }

    fn booking(id: &str, guest: &str, check_in: &str, check_out: &str, total: f64, status: BookingStatus, channel: Channel) -> Booking {
        Booking {
            id: id.to_string(),
            tenant_id: TenantId::new("hotel-a"),
            guest_id: guest.to_string(),
            room_id: None,
            check_in: d(check_in),
            check_out: d(check_out),
            status,
            total_amount: total,
            rate: None,
            channel,
            guaranteed: false,
        }
    }

    #[test]
    fn test_daily_occupancy() {
        let rooms = vec![
            room("101", 1, RoomStatus::Occupied),
            room("102", 1, RoomStatus::Available),
            room("103", 1, RoomStatus::Dirty),
            room("104", 1, RoomStatus::OutOfOrder),
        ];
        let bookings = vec![
            booking("b1", "g1", "2024-06-01", "2024-06-03", 200.0, BookingStatus::CheckedIn, Channel::Direct),
            booking("b2", "g2", "2024-06-02", "2024-06-03", 150.0, BookingStatus::Confirmed, Channel::Ota),
            booking("b3", "g3", "2024-06-02", "2024-06-04", 400.0, BookingStatus::Cancelled, Channel::Ota),
        ];

        let rows = daily_occupancy(&bookings, &rooms, d("2024-06-01"), d("2024-06-03"));
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].rooms_sold, 1);
        assert_eq!(rows[0].available_rooms, 3);
        assert_eq!(rows[0].occupancy_pct, 33.33);

        assert_eq!(rows[1].rooms_sold, 2);
        assert_eq!(rows[1].room_revenue, 250.0);
        assert_eq!(rows[1].adr, 125.0);
        assert_eq!(rows[1].revpar, 83.33);

        // 退房日不計
        assert_eq!(rows[2].rooms_sold, 0);
        assert_eq!(rows[2].adr, 0.0);
    }

    fn keys<T: Serialize>(row: &T) -> Vec<String> {
        match serde_json::to_value(row).unwrap() {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_columns_follow_serialized_fields() {
        let rooms = vec![room("101", 1, RoomStatus::Occupied)];
        let bookings = vec![booking("b1", "g1", "2024-06-01", "2024-06-03", 300.0, BookingStatus::CheckedIn, Channel::Direct)];
        let occupancy = daily_occupancy(&bookings, &rooms, d("2024-06-01"), d("2024-06-01"));
        let aging = AgingRow {
            folio_id: "f1".to_string(),
            booking_id: None,
            guest_id: None,
            age_days: 3,
            bucket: AgingBucket::Current,
            balance: 10.0,
        };

        assert_eq!(keys(&occupancy[0]), OccupancyRow::COLUMNS);
        assert_eq!(keys(&channel_revenue(&bookings)[0]), ChannelRow::COLUMNS);
        assert_eq!(keys(&guest_stats(&bookings, &[], 1)[0]), GuestRow::COLUMNS);
        assert_eq!(keys(&housekeeping_board(&rooms)[0]), HousekeepingRow::COLUMNS);
        assert_eq!(keys(&aging), AgingRow::COLUMNS);
        assert_eq!(keys(&aging_totals(&[aging.clone()])[0]), AgingTotalRow::COLUMNS);
        let rates = rate_recommendations(&occupancy, d("2024-06-01"), &RateThresholds::default());
        assert_eq!(keys(&rates[0]), RateRow::COLUMNS);
    }

    #[test]
    fn test_channel_revenue_excludes_cancellations() {
        let bookings = vec![
            booking("b1", "g1", "2024-06-01", "2024-06-03", 300.0, BookingStatus::CheckedOut, Channel::Direct),
            booking("b2", "g2", "2024-06-01", "2024-06-02", 100.0, BookingStatus::Confirmed, Channel::Ota),
            booking("b3", "g3", "2024-06-01", "2024-06-02", 999.0, BookingStatus::NoShow, Channel::Ota),
        ];

        let rows = channel_revenue(&bookings);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].channel, Channel::Direct);
        assert_eq!(rows[0].room_nights, 2);
        assert_eq!(rows[0].revenue_share_pct, 75.0);
        assert_eq!(rows[1].channel, Channel::Ota);
        assert_eq!(rows[1].revenue, 100.0);
    }

    #[test]
    fn test_guest_stats_sorted_by_revenue() {
        let guests = vec![Guest {
            id: "g2".to_string(),
            tenant_id: TenantId::new("hotel-a"),
            name: "Grace Hopper".to_string(),
            email: None,
            vip: true,
        }];
        let bookings = vec![
            booking("b1", "g1", "2024-01-01", "2024-01-02", 100.0, BookingStatus::CheckedOut, Channel::Direct),
            booking("b2", "g2", "2024-02-01", "2024-02-03", 250.0, BookingStatus::CheckedOut, Channel::Direct),
            booking("b3", "g2", "2024-03-01", "2024-03-02", 90.0, BookingStatus::CheckedOut, Channel::Direct),
            booking("b4", "g3", "2024-03-01", "2024-03-02", 80.0, BookingStatus::Cancelled, Channel::Direct),
        ];

        let rows = guest_stats(&bookings, &guests, 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].guest_id, "g2");
        assert_eq!(rows[0].name.as_deref(), Some("Grace Hopper"));
        assert!(rows[0].vip);
        assert_eq!(rows[0].stays, 2);
        assert_eq!(rows[0].nights, 3);
        assert_eq!(rows[0].revenue, 340.0);
        assert_eq!(rows[0].last_check_out, Some(d("2024-03-02")));

        assert_eq!(guest_stats(&bookings, &guests, 1).len(), 1);
    }

    #[test]
    fn test_housekeeping_board() {
        let rooms = vec![
            room("101", 1, RoomStatus::Dirty),
            room("102", 1, RoomStatus::Dirty),
            room("201", 2, RoomStatus::Inspected),
        ];

        let rows = housekeeping_board(&rooms);
        let dirty_total = rows
            .iter()
            .find(|r| r.floor.is_none() && r.status == RoomStatus::Dirty)
            .unwrap();
        assert_eq!(dirty_total.rooms, 2);

        let floor_rows: Vec<&HousekeepingRow> = rows.iter().filter(|r| r.floor.is_some()).collect();
        assert_eq!(floor_rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.floor.is_none()).count(), RoomStatus::ALL.len());
    }

    #[test]
    fn test_folio_aging_buckets() {
        let as_of = d("2024-06-30");
        let folio = |id: &str, opened: (i32, u32, u32), charge: f64, paid: f64, status: FolioStatus| Folio {
            id: id.to_string(),
            tenant_id: TenantId::new("hotel-a"),
            booking_id: None,
            guest_id: None,
            status,
            opened_at: Utc.with_ymd_and_hms(opened.0, opened.1, opened.2, 12, 0, 0).unwrap(),
            charges: vec![FolioCharge {
                id: format!("{}-c", id),
                reference: None,
                category: ChargeCategory::Room,
                description: String::new(),
                amount: charge,
                date: as_of,
                voided: false,
            }],
            payments: vec![Payment {
                id: format!("{}-p", id),
                amount: paid,
                method: "card".to_string(),
                date: as_of,
            }],
        };

        let folios = vec![
            folio("f1", (2024, 6, 20), 100.0, 0.0, FolioStatus::Open),
            folio("f2", (2024, 5, 1), 300.0, 100.0, FolioStatus::Open),
            folio("f3", (2024, 1, 1), 50.0, 0.0, FolioStatus::Open),
            folio("f4", (2024, 6, 1), 80.0, 80.0, FolioStatus::Open),
            folio("f5", (2024, 1, 1), 500.0, 0.0, FolioStatus::Closed),
        ];

        let rows = folio_aging(&folios, as_of);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].folio_id, "f3");
        assert_eq!(rows[0].bucket, AgingBucket::Over90);
        assert_eq!(rows[1].bucket, AgingBucket::Days31To60);
        assert_eq!(rows[2].bucket, AgingBucket::Current);

        let totals = aging_totals(&rows);
        let buckets: Vec<&str> = totals.iter().map(|t| t.bucket.as_str()).collect();
        assert_eq!(buckets, vec!["0-30", "31-60", "61-90", "90+", "total"]);
        assert_eq!(totals[1].balance, 200.0);
        assert_eq!(totals[2].folios, 0);
        assert_eq!(totals[4].folios, 3);
        assert_eq!(totals[4].balance, 350.0);
        assert_eq!(serde_json::to_string(&AgingBucket::Over90).unwrap(), "\"90+\"");
    }

    #[test]
    fn test_rate_recommendations() {
        let row = |date: &str, occupancy: f64, adr: f64| OccupancyRow {
            date: d(date),
            rooms_sold: 0,
            available_rooms: 10,
            occupancy_pct: occupancy,
            room_revenue: 0.0,
            adr,
            revpar: 0.0,
        };
        let occupancy = vec![
            row("2024-06-01", 95.0, 100.0),
            row("2024-06-02", 95.0, 100.0),
            row("2024-06-03", 80.0, 100.0),
            row("2024-06-04", 50.0, 100.0),
            row("2024-06-05", 20.0, 0.0),
        ];

        let rows = rate_recommendations(&occupancy, d("2024-06-02"), &RateThresholds::default());
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].signal, "high_demand");
        assert_eq!(rows[0].suggested_rate, Some(115.0));
        assert_eq!(rows[1].adjustment_pct, 8.0);
        assert_eq!(rows[2].signal, "steady");
        assert_eq!(rows[3].adjustment_pct, -10.0);
        assert_eq!(rows[3].suggested_rate, None);
    }

    #[test]
    fn test_window() {
        let (from, to) = window(d("2024-03-01"), 1, 2);
        assert_eq!(from, d("2024-02-29"));
        assert_eq!(to, d("2024-03-03"));
    }
}
