//! `--demo` 用的小型飯店資料，讓 CLI 不連線 PMS 也能跑完整流程。

use crate::adapters::memory::InMemoryPms;
use crate::config::pms_config::PmsConfig;
use crate::domain::model::{
    Booking, BookingStatus, Channel, ChargeCategory, Folio, FolioCharge, FolioStatus, Guest, Payment, Room,
    RoomStatus, TenantId,
};
use crate::utils::error::Result;
use chrono::{Days, NaiveDate, Utc};

pub const DEMO_TENANT: &str = "demo-hotel";

const DEMO_CONFIG: &str = r#"
[[tenants]]
id = "demo-hotel"
name = "Harbour View Demo"

[api]
base_url = "http://localhost:8000"

[audit]
tax_rate = 0.1
no_show_fee_percent = 100.0
on_step_failure = "continue"
"#;

pub fn demo_config() -> Result<PmsConfig> {
    PmsConfig::from_toml_str(DEMO_CONFIG)
}

fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    if days >= 0 {
        date.checked_add_days(Days::new(days as u64)).unwrap_or(date)
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs())).unwrap_or(date)
    }
}

/// 建立示範資料，訂房日期以營業日為基準
pub async fn seed_demo_hotel(pms: &InMemoryPms, business_date: NaiveDate) {
    let tenant = TenantId::new(DEMO_TENANT);
    pms.set_business_date(&tenant, business_date).await;

    let rooms = [
        ("r101", "101", "double", 1, RoomStatus::Occupied, 120.0),
        ("r102", "102", "double", 1, RoomStatus::Occupied, 120.0),
        ("r103", "103", "twin", 1, RoomStatus::Available, 110.0),
        ("r201", "201", "suite", 2, RoomStatus::Occupied, 260.0),
        ("r202", "202", "suite", 2, RoomStatus::Dirty, 260.0),
        ("r203", "203", "twin", 2, RoomStatus::OutOfOrder, 110.0),
    ];
    for (id, number, room_type, floor, status, price) in rooms {
        pms.add_room(Room {
            id: id.to_string(),
            tenant_id: tenant.clone(),
            room_number: number.to_string(),
            room_type: room_type.to_string(),
            floor,
            status,
            base_price: price,
        })
        .await;
    }

    let guests = [
        ("g1", "Ada Lovelace", true),
        ("g2", "Alan Turing", false),
        ("g3", "Grace Hopper", false),
        ("g4", "Edsger Dijkstra", false),
    ];
    for (id, name, vip) in guests {
        pms.add_guest(Guest {
            id: id.to_string(),
            tenant_id: tenant.clone(),
            name: name.to_string(),
            email: Some(format!("{}@example.com", id)),
            vip,
        })
        .await;
    }

    // (id, guest, room, check_in offset, nights, status, total, channel, guaranteed)
    let bookings = [
        ("b1", "g1", Some("r101"), -2, 4, BookingStatus::CheckedIn, 480.0, Channel::Direct, false),
        ("b2", "g2", Some("r201"), -1, 2, BookingStatus::CheckedIn, 520.0, Channel::Ota, false),
        ("b3", "g3", None, 0, 2, BookingStatus::Guaranteed, 220.0, Channel::Corporate, true),
        ("b4", "g4", None, 0, 1, BookingStatus::Confirmed, 110.0, Channel::Ota, false),
        ("b5", "g1", Some("r202"), 3, 3, BookingStatus::Confirmed, 780.0, Channel::Direct, false),
        ("b6", "g2", Some("r102"), -5, 3, BookingStatus::CheckedOut, 360.0, Channel::WalkIn, false),
    ];
    for (id, guest, room, offset, nights, status, total, channel, guaranteed) in bookings {
        let check_in = shift(business_date, offset);
        pms.add_booking(Booking {
            id: id.to_string(),
            tenant_id: tenant.clone(),
            guest_id: guest.to_string(),
            room_id: room.map(str::to_string),
            check_in,
            check_out: shift(check_in, nights),
            status,
            total_amount: total,
            rate: None,
            channel,
            guaranteed,
        })
        .await;
    }

    let opened = Utc::now();
    let folio = |id: &str, booking: &str, guest: &str, opened_days_ago: u64| Folio {
        id: id.to_string(),
        tenant_id: tenant.clone(),
        booking_id: Some(booking.to_string()),
        guest_id: Some(guest.to_string()),
        status: FolioStatus::Open,
        opened_at: opened.checked_sub_days(Days::new(opened_days_ago)).unwrap_or(opened),
        charges: Vec::new(),
        payments: Vec::new(),
    };

    let mut b1 = folio("f1", "b1", "g1", 2);
    b1.charges.push(FolioCharge {
        id: "seed-1".to_string(),
        reference: Some(format!("room:b1:{}", shift(business_date, -1))),
        category: ChargeCategory::Room,
        description: "Room charge".to_string(),
        amount: 120.0,
        date: shift(business_date, -1),
        voided: false,
    });
    b1.payments.push(Payment {
        id: "pay-1".to_string(),
        amount: 50.0,
        method: "card".to_string(),
        date: shift(business_date, -2),
    });
    pms.add_folio(b1).await;
    pms.add_folio(folio("f2", "b2", "g2", 1)).await;
    pms.add_folio(folio("f3", "b3", "g3", 40)).await;

    let mut old = folio("f6", "b6", "g2", 95);
    old.charges.push(FolioCharge {
        id: "seed-2".to_string(),
        reference: Some("minibar:b6".to_string()),
        category: ChargeCategory::Minibar,
        description: "Minibar".to_string(),
        amount: 42.5,
        date: shift(business_date, -3),
        voided: false,
    });
    pms.add_folio(old).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::PmsApi;

    #[tokio::test]
    async fn test_demo_seed() {
        let pms = InMemoryPms::new();
        let date: NaiveDate = "2024-04-10".parse().unwrap();
        seed_demo_hotel(&pms, date).await;

        let tenant = TenantId::new(DEMO_TENANT);
        assert_eq!(pms.business_date(&tenant).await.unwrap(), date);
        assert_eq!(pms.list_rooms(&tenant).await.unwrap().len(), 6);
        assert_eq!(pms.list_bookings(&tenant).await.unwrap().len(), 6);
        assert_eq!(pms.list_folios(&tenant).await.unwrap().len(), 4);

        let config = demo_config().unwrap();
        assert_eq!(config.active_tenants(), vec![tenant]);
    }
}
