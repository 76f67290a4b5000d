use anyhow::Result;
use chrono::{NaiveDate, Utc};
use pms_ops::domain::model::{
    Booking, BookingStatus, Channel, ChargeCategory, Folio, FolioStatus, Room, RoomStatus, TenantId,
};
use pms_ops::domain::ports::PmsApi;
use pms_ops::{AuditOptions, InMemoryPms, LocalStorage, NightAuditRunner, PmsConfig};
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn config(extra: &str) -> PmsConfig {
    PmsConfig::from_toml_str(&format!(
        r#"
[[tenants]]
id = "hotel-a"

[[tenants]]
id = "hotel-b"

[api]
base_url = "https://pms.example.com"

[audit]
tax_rate = 0.1
step_retry_attempts = 2
step_retry_delay_seconds = 0
{}
"#,
        extra
    ))
    .unwrap()
}

/// 一間三房的小飯店：一位在住、一位保證訂房未到、一間無人入住卻標記 occupied
async fn seed(pms: &InMemoryPms, tenant: &TenantId) {
    pms.set_business_date(tenant, date("2024-04-10")).await;

    for (id, status) in [("r1", RoomStatus::Occupied), ("r2", RoomStatus::Occupied), ("r3", RoomStatus::Available)] {
        pms.add_room(Room {
            id: id.to_string(),
            tenant_id: tenant.clone(),
            room_number: id.trim_start_matches('r').to_string(),
            room_type: "double".to_string(),
            floor: 1,
            status,
            base_price: 100.0,
        })
        .await;
    }

    let booking = |id: &str, room: Option<&str>, status: BookingStatus, check_in: &str, check_out: &str| Booking {
        id: id.to_string(),
        tenant_id: tenant.clone(),
        guest_id: format!("g-{}", id),
        room_id: room.map(str::to_string),
        check_in: date(check_in),
        check_out: date(check_out),
        status,
        total_amount: 300.0,
        rate: None,
        channel: Channel::Direct,
        guaranteed: false,
    };

    pms.add_booking(booking("b1", Some("r1"), BookingStatus::CheckedIn, "2024-04-09", "2024-04-12"))
        .await;
    pms.add_booking(booking("b2", None, BookingStatus::Guaranteed, "2024-04-10", "2024-04-12"))
        .await;

    for (id, booking_id) in [("f1", "b1"), ("f2", "b2")] {
        pms.add_folio(Folio {
            id: id.to_string(),
            tenant_id: tenant.clone(),
            booking_id: Some(booking_id.to_string()),
            guest_id: None,
            status: FolioStatus::Open,
            opened_at: Utc::now(),
            charges: Vec::new(),
            payments: Vec::new(),
        })
        .await;
    }
}

fn read_zip_entry(path: &std::path::Path, name: &str) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive.by_name(name)?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

#[tokio::test]
async fn test_full_night_audit() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;

    let runner = NightAuditRunner::new(pms.clone(), LocalStorage::new(temp_dir.path()), &config(""));
    let report = runner.run_tenant(&tenant, &AuditOptions::default()).await?;

    assert!(report.is_clean());
    assert_eq!(report.next_business_date, Some(date("2024-04-11")));
    assert_eq!(pms.business_date(&tenant).await?, date("2024-04-11"));

    // 在住：房費 100 + 稅 10
    let f1 = pms.folio(&tenant, "f1").await.unwrap();
    assert!(f1.has_reference("room:b1:2024-04-10"));
    assert!(f1.has_reference("tax:b1:2024-04-10"));
    assert_eq!(f1.balance(), 110.0);

    // 保證訂房未到：no-show 與一晚房費
    assert_eq!(pms.booking(&tenant, "b2").await.unwrap().status, BookingStatus::NoShow);
    let f2 = pms.folio(&tenant, "f2").await.unwrap();
    assert_eq!(f2.charges.len(), 1);
    assert_eq!(f2.charges[0].category, ChargeCategory::NoShowFee);
    assert_eq!(f2.charges[0].amount, 150.0);

    // 無人入住的 occupied 房轉 dirty
    assert_eq!(pms.room(&tenant, "r2").await.unwrap().status, RoomStatus::Dirty);
    assert_eq!(pms.room(&tenant, "r1").await.unwrap().status, RoomStatus::Occupied);

    let archive = temp_dir.path().join(&report.report_path);
    assert!(report.report_path.starts_with("night_audit/hotel-a/2024-04-10_"));
    let summary: serde_json::Value = serde_json::from_str(&read_zip_entry(&archive, "summary.json")?)?;
    assert_eq!(summary["next_business_date"], "2024-04-11");
    assert_eq!(summary["summary"]["total_actions"], 6);

    let actions = read_zip_entry(&archive, "actions.csv")?;
    assert_eq!(actions.lines().count(), 7);
    assert!(actions.contains("no_show:b2"));
    assert!(actions.contains("close_day"));

    let exceptions = read_zip_entry(&archive, "exceptions.csv")?;
    assert_eq!(exceptions.lines().next(), Some("step,entity,entity_id,message"));

    Ok(())
}

#[tokio::test]
async fn test_dry_run_changes_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;

    let runner = NightAuditRunner::new(pms.clone(), LocalStorage::new(temp_dir.path()), &config(""));
    let report = runner
        .run_tenant(
            &tenant,
            &AuditOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await?;

    assert!(report.dry_run);
    assert_eq!(report.summary["total_actions"], 6);
    assert!(!report.day_closed());
    assert_eq!(pms.business_date(&tenant).await?, date("2024-04-10"));
    assert!(pms.folio(&tenant, "f1").await.unwrap().charges.is_empty());
    assert!(!pms.calls().await.iter().any(|c| c.starts_with("post_charge")));

    Ok(())
}

#[tokio::test]
async fn test_rerun_does_not_double_post() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;

    let runner = NightAuditRunner::new(pms.clone(), LocalStorage::new(temp_dir.path()), &config(""));
    let options = AuditOptions {
        only: vec!["room_charges".to_string()],
        ..Default::default()
    };

    runner.run_tenant(&tenant, &options).await?;
    let second = runner.run_tenant(&tenant, &options).await?;

    assert_eq!(second.summary["total_actions"], 0);
    assert_eq!(pms.folio(&tenant, "f1").await.unwrap().charges.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_continue_policy_skips_day_close() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;
    pms.fail_next("update_booking_status", 1).await;

    let runner = NightAuditRunner::new(
        pms.clone(),
        LocalStorage::new(temp_dir.path()),
        &config(r#"on_step_failure = "continue""#),
    );
    let report = runner.run_tenant(&tenant, &AuditOptions::default()).await?;

    let statuses: Vec<String> = report
        .steps
        .iter()
        .map(|s| serde_json::to_value(s.status).unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["failed", "succeeded", "succeeded", "skipped"]);
    assert!(!report.is_clean());
    assert_eq!(pms.business_date(&tenant).await?, date("2024-04-10"));

    // no_shows 失敗前已過帳的 no-show 費仍列在報表中
    assert_eq!(report.steps[0].actions, 1);
    assert!(pms.folio(&tenant, "f2").await.unwrap().has_reference("no_show:b2"));
    let actions = read_zip_entry(&temp_dir.path().join(&report.report_path), "actions.csv")?;
    assert!(actions.lines().any(|line| line.starts_with("no_shows,post_charge") && line.contains("no_show:b2")));

    Ok(())
}

#[tokio::test]
async fn test_retry_policy_recovers_from_transient_errors() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;
    pms.fail_next("close_business_day", 1).await;

    let runner = NightAuditRunner::new(
        pms.clone(),
        LocalStorage::new(temp_dir.path()),
        &config(r#"on_step_failure = "retry""#),
    );

    let report = runner.run_tenant(&tenant, &AuditOptions::default()).await?;
    let close = report.steps.iter().find(|s| s.step_name == "close_day").unwrap();
    assert_eq!(close.attempts, 2);
    assert!(report.is_clean());
    assert_eq!(report.next_business_date, Some(date("2024-04-11")));

    Ok(())
}

#[tokio::test]
async fn test_failed_fee_post_is_recovered() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;
    pms.fail_next("post_charge", 1).await;

    let runner = NightAuditRunner::new(
        pms.clone(),
        LocalStorage::new(temp_dir.path()),
        &config(r#"on_step_failure = "retry""#),
    );
    let report = runner.run_tenant(&tenant, &AuditOptions::default()).await?;

    assert!(report.is_clean());
    assert_eq!(pms.booking(&tenant, "b2").await.unwrap().status, BookingStatus::NoShow);
    assert!(pms.folio(&tenant, "f2").await.unwrap().has_reference("no_show:b2"));

    Ok(())
}

#[tokio::test]
async fn test_rerun_posts_fee_for_existing_no_show() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;
    // 前一次夜審只完成了狀態更新
    pms.update_booking_status(&tenant, "b2", BookingStatus::NoShow).await?;

    let runner = NightAuditRunner::new(pms.clone(), LocalStorage::new(temp_dir.path()), &config(""));
    let options = AuditOptions {
        only: vec!["no_shows".to_string()],
        ..Default::default()
    };
    let first = runner.run_tenant(&tenant, &options).await?;
    let second = runner.run_tenant(&tenant, &options).await?;

    assert_eq!(first.summary["total_actions"], 1);
    assert_eq!(second.summary["total_actions"], 0);
    let f2 = pms.folio(&tenant, "f2").await.unwrap();
    assert_eq!(f2.charges.len(), 1);
    assert_eq!(f2.charges[0].amount, 150.0);

    Ok(())
}

#[tokio::test]
async fn test_stop_policy_aborts_tenant() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let tenant = TenantId::new("hotel-a");
    seed(&pms, &tenant).await;
    pms.fail_next("post_charge", 1).await;

    let runner = NightAuditRunner::new(pms.clone(), LocalStorage::new(temp_dir.path()), &config(""));
    let err = runner
        .run_tenant(&tenant, &AuditOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, pms_ops::PmsError::StepFailed { ref step, .. } if step == "no_shows"));
    assert_eq!(pms.business_date(&tenant).await?, date("2024-04-10"));

    Ok(())
}

#[tokio::test]
async fn test_tenants_are_audited_independently() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pms = Arc::new(InMemoryPms::new());
    let hotel_a = TenantId::new("hotel-a");
    let hotel_b = TenantId::new("hotel-b");
    seed(&pms, &hotel_a).await;
    // hotel-b 沒有營業日，取日期就失敗

    let config = config("");
    let runner = NightAuditRunner::new(pms.clone(), LocalStorage::new(temp_dir.path()), &config);
    let outcomes = runner.run_all(&config.active_tenants(), &AuditOptions::default()).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, hotel_a);
    assert!(outcomes[0].1.is_ok());
    assert_eq!(outcomes[1].0, hotel_b);
    assert!(matches!(outcomes[1].1, Err(pms_ops::PmsError::NotFound { .. })));

    // hotel-b 的失敗不影響 hotel-a
    assert_eq!(pms.business_date(&hotel_a).await?, date("2024-04-11"));

    Ok(())
}
