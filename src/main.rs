use clap::Parser;
use pms_ops::adapters::cache::connect_cache_store;
use pms_ops::app::demo;
use pms_ops::config::{Cli, Command};
use pms_ops::domain::model::TenantId;
use pms_ops::domain::ports::PmsApi;
use pms_ops::utils::{logger, validation::Validate};
use pms_ops::{
    AuditOptions, CacheAside, HttpPmsClient, InMemoryPms, LocalStorage, NightAuditRunner, PmsConfig, ViewRefresher,
    ViewSettings,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("🚀 Starting pms-ops");

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config, e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    if let Err(e) = run(&cli, &config).await {
        tracing::error!(
            "❌ pms-ops failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        std::process::exit(e.severity().exit_code());
    }

    Ok(())
}

/// --demo 且設定檔不存在時使用內建的示範設定
fn load_config(cli: &Cli) -> pms_ops::Result<PmsConfig> {
    if cli.demo && !Path::new(&cli.config).exists() {
        tracing::info!("🧪 Using built-in demo configuration");
        return demo::demo_config();
    }

    tracing::info!("📁 Loading configuration from: {}", cli.config);
    PmsConfig::from_file(&cli.config)
}

fn select_tenants(cli: &Cli, config: &PmsConfig) -> pms_ops::Result<Vec<TenantId>> {
    config.select_tenants(cli.tenant_filter())
}

async fn build_api(cli: &Cli, config: &PmsConfig) -> pms_ops::Result<Arc<dyn PmsApi>> {
    if cli.demo {
        let pms = InMemoryPms::new();
        demo::seed_demo_hotel(&pms, chrono::Utc::now().date_naive()).await;
        tracing::info!("🧪 Demo mode: using in-memory PMS for tenant {}", demo::DEMO_TENANT);
        return Ok(Arc::new(pms));
    }

    Ok(Arc::new(HttpPmsClient::new(config.api.clone())?))
}

async fn run(cli: &Cli, config: &PmsConfig) -> pms_ops::Result<()> {
    let tenants = select_tenants(cli, config)?;

    match &cli.command {
        Command::Plan => {
            print_plan(config, &tenants);
            Ok(())
        }
        Command::Audit {
            business_date,
            dry_run,
            only,
            skip,
            ..
        } => {
            let api = build_api(cli, config).await?;
            let storage = LocalStorage::new(config.report_path());
            let runner = NightAuditRunner::new(api, storage, config).with_monitoring(cli.monitor);
            let options = AuditOptions {
                business_date: *business_date,
                dry_run: *dry_run,
                only: only.clone(),
                skip: skip.clone(),
            };

            if *dry_run {
                tracing::info!("🔍 DRY RUN MODE - actions are planned but not sent to the PMS");
            }

            let outcomes = runner.run_all(&tenants, &options).await;
            let mut first_error = None;
            for (tenant, outcome) in outcomes {
                match outcome {
                    Ok(report) => {
                        println!(
                            "✅ {} {}: {} actions, {} exceptions{}",
                            tenant,
                            report.business_date,
                            report.summary.get("total_actions").cloned().unwrap_or_default(),
                            report.summary.get("total_exceptions").cloned().unwrap_or_default(),
                            match report.next_business_date {
                                Some(next) => format!(", next business date {}", next),
                                None => String::new(),
                            }
                        );
                        println!("📁 Report saved to: {}/{}", config.report_path(), report.report_path);
                        if !report.is_clean() {
                            println!("⚠️ {} finished with failed steps", tenant);
                        }
                    }
                    Err(e) => {
                        println!("❌ {}: {}", tenant, e.user_friendly_message());
                        first_error.get_or_insert(e);
                    }
                }
            }

            first_error.map_or(Ok(()), Err)
        }
        Command::RefreshViews { only, .. } => {
            let api = build_api(cli, config).await?;
            let store = connect_cache_store(config.cache_backend(), config.cache.url.as_deref()).await?;
            let cache = Arc::new(CacheAside::new(store, config.cache_prefix(), config.cache_ttl()));
            let storage = LocalStorage::new(config.views_output_path());
            let refresher = ViewRefresher::new(api, storage, cache.clone(), ViewSettings::from_config(config));

            let outcomes = refresher.refresh_all(&tenants, only).await;
            let mut first_error = None;
            for (tenant, outcome) in outcomes {
                match outcome {
                    Ok(outputs) => {
                        for output in outputs {
                            println!("📊 {} {}: {} rows → {}", tenant, output.view, output.rows, output.files.join(", "));
                        }
                    }
                    Err(e) => {
                        println!("❌ {}: {}", tenant, e.user_friendly_message());
                        first_error.get_or_insert(e);
                    }
                }
            }

            let stats = cache.stats();
            tracing::info!(
                "🎯 Cache stats: {} hits, {} misses, {} errors ({:.1}% hit rate)",
                stats.hits,
                stats.misses,
                stats.errors,
                stats.hit_rate() * 100.0
            );
            first_error.map_or(Ok(()), Err)
        }
        Command::CacheClear { namespace, .. } => {
            if config.cache_backend() == "memory" {
                tracing::warn!("⚠️ Memory cache lives in-process; nothing persists between runs to clear");
            }

            let store = connect_cache_store(config.cache_backend(), config.cache.url.as_deref()).await?;
            let cache = CacheAside::new(store, config.cache_prefix(), config.cache_ttl());

            for tenant in &tenants {
                let removed = match namespace {
                    Some(ns) => cache.invalidate_namespace(tenant, ns).await?,
                    None => cache.invalidate_tenant(tenant).await?,
                };
                println!("🧹 {}: removed {} cache entries", tenant, removed);
            }
            Ok(())
        }
    }
}

fn print_plan(config: &PmsConfig, tenants: &[TenantId]) {
    println!("📋 pms-ops plan");
    println!("  API: {}", config.api.base_url);
    println!(
        "  Tenants: {}",
        tenants.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!("  Audit steps: {}", config.audit_steps().join(" → "));
    println!(
        "  On step failure: {:?} (retries: {}, delay: {:?})",
        config.failure_policy(),
        config.step_retry_attempts(),
        config.step_retry_delay()
    );
    println!("  Tax rate: {}, no-show fee: {}%", config.tax_rate(), config.no_show_fee_percent());
    println!("  Views: {}", config.enabled_views().join(", "));
    println!("  View formats: {}", config.view_formats().join(", "));
    println!("  Cache: {} (prefix '{}', ttl {:?})", config.cache_backend(), config.cache_prefix(), config.cache_ttl());
    println!("  Reports: {}", config.report_path());
}
