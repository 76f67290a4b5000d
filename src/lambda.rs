use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client as S3Client;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use pms_ops::adapters::cache::connect_cache_store;
use pms_ops::config::lambda::LambdaConfig;
use pms_ops::utils::{logger, validation::Validate};
use pms_ops::{AuditOptions, CacheAside, HttpPmsClient, NightAuditRunner, S3Storage, ViewRefresher, ViewSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    #[default]
    NightAudit,
    RefreshViews,
}

/// EventBridge 排程事件；未填欄位使用預設值
#[derive(Debug, Default, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub job: Job,
    pub tenant: Option<String>,
    pub business_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct TenantOutcome {
    pub tenant: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Serialize)]
pub struct Response {
    pub message: String,
    pub tenants: Vec<TenantOutcome>,
}

fn boxed(e: pms_ops::PmsError) -> Error {
    Box::new(e) as Box<dyn std::error::Error + Send + Sync>
}

async fn function_handler(event: LambdaEvent<Request>) -> Result<Response, Error> {
    let request = event.payload;
    tracing::info!("🌙 Starting pms-ops Lambda job {:?}", request.job);

    let lambda_config = LambdaConfig::from_env().map_err(boxed)?;
    lambda_config.validate().map_err(boxed)?;
    let config = lambda_config.load_pms_config().map_err(boxed)?;
    config.validate().map_err(boxed)?;

    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_config = aws_sdk_s3::config::Builder::from(&aws)
        .region(Region::new(lambda_config.s3_region.clone()))
        .force_path_style(true)
        .build();
    let storage = S3Storage::new(
        S3Client::from_conf(s3_config),
        lambda_config.s3_bucket.clone(),
        lambda_config.s3_prefix.clone(),
    );

    let tenants = config.select_tenants(request.tenant.as_deref()).map_err(boxed)?;

    let api = Arc::new(HttpPmsClient::new(config.api.clone()).map_err(boxed)?);

    let outcomes: Vec<TenantOutcome> = match request.job {
        Job::NightAudit => {
            let runner = NightAuditRunner::new(api, storage, &config);
            let options = AuditOptions {
                business_date: request.business_date,
                dry_run: request.dry_run,
                ..Default::default()
            };

            runner
                .run_all(&tenants, &options)
                .await
                .into_iter()
                .map(|(tenant, outcome)| match outcome {
                    Ok(report) => TenantOutcome {
                        tenant: tenant.to_string(),
                        ok: report.is_clean(),
                        detail: report.report_path,
                    },
                    Err(e) => TenantOutcome {
                        tenant: tenant.to_string(),
                        ok: false,
                        detail: e.to_string(),
                    },
                })
                .collect()
        }
        Job::RefreshViews => {
            let store = connect_cache_store(config.cache_backend(), config.cache.url.as_deref())
                .await
                .map_err(boxed)?;
            let cache = Arc::new(CacheAside::new(store, config.cache_prefix(), config.cache_ttl()));
            let refresher = ViewRefresher::new(api, storage, cache, ViewSettings::from_config(&config));

            refresher
                .refresh_all(&tenants, &[])
                .await
                .into_iter()
                .map(|(tenant, outcome)| match outcome {
                    Ok(outputs) => TenantOutcome {
                        tenant: tenant.to_string(),
                        ok: true,
                        detail: format!("{} views refreshed", outputs.len()),
                    },
                    Err(e) => TenantOutcome {
                        tenant: tenant.to_string(),
                        ok: false,
                        detail: e.to_string(),
                    },
                })
                .collect()
        }
    };

    let failed = outcomes.iter().filter(|o| !o.ok).count();
    tracing::info!("✅ Lambda job finished: {} tenants, {} with failures", outcomes.len(), failed);

    Ok(Response {
        message: format!("{:?} finished for {} tenants ({} with failures)", request.job, outcomes.len(), failed),
        tenants: outcomes,
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();
    run(service_fn(function_handler)).await
}
