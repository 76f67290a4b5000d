use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "pms-ops")]
#[command(about = "Night audit, view refresh and cache maintenance for a multi-tenant hotel PMS")]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "pms-ops.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log CPU and memory usage per audit step
    #[arg(long)]
    pub monitor: bool,

    /// Run against an in-memory PMS seeded with a small demo hotel
    #[arg(long)]
    pub demo: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the night audit
    Audit {
        /// Only audit this tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Override the business date (YYYY-MM-DD)
        #[arg(long)]
        business_date: Option<NaiveDate>,

        /// Plan the actions without calling the PMS
        #[arg(long)]
        dry_run: bool,

        /// Run only these steps
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Skip these steps
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,
    },

    /// Recompute the materialized views
    RefreshViews {
        #[arg(long)]
        tenant: Option<String>,

        /// Refresh only these views
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// Invalidate cached entries
    CacheClear {
        #[arg(long)]
        tenant: Option<String>,

        /// Only this namespace (e.g. views)
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Show tenants, audit steps and views without calling the API
    Plan,
}

impl Cli {
    pub fn tenant_filter(&self) -> Option<&str> {
        match &self.command {
            Command::Audit { tenant, .. }
            | Command::RefreshViews { tenant, .. }
            | Command::CacheClear { tenant, .. } => tenant.as_deref(),
            Command::Plan => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audit_command() {
        let cli = Cli::parse_from([
            "pms-ops",
            "-c",
            "hotel.toml",
            "audit",
            "--tenant",
            "hotel-a",
            "--business-date",
            "2024-04-10",
            "--dry-run",
            "--skip",
            "close_day,room_reconciliation",
        ]);

        assert_eq!(cli.config, "hotel.toml");
        assert_eq!(cli.tenant_filter(), Some("hotel-a"));
        match cli.command {
            Command::Audit {
                business_date,
                dry_run,
                skip,
                ..
            } => {
                assert_eq!(business_date, Some("2024-04-10".parse().unwrap()));
                assert!(dry_run);
                assert_eq!(skip, vec!["close_day", "room_reconciliation"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_views_and_cache_commands() {
        let cli = Cli::parse_from(["pms-ops", "--demo", "refresh-views", "--only", "folio_aging"]);
        assert!(cli.demo);
        assert!(matches!(cli.command, Command::RefreshViews { ref only, .. } if only == &["folio_aging"]));

        let cli = Cli::parse_from(["pms-ops", "cache-clear", "--namespace", "views"]);
        assert!(matches!(cli.command, Command::CacheClear { namespace: Some(ref n), tenant: None } if n == "views"));
    }
}
