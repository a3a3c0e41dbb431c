use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "pageview_report")]
#[command(about = "Publish per-post and per-author monthly pageview reports to Google Sheets")]
#[command(version)]
pub struct Args {
    /// Google Sheets ID of the target spreadsheet
    #[arg(long, value_name = "SHEET_ID")]
    pub sheet_id: Option<String>,

    /// GA4 property ID to report on
    #[arg(long, value_name = "PROPERTY_ID")]
    pub property_id: Option<String>,

    /// Compute the reports but do not touch the spreadsheet
    #[arg(long)]
    pub dry_run: bool,

    /// Also write blogs.csv / authors.csv snapshots into this directory
    #[arg(long, value_name = "DIR")]
    pub csv_dir: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Path to config file
    #[arg(long, default_value = "config/config.toml")]
    pub config: String,
}
