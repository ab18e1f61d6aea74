use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use crate::entities::asset::Asset;

/// Import media into a bin, load it in the background and report the result
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Media files to import
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Enable debug logging to file (default: mediabin.log in the config dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Worker threads for background jobs (default from settings)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Seconds to wait for background jobs
    #[arg(short = 't', long = "timeout", value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Generate proxies for clips wider than the configured minimum
    #[arg(long = "proxy")]
    pub generate_proxy: bool,

    /// Print the report as JSON
    #[arg(long = "json")]
    pub json: bool,
}

/// One line of the import report
#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub id: String,
    pub name: String,
    pub clip_type: String,
    pub status: String,
    pub duration: i32,
    pub hash: Option<String>,
    pub file_size: Option<u64>,
    pub proxy: Option<String>,
}

impl AssetSummary {
    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            id: asset.id().to_string(),
            name: asset.name(),
            clip_type: asset.clip_type().to_string(),
            status: asset.status().to_string(),
            duration: asset.duration(),
            hash: asset.hash(),
            file_size: asset.file_size(),
            proxy: asset.proxy(),
        }
    }
}

/// Plain text table of the report
pub fn render_table(rows: &[AssetSummary]) -> String {
    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
    let mut out = format!(
        "{:<4} {:<name_width$} {:<12} {:<10} {:>8}  {}\n",
        "ID", "NAME", "TYPE", "STATUS", "FRAMES", "HASH"
    );
    for r in rows {
        let hash = r.hash.as_deref().map(|h| &h[..h.len().min(12)]).unwrap_or("-");
        out.push_str(&format!(
            "{:<4} {:<name_width$} {:<12} {:<10} {:>8}  {}\n",
            r.id, r.name, r.clip_type, r.status, r.duration, hash
        ));
    }
    out
}
