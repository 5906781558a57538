use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::payroll::WageTable;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "schoold", version, about = "School progression and payroll daemon")]
pub struct Args {
    /// Directory holding the SQLite database. Can also be chosen later with
    /// the `workspace.select` method.
    #[arg(long, env = "SCHOOLD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Serve the HTTP API on this address instead of reading requests from stdin.
    #[arg(long, env = "SCHOOLD_HTTP")]
    pub http: Option<SocketAddr>,

    /// Optional TOML file with settings and the wage table.
    #[arg(long, env = "SCHOOLD_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    workspace: Option<PathBuf>,
    http: Option<SocketAddr>,
    wages: Option<WageTable>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub http: Option<SocketAddr>,
    pub wages: WageTable,
}

impl Config {
    /// Command-line values win over the file.
    pub fn load(args: &Args) -> anyhow::Result<Config> {
        let file = match &args.config {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        merge(args, file)
    }
}

fn read_file(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_file(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_file(text: &str) -> anyhow::Result<FileConfig> {
    Ok(toml::from_str(text)?)
}

fn merge(args: &Args, file: FileConfig) -> anyhow::Result<Config> {
    let wages = file.wages.unwrap_or_default();
    wages
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid wage table: {}", e))?;
    Ok(Config {
        workspace: args.workspace.clone().or(file.workspace),
        http: args.http.or(file.http),
        wages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_wages_override_defaults() {
        let file = parse_file(
            r#"
workspace = "/srv/school"

[wages.Standard]
percentage = 60
hourlyRate = 5.0

[wages.Discount]
percentage = 60
hourlyRate = 4.0

[wages.Non-Arab]
percentage = 60
hourlyRate = 6.0
"#,
        )
        .expect("parse");
        let cfg = merge(&Args::default(), file).expect("merge");
        assert_eq!(cfg.wages.standard.hourly_rate, 5.0);
        assert_eq!(cfg.wages.non_arab.percentage, 60.0);
        assert_eq!(cfg.workspace, Some(PathBuf::from("/srv/school")));
    }

    #[test]
    fn args_win_over_file() {
        let file = parse_file("workspace = \"/from/file\"\nhttp = \"127.0.0.1:9000\"").expect("parse");
        let args = Args {
            workspace: Some(PathBuf::from("/from/args")),
            ..Default::default()
        };
        let cfg = merge(&args, file).expect("merge");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/from/args")));
        assert_eq!(cfg.http.map(|a| a.port()), Some(9000));
        assert_eq!(cfg.wages, WageTable::default());
    }

    #[test]
    fn unknown_keys_and_negative_rates_fail() {
        assert!(parse_file("workspcae = \"/typo\"").is_err());
        let file = parse_file(
            "[wages.Standard]\npercentage = 65\nhourlyRate = -1.0\n\
             [wages.Discount]\npercentage = 65\nhourlyRate = 1.0\n\
             [wages.Non-Arab]\npercentage = 65\nhourlyRate = 1.0\n",
        )
        .expect("parse");
        assert!(merge(&Args::default(), file).is_err());
    }
}
