use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use url::Url;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_FILE: &str = "citas.json";
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Runtime settings, read from the environment (and `.env`) at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub data_file: PathBuf,
    pub uploads_dir: PathBuf,
    /// Always ends with `/` so `join("uploads/..")` appends instead of replacing.
    pub public_url: Url,
    pub max_upload_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Settings::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset keys take their defaults.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("CITAS_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("CITAS_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("CITAS_PORT is not a valid port: {raw}"))?,
            None => DEFAULT_PORT,
        };

        let data_file = lookup("CITAS_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));

        let uploads_dir = lookup("CITAS_UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR));

        let public_url = match lookup("CITAS_PUBLIC_URL") {
            Some(raw) => parse_base_url(&raw).context("CITAS_PUBLIC_URL")?,
            None => parse_base_url(&format!("http://localhost:{port}/"))?,
        };

        let max_upload_bytes = match lookup("CITAS_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("CITAS_MAX_UPLOAD_BYTES is not a number: {raw}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Settings {
            host,
            port,
            data_file,
            uploads_dir,
            public_url,
            max_upload_bytes,
        })
    }

    /// Settings rooted in `dir`, used by tests.
    #[cfg(test)]
    pub fn for_dir(dir: &std::path::Path) -> Self {
        Settings {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_file: dir.join(DEFAULT_DATA_FILE),
            uploads_dir: dir.join(DEFAULT_UPLOADS_DIR),
            public_url: Url::parse("http://localhost:3000/").expect("static url"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).with_context(|| format!("invalid base url: {raw}"))
}
