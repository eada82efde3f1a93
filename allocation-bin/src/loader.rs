use allocation_engine::AllocationRequest;
use color_eyre::eyre::{self, WrapErr};
use std::path::{Path, PathBuf};
use tracing::info;

pub const REQUEST_PATH_ENV: &str = "ALLOCATION_REQUEST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFormat {
    Json,
    Yaml,
}

impl RequestFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => RequestFormat::Json,
            _ => RequestFormat::Yaml,
        }
    }
}

/// First CLI argument, falling back to `ALLOCATION_REQUEST`.
pub fn request_path(arg: Option<String>) -> eyre::Result<PathBuf> {
    arg.or_else(|| std::env::var(REQUEST_PATH_ENV).ok())
        .map(PathBuf::from)
        .ok_or_else(|| {
            eyre::eyre!("No request file given. Pass a path or set {REQUEST_PATH_ENV}")
        })
}

pub fn parse_request(raw: &str, format: RequestFormat) -> eyre::Result<AllocationRequest> {
    let request = match format {
        RequestFormat::Json => serde_json::from_str(raw).wrap_err("Invalid JSON allocation request")?,
        RequestFormat::Yaml => serde_yaml::from_str(raw).wrap_err("Invalid YAML allocation request")?,
    };
    Ok(request)
}

pub async fn load_request(path: &Path) -> eyre::Result<AllocationRequest> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("Failed to read request file '{}'", path.display()))?;
    let request = parse_request(&raw, RequestFormat::for_path(path))?;
    info!(
        path = %path.display(),
        instances = request.instances.len(),
        rules = request.rules.len(),
        credits = request.credits.len(),
        "Loaded allocation request"
    );
    Ok(request)
}
