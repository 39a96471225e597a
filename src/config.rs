use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Bucket holding every user's namespace.
    pub bucket: String,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Per-user cloud file storage API")]
pub struct Args {
    /// Host to bind to (overrides CLOUD_STORAGE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CLOUD_STORAGE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides CLOUD_STORAGE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides CLOUD_STORAGE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket name (overrides CLOUD_STORAGE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Maximum upload request size in bytes (overrides CLOUD_STORAGE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, Self::from_env()?);
        Ok((cfg, migrate))
    }

    /// Settings from `CLOUD_STORAGE_*` variables, defaults where unset.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("CLOUD_STORAGE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env("CLOUD_STORAGE_PORT", 3000)?,
            storage_dir: env::var("CLOUD_STORAGE_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/objects".into()),
            database_url: env::var("CLOUD_STORAGE_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/meta/cloud_storage.db".into()),
            bucket: env::var("CLOUD_STORAGE_BUCKET").unwrap_or_else(|_| "user-files".into()),
            max_upload_bytes: parse_env("CLOUD_STORAGE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }

    /// CLI values win over the environment.
    fn merge(args: Args, env: Self) -> Self {
        Self {
            host: args.host.unwrap_or(env.host),
            port: args.port.unwrap_or(env.port),
            storage_dir: args.storage_dir.unwrap_or(env.storage_dir),
            database_url: args.database_url.unwrap_or(env.database_url),
            bucket: args.bucket.unwrap_or(env.bucket),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env.max_upload_bytes),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
