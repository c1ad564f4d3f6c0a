use crate::services::{photo_store::CdnConfig, upload_client::UploadOptions};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};
use uuid::Uuid;

const ENV_PREFIX: &str = "PHOTO_DELIVERY_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Present only when cloud name, key and secret are all set.
    pub cdn: Option<CdnConfig>,
}

/// What the binary was asked to do.
#[derive(Debug, Clone)]
pub enum Mode {
    Serve { migrate: bool, seed: bool },
    Upload(UploadOptions),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Password-protected photo album delivery")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_DELIVERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_DELIVERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where photos are stored (overrides PHOTO_DELIVERY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PHOTO_DELIVERY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// CDN cloud name (overrides PHOTO_DELIVERY_CDN_CLOUD_NAME)
    #[arg(long)]
    pub cdn_cloud_name: Option<String>,

    /// CDN API key (overrides PHOTO_DELIVERY_CDN_API_KEY)
    #[arg(long)]
    pub cdn_api_key: Option<String>,

    /// CDN API secret (overrides PHOTO_DELIVERY_CDN_API_SECRET)
    #[arg(long)]
    pub cdn_api_secret: Option<String>,

    /// CDN upload base URL (overrides PHOTO_DELIVERY_CDN_UPLOAD_URL)
    #[arg(long)]
    pub cdn_upload_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Insert demo photographer, clients and albums before serving
    #[arg(long)]
    pub seed: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload photos to an album on a running server
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Base URL of the server
    #[arg(long, default_value = "http://localhost:3000")]
    pub server: String,

    /// Target album id
    #[arg(long)]
    pub album_id: Uuid,

    /// Store on the image CDN instead of local disk
    #[arg(long)]
    pub cdn: bool,

    /// Timeout in seconds for the grouped request of smaller files
    #[arg(long, default_value_t = 600)]
    pub batch_timeout_secs: u64,

    /// Photos to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge parsed args over environment values read through `lookup`.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<(Self, Mode)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        // --- Environment fallback ---
        let env_host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing {}PORT value `{}`", ENV_PREFIX, value))?,
            None => 3000,
        };
        let env_storage = var("STORAGE_DIR").unwrap_or_else(|| "./data/photos".into());
        let env_db = var("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/photo_delivery.db".into());

        let cloud_name = args.cdn_cloud_name.or_else(|| var("CDN_CLOUD_NAME"));
        let api_key = args.cdn_api_key.or_else(|| var("CDN_API_KEY"));
        let api_secret = args.cdn_api_secret.or_else(|| var("CDN_API_SECRET"));
        let upload_url = args.cdn_upload_url.or_else(|| var("CDN_UPLOAD_URL"));
        let cdn = match (cloud_name, api_key, api_secret) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CdnConfig {
                cloud_name,
                api_key,
                api_secret,
                upload_url,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "incomplete CDN configuration: cloud name, API key and API secret must all be set"
            ),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            cdn,
        };

        let mode = match args.command {
            Some(Command::Upload(upload)) => Mode::Upload(UploadOptions {
                server: upload.server,
                album_id: upload.album_id,
                use_cdn: upload.cdn,
                batch_timeout: Duration::from_secs(upload.batch_timeout_secs),
                files: upload.files,
            }),
            None => Mode::Serve {
                migrate: args.migrate,
                seed: args.seed,
            },
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(argv: &[&str], env: &[(&str, &str)]) -> Result<(AppConfig, Mode)> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let args = Args::try_parse_from(argv)?;
        AppConfig::resolve(args, |key| env.get(key).cloned())
    }

    #[test]
    fn defaults_without_env_or_flags() {
        let (cfg, mode) = resolve(&["photo-delivery"], &[]).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.storage_dir, "./data/photos");
        assert!(cfg.cdn.is_none());
        assert!(matches!(
            mode,
            Mode::Serve {
                migrate: false,
                seed: false
            }
        ));
    }

    #[test]
    fn flags_override_environment() {
        let (cfg, mode) = resolve(
            &["photo-delivery", "--port", "8080", "--seed"],
            &[
                ("PHOTO_DELIVERY_PORT", "9000"),
                ("PHOTO_DELIVERY_HOST", "127.0.0.1"),
            ],
        )
        .unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert!(matches!(mode, Mode::Serve { seed: true, .. }));
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(resolve(&["photo-delivery"], &[("PHOTO_DELIVERY_PORT", "http")]).is_err());
    }

    #[test]
    fn cdn_needs_all_three_credentials() {
        let (cfg, _) = resolve(
            &["photo-delivery"],
            &[
                ("PHOTO_DELIVERY_CDN_CLOUD_NAME", "studio"),
                ("PHOTO_DELIVERY_CDN_API_KEY", "key"),
                ("PHOTO_DELIVERY_CDN_API_SECRET", "secret"),
            ],
        )
        .unwrap();
        let cdn = cfg.cdn.unwrap();
        assert_eq!(cdn.cloud_name, "studio");
        assert!(cdn.upload_url.is_none());

        let partial = resolve(
            &["photo-delivery"],
            &[("PHOTO_DELIVERY_CDN_CLOUD_NAME", "studio")],
        );
        assert!(partial.is_err());
    }

    #[test]
    fn upload_subcommand_builds_options() {
        let id = Uuid::new_v4().to_string();
        let (_, mode) = resolve(
            &[
                "photo-delivery",
                "upload",
                "--album-id",
                &id,
                "--cdn",
                "a.jpg",
                "b.nef",
            ],
            &[],
        )
        .unwrap();
        let Mode::Upload(options) = mode else {
            panic!("expected upload mode");
        };
        assert_eq!(options.album_id.to_string(), id);
        assert!(options.use_cdn);
        assert_eq!(options.server, "http://localhost:3000");
        assert_eq!(options.batch_timeout, Duration::from_secs(600));
        assert_eq!(options.files.len(), 2);
    }
}
