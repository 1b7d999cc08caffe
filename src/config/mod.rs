//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, RenderOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mermaid-ink";
const ENV_PREFIX: &str = "MERMAID_INK";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_LIBRARY_DIR: &str = "vendor/mermaid";
const DEFAULT_ELEMENT_WAIT_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_PAGES: u32 = 8;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_WIDTH: u32 = 10_000;
const DEFAULT_MAX_HEIGHT: u32 = 10_000;
const DEFAULT_OEMBED_HOST: &str = "mermaid.ink";
const DEFAULT_PROVIDER_NAME: &str = "Mermaid Ink";
const DEFAULT_PROVIDER_URL: &str = "https://mermaid.ink";

/// Path of the host document below the listener root.
pub const HOST_DOCUMENT_PATH: &str = "/_host/index.html";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub oembed: OembedSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// `None` lets the browser launcher locate an installed Chromium.
    pub chrome_executable: Option<PathBuf>,
    pub no_sandbox: bool,
    pub library_dir: PathBuf,
    pub host_url: String,
    pub element_wait: Duration,
    pub request_timeout: Duration,
    pub max_pages: NonZeroU32,
    pub acquire_timeout: Duration,
    pub max_width: NonZeroU32,
    pub max_height: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct OembedSettings {
    pub host: String,
    pub provider_name: String,
    pub provider_url: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    oembed: RawOembedSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    chrome_executable: Option<PathBuf>,
    no_sandbox: Option<bool>,
    library_dir: Option<PathBuf>,
    host_url: Option<String>,
    element_wait_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    max_pages: Option<u64>,
    acquire_timeout_ms: Option<u64>,
    max_width: Option<u64>,
    max_height: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOembedSettings {
    host: Option<String>,
    provider_name: Option<String>,
    provider_url: Option<String>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(host) = overrides.oembed_host.as_ref() {
            self.oembed.host = Some(host.clone());
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.chrome_executable.as_ref() {
            self.render.chrome_executable = Some(path.clone());
        }
        if let Some(no_sandbox) = overrides.no_sandbox {
            self.render.no_sandbox = Some(no_sandbox);
        }
        if let Some(dir) = overrides.library_dir.as_ref() {
            self.render.library_dir = Some(dir.clone());
        }
        if let Some(url) = overrides.host_url.as_ref() {
            self.render.host_url = Some(url.clone());
        }
        if let Some(max) = overrides.max_pages {
            self.render.max_pages = Some(max.into());
        }
        if let Some(millis) = overrides.acquire_timeout_ms {
            self.render.acquire_timeout_ms = Some(millis);
        }
        if let Some(width) = overrides.max_width {
            self.render.max_width = Some(width.into());
        }
        if let Some(height) = overrides.max_height {
            self.render.max_height = Some(height.into());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            oembed,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render, server.addr)?;
        let oembed = build_oembed_settings(oembed)?;

        Ok(Self {
            server,
            logging,
            render,
            oembed,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(
    render: RawRenderSettings,
    listener: SocketAddr,
) -> Result<RenderSettings, LoadError> {
    let chrome_executable = render
        .chrome_executable
        .filter(|path| !path.as_os_str().is_empty());

    let library_dir = render
        .library_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_DIR));
    if library_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.library_dir",
            "path must not be empty",
        ));
    }

    let host_url = match render.host_url.filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            let parsed = Url::parse(url.trim())
                .map_err(|err| LoadError::invalid("render.host_url", err.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "render.host_url",
                    "scheme must be http or https",
                ));
            }
            parsed.to_string()
        }
        None => derive_host_url(listener),
    };

    Ok(RenderSettings {
        chrome_executable,
        no_sandbox: render.no_sandbox.unwrap_or(true),
        library_dir,
        host_url,
        element_wait: positive_millis(
            render.element_wait_ms.unwrap_or(DEFAULT_ELEMENT_WAIT_MS),
            "render.element_wait_ms",
        )?,
        request_timeout: positive_millis(
            render.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            "render.request_timeout_ms",
        )?,
        max_pages: non_zero_u32(
            render.max_pages.unwrap_or(DEFAULT_MAX_PAGES.into()),
            "render.max_pages",
        )?,
        acquire_timeout: positive_millis(
            render.acquire_timeout_ms.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
            "render.acquire_timeout_ms",
        )?,
        max_width: non_zero_u32(
            render.max_width.unwrap_or(DEFAULT_MAX_WIDTH.into()),
            "render.max_width",
        )?,
        max_height: non_zero_u32(
            render.max_height.unwrap_or(DEFAULT_MAX_HEIGHT.into()),
            "render.max_height",
        )?,
    })
}

fn build_oembed_settings(oembed: RawOembedSettings) -> Result<OembedSettings, LoadError> {
    let host = oembed
        .host
        .map(|host| host.trim().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_OEMBED_HOST.to_string());
    if host.is_empty() || host.contains('/') {
        return Err(LoadError::invalid(
            "oembed.host",
            "must be a bare host name",
        ));
    }

    let provider_url = oembed
        .provider_url
        .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());
    Url::parse(&provider_url)
        .map_err(|err| LoadError::invalid("oembed.provider_url", err.to_string()))?;

    Ok(OembedSettings {
        host,
        provider_name: oembed
            .provider_name
            .unwrap_or_else(|| DEFAULT_PROVIDER_NAME.to_string()),
        provider_url,
    })
}

/// Host document URL reachable from a browser on this machine.
fn derive_host_url(listener: SocketAddr) -> String {
    let ip = match listener.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    format!(
        "http://{}{HOST_DOCUMENT_PATH}",
        SocketAddr::new(ip, listener.port())
    )
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
