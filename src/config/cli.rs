use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the mermaid-ink binary.
#[derive(Debug, Parser)]
#[command(
    name = "mermaid-ink",
    version,
    about = "Render Mermaid diagrams to SVG, images and PDF over HTTP"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "MERMAID_INK_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the rendering HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the Chromium executable used for rendering.
    #[arg(long = "render-chrome-executable", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub chrome_executable: Option<PathBuf>,

    /// Toggle Chromium's sandbox bypass.
    #[arg(
        long = "render-no-sandbox",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub no_sandbox: Option<bool>,

    /// Override the directory holding the diagramming library bundle.
    #[arg(long = "render-library-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub library_dir: Option<PathBuf>,

    /// Override the host document URL loaded into each page.
    #[arg(long = "render-host-url", value_name = "URL")]
    pub host_url: Option<String>,

    /// Override the maximum number of concurrently open pages.
    #[arg(long = "render-max-pages", value_name = "COUNT")]
    pub max_pages: Option<u32>,

    /// Override how long a request waits for a free page.
    #[arg(long = "render-acquire-timeout-ms", value_name = "MILLIS")]
    pub acquire_timeout_ms: Option<u64>,

    /// Override the maximum scaled width.
    #[arg(long = "render-max-width", value_name = "PIXELS")]
    pub max_width: Option<u32>,

    /// Override the maximum scaled height.
    #[arg(long = "render-max-height", value_name = "PIXELS")]
    pub max_height: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the canonical host accepted in oEmbed URLs.
    #[arg(long = "oembed-host", value_name = "HOST")]
    pub oembed_host: Option<String>,
}
