use std::io::Write;

use super::*;

#[test]
fn defaults_cover_every_section() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr, "127.0.0.1:3000".parse().expect("addr"));
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);

    let render = &settings.render;
    assert_eq!(render.chrome_executable, None);
    assert!(render.no_sandbox);
    assert_eq!(render.library_dir, PathBuf::from("vendor/mermaid"));
    assert_eq!(render.host_url, "http://127.0.0.1:3000/_host/index.html");
    assert_eq!(render.element_wait, Duration::from_secs(30));
    assert_eq!(render.request_timeout, Duration::from_secs(30));
    assert_eq!(render.max_pages.get(), 8);
    assert_eq!(render.acquire_timeout, Duration::from_secs(10));
    assert_eq!(render.max_width.get(), 10_000);
    assert_eq!(render.max_height.get(), 10_000);

    assert_eq!(settings.oembed.host, "mermaid.ink");
    assert_eq!(settings.oembed.provider_name, "Mermaid Ink");
    assert_eq!(settings.oembed.provider_url, "https://mermaid.ink");
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.render.max_pages = Some(2);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        render: RenderOverrides {
            max_pages: Some(16),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.render.max_pages.get(), 16);
    assert_eq!(
        settings.render.host_url,
        "http://127.0.0.1:4321/_host/index.html"
    );
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn host_url_reaches_wildcard_listener_through_loopback() {
    let mut raw = RawSettings::default();
    raw.server.host = Some("0.0.0.0".to_string());
    raw.server.port = Some(8080);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.render.host_url,
        "http://127.0.0.1:8080/_host/index.html"
    );

    let mut raw = RawSettings::default();
    raw.server.host = Some("::".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.render.host_url, "http://[::1]:3000/_host/index.html");
}

#[test]
fn explicit_host_url_is_kept() {
    let mut raw = RawSettings::default();
    raw.render.host_url = Some("http://renderer.internal:9000/_host/index.html".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.render.host_url,
        "http://renderer.internal:9000/_host/index.html"
    );

    let mut raw = RawSettings::default();
    raw.render.host_url = Some("file:///tmp/index.html".to_string());
    let err = Settings::from_raw(raw).expect_err("file scheme rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.host_url",
            ..
        }
    ));
}

#[test]
fn zero_values_are_rejected() {
    let cases: [(fn(&mut RawSettings), &str); 5] = [
        (|raw| raw.server.port = Some(0), "server.port"),
        (|raw| raw.render.max_pages = Some(0), "render.max_pages"),
        (|raw| raw.render.max_width = Some(0), "render.max_width"),
        (
            |raw| raw.render.acquire_timeout_ms = Some(0),
            "render.acquire_timeout_ms",
        ),
        (
            |raw| raw.server.graceful_shutdown_seconds = Some(0),
            "server.graceful_shutdown_seconds",
        ),
    ];

    for (mutate, expected_key) in cases {
        let mut raw = RawSettings::default();
        mutate(&mut raw);
        match Settings::from_raw(raw) {
            Err(LoadError::Invalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected invalid {expected_key}, got {other:?}"),
        }
    }
}

#[test]
fn oversized_dimension_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.render.max_height = Some(u64::from(u32::MAX) + 1);
    let err = Settings::from_raw(raw).expect_err("out of range");
    assert!(err.to_string().contains("render.max_height"));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn oembed_host_is_normalised() {
    let mut raw = RawSettings::default();
    raw.oembed.host = Some(" Diagrams.Example.COM ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.oembed.host, "diagrams.example.com");

    let mut raw = RawSettings::default();
    raw.oembed.host = Some("https://mermaid.ink".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn config_file_layer_sits_below_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[server]\nport = 4100\n\n[render]\nmax_pages = 3\nlibrary_dir = \"/opt/mermaid\""
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from([
        "mermaid-ink",
        "--config-file",
        path.as_str(),
        "serve",
        "--render-max-pages",
        "5",
    ]);
    let settings = load(&args).expect("layered settings");

    assert_eq!(settings.server.addr.port(), 4100);
    assert_eq!(settings.render.max_pages.get(), 5);
    assert_eq!(settings.render.library_dir, PathBuf::from("/opt/mermaid"));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["mermaid-ink"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "mermaid-ink",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--render-no-sandbox",
        "false",
        "--render-chrome-executable",
        "/usr/bin/chromium",
        "--oembed-host",
        "ink.example.com",
    ]);
    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.render.no_sandbox, Some(false));
            assert_eq!(
                serve.overrides.render.chrome_executable,
                Some(PathBuf::from("/usr/bin/chromium"))
            );
            assert_eq!(
                serve.overrides.oembed_host.as_deref(),
                Some("ink.example.com")
            );
        }
    }
}
