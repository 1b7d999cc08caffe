use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use mermaid_ink::{
    application::{
        error::AppError,
        oembed::{OembedProvider, OembedService},
        render::{DiagramRenderer, PagePool},
    },
    config,
    domain::params::ParamResolver,
    infra::{
        browser::BrowserSession,
        error::InfraError,
        host::HostAssets,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let browser = BrowserSession::launch(&settings.render).await?;

    let pool = PagePool::new(
        Arc::new(browser.clone()),
        settings.render.max_pages.get() as usize,
        settings.render.acquire_timeout,
    );
    let renderer = DiagramRenderer::new(
        pool.clone(),
        settings.render.host_url.as_str(),
        settings.render.element_wait,
    );
    let oembed = OembedService::new(
        renderer.clone(),
        OembedProvider {
            host: settings.oembed.host.clone(),
            provider_name: settings.oembed.provider_name.clone(),
            provider_url: settings.oembed.provider_url.clone(),
        },
    );
    let state = HttpState {
        renderer,
        resolver: ParamResolver::new(
            settings.render.max_width.get(),
            settings.render.max_height.get(),
        ),
        oembed,
        host: HostAssets::new(settings.render.library_dir.clone()),
    };

    let served = serve_http(&settings, state).await;

    pool.close();
    let stopped = browser.shutdown().await;

    served?;
    stopped.map_err(AppError::from)
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "mermaid_ink::serve",
        addr = %settings.server.addr,
        host_url = %settings.render.host_url,
        "Listening"
    );

    let draining = Arc::new(Notify::new());
    let trigger = draining.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            trigger.notify_one();
        })
        .into_future();
    let mut handle = tokio::spawn(server);

    tokio::select! {
        joined = &mut handle => return server_outcome(joined),
        _ = draining.notified() => {}
    }

    info!(
        target = "mermaid_ink::serve",
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "Shutdown requested; draining in-flight requests"
    );
    drain(handle, settings.server.graceful_shutdown).await
}

async fn drain(
    mut handle: JoinHandle<std::io::Result<()>>,
    grace: Duration,
) -> Result<(), AppError> {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "mermaid_ink::serve",
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out; aborting open connections"
            );
            handle.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
