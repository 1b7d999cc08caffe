//! Headless Chromium session and the pages it hands to the render pipeline.
//!
//! One browser process is launched at startup and shut down explicitly. Each
//! page lives in its own browser context so storage is never shared between
//! requests; closing a page disposes of its context as well.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::{
        browser_protocol::{
            browser::BrowserContextId,
            emulation::SetDeviceMetricsOverrideParams,
            page::{CaptureScreenshotFormat, Viewport},
            target::{CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams},
        },
        js_protocol::runtime::{CallArgument, CallFunctionOnParams},
    },
    page::ScreenshotParams,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};

use super::error::InfraError;
use crate::{
    application::render::{
        BoundingBox, CaptureOptions, DiagramPage, ENTRY_POINT_FUNCTION, PageSource, RenderCall,
        ResourceError,
    },
    config::RenderSettings,
    domain::params::ImageType,
};

const LOCATE_ROOT_FUNCTION: &str = r#"function () {
  const element = document.querySelector('#container > svg');
  if (!element) {
    return { found: false };
  }
  const rect = element.getBoundingClientRect();
  return {
    found: true,
    x: rect.x + window.scrollX,
    y: rect.y + window.scrollY,
    width: rect.width,
    height: rect.height,
  };
}"#;

const ROOT_MARKUP_FUNCTION: &str = r#"function () {
  const element = document.querySelector('#container > svg');
  return element ? { found: true, markup: element.outerHTML } : { found: false };
}"#;

#[derive(Debug, Deserialize)]
struct LocatedRoot {
    found: bool,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

#[derive(Debug, Deserialize)]
struct RootMarkup {
    found: bool,
    #[serde(default)]
    markup: Option<String>,
}

struct SessionInner {
    browser: RwLock<Browser>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Shared Chromium process. Cloning shares the same process.
#[derive(Clone)]
pub struct BrowserSession {
    inner: Arc<SessionInner>,
}

impl BrowserSession {
    pub async fn launch(settings: &RenderSettings) -> Result<Self, InfraError> {
        let started_at = Instant::now();
        let mut builder = BrowserConfig::builder()
            .request_timeout(settings.request_timeout)
            .arg("--hide-scrollbars")
            .arg("--font-render-hinting=none");
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = settings.chrome_executable.as_ref() {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|err| InfraError::browser(format!("invalid browser configuration: {err}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| InfraError::browser(format!("failed to launch browser: {err}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(
                        target = "infra::browser",
                        op = "browser::handler",
                        error = %err,
                        "Browser event loop reported an error"
                    );
                }
            }
        });

        info!(
            target = "infra::browser",
            op = "browser::launch",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            no_sandbox = settings.no_sandbox,
            "Browser session started"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                browser: RwLock::new(browser),
                handler: std::sync::Mutex::new(Some(handler)),
            }),
        })
    }

    /// Close the browser process and stop its event loop.
    pub async fn shutdown(&self) -> Result<(), InfraError> {
        let mut browser = self.inner.browser.write().await;
        let closed = browser.close().await;
        let waited = browser.wait().await;

        let handler = self
            .inner
            .handler
            .lock()
            .map_err(|_| InfraError::browser("browser handler lock poisoned"))?
            .take();
        if let Some(handler) = handler {
            handler.abort();
            let _ = handler.await;
        }

        closed.map_err(|err| InfraError::browser(format!("failed to close browser: {err}")))?;
        waited?;
        info!(
            target = "infra::browser",
            op = "browser::shutdown",
            result = "ok",
            "Browser session stopped"
        );
        Ok(())
    }

    async fn dispose_context(&self, context_id: BrowserContextId) -> Result<(), ResourceError> {
        let browser = self.inner.browser.read().await;
        browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
            .map(|_| ())
            .map_err(|err| ResourceError::protocol(format!("dispose context: {err}")))
    }
}

#[async_trait]
impl PageSource for BrowserSession {
    async fn open_page(&self) -> Result<Box<dyn DiagramPage>, ResourceError> {
        let browser = self.inner.browser.read().await;
        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|err| ResourceError::open_page(format!("create context: {err}")))?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(ResourceError::open_page)?;
        let created = browser.new_page(target).await;
        drop(browser);
        let page = match created {
            Ok(page) => page,
            Err(err) => {
                if let Err(dispose_err) = self.dispose_context(context_id).await {
                    warn!(
                        target = "infra::browser",
                        op = "browser::open_page",
                        error = %dispose_err,
                        "Failed to dispose context after page creation failed"
                    );
                }
                return Err(ResourceError::open_page(format!("create page: {err}")));
            }
        };

        Ok(Box::new(ChromePage {
            page,
            context_id,
            session: self.clone(),
        }))
    }
}

struct ChromePage {
    page: Page,
    context_id: BrowserContextId,
    session: BrowserSession,
}

impl ChromePage {
    async fn call(&self, function: &str, argument: Option<Value>) -> Result<Value, ResourceError> {
        let mut builder = CallFunctionOnParams::builder()
            .function_declaration(function)
            .await_promise(true)
            .return_by_value(true);
        if let Some(value) = argument {
            builder = builder.argument(CallArgument::builder().value(value).build());
        }
        let params = builder.build().map_err(ResourceError::protocol)?;

        let result = self
            .page
            .evaluate_function(params)
            .await
            .map_err(|err| ResourceError::protocol(format!("call function: {err}")))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

fn screenshot_format(image_type: ImageType) -> CaptureScreenshotFormat {
    match image_type {
        ImageType::Png => CaptureScreenshotFormat::Png,
        ImageType::Jpeg => CaptureScreenshotFormat::Jpeg,
        ImageType::Webp => CaptureScreenshotFormat::Webp,
    }
}

#[async_trait]
impl DiagramPage for ChromePage {
    async fn open_host(&self, url: &str) -> Result<(), ResourceError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|err| ResourceError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })
    }

    async fn call_renderer(&self, call: &RenderCall) -> Result<Value, ResourceError> {
        let argument = serde_json::to_value(call)
            .map_err(|err| ResourceError::entry_point(format!("encode call: {err}")))?;
        self.call(ENTRY_POINT_FUNCTION, Some(argument)).await
    }

    async fn diagram_box(&self) -> Result<Option<BoundingBox>, ResourceError> {
        let located: LocatedRoot = serde_json::from_value(self.call(LOCATE_ROOT_FUNCTION, None).await?)
            .map_err(|err| ResourceError::protocol(format!("decode bounding box: {err}")))?;
        Ok(located.found.then_some(BoundingBox {
            x: located.x,
            y: located.y,
            width: located.width,
            height: located.height,
        }))
    }

    async fn diagram_markup(&self) -> Result<Option<String>, ResourceError> {
        let root: RootMarkup = serde_json::from_value(self.call(ROOT_MARKUP_FUNCTION, None).await?)
            .map_err(|err| ResourceError::protocol(format!("decode markup: {err}")))?;
        Ok(if root.found { root.markup } else { None })
    }

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<(), ResourceError> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await
            .map(|_| ())
            .map_err(|err| ResourceError::protocol(format!("resize viewport: {err}")))
    }

    async fn capture(
        &self,
        clip: BoundingBox,
        options: CaptureOptions,
    ) -> Result<Bytes, ResourceError> {
        let mut params = ScreenshotParams::builder()
            .format(screenshot_format(options.image_type))
            .omit_background(options.omit_background)
            .capture_beyond_viewport(true)
            .clip(Viewport {
                x: clip.x,
                y: clip.y,
                width: clip.width,
                height: clip.height,
                scale: 1.0,
            });
        if let Some(quality) = options.quality {
            params = params.quality(i64::from(quality));
        }

        self.page
            .screenshot(params.build())
            .await
            .map(Bytes::from)
            .map_err(|err| ResourceError::capture(err.to_string()))
    }

    async fn close(&self) -> Result<(), ResourceError> {
        let closed = self
            .page
            .clone()
            .close()
            .await
            .map_err(|err| ResourceError::protocol(format!("close page: {err}")));
        let disposed = self.session.dispose_context(self.context_id.clone()).await;
        closed.and(disposed)
    }
}
