//! Scripted page doubles shared by the render unit tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};

use super::bridge::RenderCall;
use super::page::{CaptureOptions, DiagramPage, PageSource};
use super::types::{BoundingBox, ResourceError};
use crate::domain::params::ImageType;

/// Minimal PNG header carrying `width` x `height` in its IHDR chunk.
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0]);
    bytes
}

/// Minimal baseline JPEG carrying `width` x `height` in its SOF0 segment.
pub(crate) fn jpeg_fixture(width: u16, height: u16) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x11, 0x08];
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

#[derive(Debug, Clone)]
pub(crate) struct PageScript {
    pub reply: Value,
    pub bounds: Option<BoundingBox>,
    pub markup: Option<String>,
    pub fail_capture: bool,
    pub close_delay: Option<Duration>,
}

impl PageScript {
    pub(crate) fn rendered() -> Self {
        Self {
            reply: json!({ "status": "rendered" }),
            bounds: Some(BoundingBox {
                x: 8.0,
                y: 8.0,
                width: 320.0,
                height: 180.0,
            }),
            markup: Some(r#"<svg id="mermaid-svg"><g/></svg>"#.to_string()),
            fail_capture: false,
            close_delay: None,
        }
    }

    pub(crate) fn unknown_diagram(message: &str) -> Self {
        Self {
            reply: json!({ "status": "unknown_diagram", "message": message }),
            ..Self::rendered()
        }
    }

    pub(crate) fn failed(message: &str) -> Self {
        Self {
            reply: json!({ "status": "failed", "message": message }),
            ..Self::rendered()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PageLog {
    pub hosts: Vec<String>,
    pub calls: Vec<RenderCall>,
    pub resizes: Vec<(u32, u32)>,
    pub captures: Vec<(BoundingBox, CaptureOptions)>,
    pub close_attempts: usize,
    pub closes: usize,
}

pub(crate) struct ScriptedPage {
    script: PageScript,
    log: Arc<Mutex<PageLog>>,
}

impl ScriptedPage {
    pub(crate) fn new(script: PageScript) -> Self {
        Self::with_log(script, Arc::default())
    }

    fn with_log(script: PageScript, log: Arc<Mutex<PageLog>>) -> Self {
        Self { script, log }
    }

    pub(crate) fn log(&self) -> PageLog {
        self.log.lock().expect("page log lock").clone()
    }

    fn record(&self, update: impl FnOnce(&mut PageLog)) {
        update(&mut self.log.lock().expect("page log lock"));
    }
}

#[async_trait]
impl DiagramPage for ScriptedPage {
    async fn open_host(&self, url: &str) -> Result<(), ResourceError> {
        self.record(|log| log.hosts.push(url.to_string()));
        Ok(())
    }

    async fn call_renderer(&self, call: &RenderCall) -> Result<Value, ResourceError> {
        self.record(|log| log.calls.push(call.clone()));
        Ok(self.script.reply.clone())
    }

    async fn diagram_box(&self) -> Result<Option<BoundingBox>, ResourceError> {
        let resized = self.log().resizes.last().copied();
        Ok(self.script.bounds.map(|bounds| match resized {
            Some((width, height)) => BoundingBox {
                width: f64::from(width),
                height: f64::from(height),
                ..bounds
            },
            None => bounds,
        }))
    }

    async fn diagram_markup(&self) -> Result<Option<String>, ResourceError> {
        Ok(self.script.markup.clone())
    }

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<(), ResourceError> {
        self.record(|log| log.resizes.push((width, height)));
        Ok(())
    }

    async fn capture(
        &self,
        clip: BoundingBox,
        options: CaptureOptions,
    ) -> Result<Bytes, ResourceError> {
        self.record(|log| log.captures.push((clip, options)));
        if self.script.fail_capture {
            return Err(ResourceError::capture("scripted capture failure"));
        }
        let (width, height) = (clip.width.round() as u32, clip.height.round() as u32);
        Ok(Bytes::from(match options.image_type {
            ImageType::Jpeg => jpeg_fixture(width as u16, height as u16),
            ImageType::Png | ImageType::Webp => png_fixture(width, height),
        }))
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.record(|log| log.close_attempts += 1);
        if let Some(delay) = self.script.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(|log| log.closes += 1);
        Ok(())
    }
}

/// Hands out [`ScriptedPage`]s that share one log.
pub(crate) struct ScriptedSource {
    script: PageScript,
    log: Arc<Mutex<PageLog>>,
    opened: AtomicUsize,
    fail_open: bool,
    open_delay: Option<Duration>,
}

impl ScriptedSource {
    pub(crate) fn new(script: PageScript) -> Self {
        Self {
            script,
            log: Arc::default(),
            opened: AtomicUsize::new(0),
            fail_open: false,
            open_delay: None,
        }
    }

    /// Pages take `delay` to open.
    pub(crate) fn slow_to_open(script: PageScript, delay: Duration) -> Self {
        Self {
            open_delay: Some(delay),
            ..Self::new(script)
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(PageScript::rendered())
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.log().closes
    }

    pub(crate) fn log(&self) -> PageLog {
        self.log.lock().expect("page log lock").clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn open_page(&self) -> Result<Box<dyn DiagramPage>, ResourceError> {
        if self.fail_open {
            return Err(ResourceError::open_page("scripted open failure"));
        }
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage::with_log(
            self.script.clone(),
            Arc::clone(&self.log),
        )))
    }
}
