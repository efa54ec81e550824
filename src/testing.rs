//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};

use crate::loader::{FetchError, FetchMode, FetchResponse, Fetcher};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]));
    let mut out = Cursor::new(Vec::new());

    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageOutputFormat::Png)
        .expect("encoding a small PNG cannot fail");

    out.into_inner()
}

pub fn png_data_uri(width: u32, height: u32) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png_bytes(width, height))
    )
}

#[derive(Debug, Clone)]
pub enum StubReply {
    Body { bytes: Vec<u8>, allows_cors: bool },
    /// A PNG that takes `delay` to arrive; requests with a shorter timeout
    /// fail. Nothing actually sleeps.
    Slow { bytes: Vec<u8>, delay: Duration },
    Fail(FetchError),
}

impl StubReply {
    pub fn png(width: u32, height: u32) -> Self {
        Self::Body {
            bytes: png_bytes(width, height),
            allows_cors: true,
        }
    }

    /// Served fine, but without a cross-origin grant.
    pub fn opaque_png(width: u32, height: u32) -> Self {
        Self::Body {
            bytes: png_bytes(width, height),
            allows_cors: false,
        }
    }

    pub fn slow_png(width: u32, height: u32, delay: Duration) -> Self {
        Self::Slow {
            bytes: png_bytes(width, height),
            delay,
        }
    }
}

/// In-memory [`Fetcher`] that records every request.
#[derive(Default)]
pub struct StubFetcher {
    replies: HashMap<String, StubReply>,
    calls: Mutex<Vec<(String, FetchMode)>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl StubFetcher {
    pub fn with(mut self, url: &str, reply: StubReply) -> Self {
        self.replies.insert(url.to_owned(), reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, FetchMode)> {
        self.calls.lock().unwrap().clone()
    }

    /// Timeout passed with each request, in call order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, url: &str, mode: FetchMode, timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push((url.to_owned(), mode));
        self.timeouts.lock().unwrap().push(timeout);

        match self.replies.get(url) {
            None => Err(FetchError::Status(404)),
            Some(StubReply::Fail(err)) => Err(err.clone()),
            Some(StubReply::Body { allows_cors: false, .. }) if mode == FetchMode::Cors => {
                Err(FetchError::Blocked)
            }
            Some(StubReply::Slow { delay, .. }) if *delay > timeout => Err(FetchError::TimedOut),
            Some(StubReply::Body { bytes, .. } | StubReply::Slow { bytes, .. }) => Ok(FetchResponse {
                body: bytes.clone(),
            }),
        }
    }
}
