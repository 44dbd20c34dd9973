use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend::{self, FramePayload, LinkMap, RetryPolicy};

pub trait LinkService: Send + Sync {
    fn load_links(&self) -> Result<LinkMap>;
}

pub trait FrameService: Send + Sync {
    fn load_frame(&self, url: &str) -> Result<FramePayload>;
}

pub struct BackendLinkService {
    client: Arc<backend::Client>,
    retry: RetryPolicy,
}

impl BackendLinkService {
    pub fn new(client: Arc<backend::Client>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

impl LinkService for BackendLinkService {
    fn load_links(&self) -> Result<LinkMap> {
        self.retry
            .run(|_| self.client.links())
            .context("fetch links")
    }
}

pub struct BackendFrameService {
    client: Arc<backend::Client>,
}

impl BackendFrameService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl FrameService for BackendFrameService {
    fn load_frame(&self, url: &str) -> Result<FramePayload> {
        self.client.frame(url).context("fetch frame")
    }
}
