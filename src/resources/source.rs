//! Where asset bytes come from.
//!
//! An [`AssetSource`] turns an opaque reference into bytes and reports how far
//! along it is. References are passed through unmodified; each source decides
//! how to resolve them (against a directory, a base URL or a lookup table).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{LoadError, LoadErrorKind};
use crate::resources::{MaybeSend, MaybeSync};

#[cfg(not(target_arch = "wasm32"))]
pub type SourceFuture<'a, T> = futures::future::BoxFuture<'a, T>;
#[cfg(target_arch = "wasm32")]
pub type SourceFuture<'a, T> = futures::future::LocalBoxFuture<'a, T>;

/// Receives `(bytes_loaded, total)` while a fetch streams in.
#[cfg(not(target_arch = "wasm32"))]
pub type ProgressSink<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);
#[cfg(target_arch = "wasm32")]
pub type ProgressSink<'a> = &'a mut dyn FnMut(u64, Option<u64>);

const CHUNK_SIZE: usize = 64 * 1024;

pub trait AssetSource: MaybeSend + MaybeSync {
    fn fetch<'a>(
        &'a self,
        reference: &'a str,
        progress: ProgressSink<'a>,
    ) -> SourceFuture<'a, Result<Vec<u8>, LoadError>>;
}

#[cfg(not(target_arch = "wasm32"))]
fn boxed<'a, F>(fut: F) -> SourceFuture<'a, F::Output>
where
    F: std::future::Future + Send + 'a,
{
    Box::pin(fut)
}

#[cfg(target_arch = "wasm32")]
fn boxed<'a, F>(fut: F) -> SourceFuture<'a, F::Output>
where
    F: std::future::Future + 'a,
{
    Box::pin(fut)
}

/// Reads references as paths below a root directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct FileSource {
    root: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    async fn read(&self, reference: &str, progress: ProgressSink<'_>) -> Result<Vec<u8>, LoadError> {
        use tokio::io::AsyncReadExt;

        let path = self.root.join(reference);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| LoadError::from_io(reference, &e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| LoadError::from_io(reference, &e))?
            .len();
        let mut data = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut chunk)
                .await
                .map_err(|e| LoadError::from_io(reference, &e))?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            progress(data.len() as u64, Some(total));
        }
        Ok(data)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetSource for FileSource {
    fn fetch<'a>(
        &'a self,
        reference: &'a str,
        progress: ProgressSink<'a>,
    ) -> SourceFuture<'a, Result<Vec<u8>, LoadError>> {
        boxed(self.read(reference, progress))
    }
}

/// Fetches references over HTTP(S), relative ones against a base URL.
#[derive(Clone, Debug)]
pub struct HttpSource {
    base: Option<reqwest::Url>,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base: Option<&str>) -> Result<Self, LoadError> {
        let base = base
            .map(|b| {
                // a trailing slash keeps the last path segment on join
                let b = if b.ends_with('/') {
                    b.to_string()
                } else {
                    format!("{b}/")
                };
                reqwest::Url::parse(&b).map_err(|e| LoadError::unresolved(b.clone(), e))
            })
            .transpose()?;
        Ok(Self {
            base,
            client: reqwest::Client::new(),
        })
    }

    /// Base URL of the page's `assets/` folder.
    #[cfg(target_arch = "wasm32")]
    pub fn from_location() -> Result<Self, LoadError> {
        let origin = web_sys::window()
            .and_then(|window| window.location().origin().ok())
            .ok_or_else(|| LoadError::unresolved("window.location", "no browser window"))?;
        Self::new(Some(&format!("{origin}/assets")))
    }

    fn url(&self, reference: &str) -> Result<reqwest::Url, LoadError> {
        let parsed = match &self.base {
            _ if reference.contains("://") => reqwest::Url::parse(reference),
            Some(base) => base.join(reference),
            None => reqwest::Url::parse(reference),
        };
        parsed.map_err(|e| LoadError::unresolved(reference, e))
    }

    async fn get(&self, reference: &str, progress: ProgressSink<'_>) -> Result<Vec<u8>, LoadError> {
        let url = self.url(reference)?;
        let network = |e: reqwest::Error| LoadError::new(LoadErrorKind::Network, reference, e);
        #[allow(unused_mut)]
        let mut response = self.client.get(url).send().await.map_err(network)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LoadError::not_found(reference));
        }
        if !status.is_success() {
            return Err(LoadError::new(
                LoadErrorKind::Network,
                reference,
                format!("server answered {status}"),
            ));
        }
        let total = response.content_length();

        #[cfg(not(target_arch = "wasm32"))]
        let data = {
            let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
            while let Some(chunk) = response.chunk().await.map_err(network)? {
                data.extend_from_slice(&chunk);
                progress(data.len() as u64, total);
            }
            data
        };
        #[cfg(target_arch = "wasm32")]
        let data = {
            let data = response.bytes().await.map_err(network)?.to_vec();
            progress(data.len() as u64, total);
            data
        };
        Ok(data)
    }
}

impl AssetSource for HttpSource {
    fn fetch<'a>(
        &'a self,
        reference: &'a str,
        progress: ProgressSink<'a>,
    ) -> SourceFuture<'a, Result<Vec<u8>, LoadError>> {
        boxed(self.get(reference, progress))
    }
}

/// In-memory table of assets.
///
/// Reports progress in fixed chunks; [`MemorySource::without_length`] hides
/// the total to mimic a response without a content length.
#[derive(Debug, Default)]
pub struct MemorySource {
    assets: RwLock<HashMap<String, Vec<u8>>>,
    chunk_size: usize,
    hide_length: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            assets: RwLock::default(),
            chunk_size: 1024,
            hide_length: false,
        }
    }

    pub fn without_length(mut self) -> Self {
        self.hide_length = true;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with(self, reference: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(reference, bytes);
        self
    }

    pub fn insert(&self, reference: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut assets = self.assets.write().unwrap_or_else(|e| e.into_inner());
        assets.insert(reference.into(), bytes.into());
    }

    fn read(&self, reference: &str, progress: ProgressSink<'_>) -> Result<Vec<u8>, LoadError> {
        let assets = self.assets.read().unwrap_or_else(|e| e.into_inner());
        let bytes = assets
            .get(reference)
            .cloned()
            .ok_or_else(|| LoadError::not_found(reference))?;
        let total = (!self.hide_length).then_some(bytes.len() as u64);
        let mut loaded = 0usize;
        for chunk in bytes.chunks(self.chunk_size.max(1)) {
            loaded += chunk.len();
            progress(loaded as u64, total);
        }
        Ok(bytes)
    }
}

impl AssetSource for MemorySource {
    fn fetch<'a>(
        &'a self,
        reference: &'a str,
        progress: ProgressSink<'a>,
    ) -> SourceFuture<'a, Result<Vec<u8>, LoadError>> {
        let result = self.read(reference, progress);
        boxed(async move { result })
    }
}

/// Sends absolute URLs to HTTP and everything else to the fallback source.
pub struct SourceRouter {
    http: HttpSource,
    fallback: Box<dyn AssetSource>,
}

impl SourceRouter {
    pub fn new(http: HttpSource, fallback: impl AssetSource + 'static) -> Self {
        Self {
            http,
            fallback: Box::new(fallback),
        }
    }
}

impl AssetSource for SourceRouter {
    fn fetch<'a>(
        &'a self,
        reference: &'a str,
        progress: ProgressSink<'a>,
    ) -> SourceFuture<'a, Result<Vec<u8>, LoadError>> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            self.http.fetch(reference, progress)
        } else {
            self.fallback.fetch(reference, progress)
        }
    }
}
