//! Loading of meshes, materials and textures from external files.
//!
//! - `source` decides where bytes come from (files, HTTP, memory)
//! - `loader` runs fetches as detached tasks and hands results to the render thread
//! - `gltf`, `obj` and `texture` turn bytes into scene fragments and images

use std::path::Path;

pub mod gltf;
pub mod loader;
pub mod obj;
pub mod source;
pub mod texture;

pub use loader::{AssetLoader, LoadCallbacks, LoadId, LoadState, PendingLoad, Progress, Spawner};
pub use source::{AssetSource, HttpSource, MemorySource, SourceRouter};
#[cfg(not(target_arch = "wasm32"))]
pub use source::FileSource;

/// `Send` on native targets, nothing on the web where futures are local.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + ?Sized> MaybeSend for T {}
#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSend for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSync: Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Sync + ?Sized> MaybeSync for T {}
#[cfg(target_arch = "wasm32")]
pub trait MaybeSync {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSync for T {}

/// What a reference resolves to, decided by its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Gltf,
    Obj,
    Image,
}

impl AssetKind {
    pub fn of(reference: &str) -> Option<Self> {
        let ext = extension(reference)?;
        match ext.as_str() {
            "gltf" | "glb" => Some(Self::Gltf),
            "obj" => Some(Self::Obj),
            "png" | "jpg" | "jpeg" | "bmp" | "gif" | "webp" | "tga" | "hdr" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Lower-cased extension of a path or URL, ignoring query and fragment.
pub(crate) fn extension(reference: &str) -> Option<String> {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Resolves `relative` against the directory of `base`.
///
/// Absolute URLs, data URIs and rooted paths are returned unchanged.
pub(crate) fn sibling_reference(base: &str, relative: &str) -> String {
    if relative.contains("://") || relative.starts_with("data:") || relative.starts_with('/') {
        return relative.to_string();
    }
    match base.rfind('/') {
        Some(idx) => format!("{}/{}", &base[..idx], relative),
        None => relative.to_string(),
    }
}
