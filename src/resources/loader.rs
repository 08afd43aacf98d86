//! Asynchronous asset loading that never blocks the render loop.
//!
//! Every load runs as a detached, abortable task (tokio on native,
//! `spawn_local` on the web). Tasks never touch the scene: they post
//! [`Delivery`] messages to a channel that the render thread drains at the
//! start of each tick, where completed payloads are merged and callbacks fire.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::channel::mpsc;
use futures::future::{AbortHandle, Abortable};
use futures::{FutureExt, StreamExt};
use log::{debug, warn};

use crate::{
    data_structures::{
        material::{Material, MaterialDesc, Texture},
        scene_graph::{NodeHandle, SceneFragment},
    },
    error::LoadError,
    flow::Stage,
    resources::{
        AssetKind, MaybeSend,
        gltf::load_gltf,
        obj::load_obj,
        source::{AssetSource, ProgressSink},
        texture::decode_image,
    },
};

static NEXT_LOAD_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Succeeded,
    Failed,
}

/// How far a fetch has come.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress {
    /// Completed share in `[0, 1]`; never decreases for one load.
    Ratio(f32),
    /// The source did not announce a total size.
    Indeterminate { bytes_loaded: u64 },
}

impl Progress {
    pub(crate) fn from_counts(loaded: u64, total: Option<u64>) -> Self {
        match total {
            Some(0) => Progress::Ratio(1.0),
            Some(total) => Progress::Ratio((loaded as f64 / total as f64).clamp(0.0, 1.0) as f32),
            None => Progress::Indeterminate {
                bytes_loaded: loaded,
            },
        }
    }

    pub fn ratio(&self) -> Option<f32> {
        match self {
            Progress::Ratio(r) => Some(*r),
            Progress::Indeterminate { .. } => None,
        }
    }

    /// Loaded megabytes truncated to two decimals, for indeterminate loads.
    pub fn megabytes(&self) -> Option<f32> {
        match self {
            Progress::Ratio(_) => None,
            Progress::Indeterminate { bytes_loaded } => {
                let mb = *bytes_loaded as f64 / (1024.0 * 1024.0);
                Some(((mb * 100.0).floor() / 100.0) as f32)
            }
        }
    }
}

#[derive(Debug)]
struct LoadStatus {
    state: LoadState,
    progress: Option<Progress>,
    error: Option<LoadError>,
    nodes: Vec<NodeHandle>,
}

/// Handle to an in-flight load. Clones observe the same load.
#[derive(Clone, Debug)]
pub struct PendingLoad {
    id: LoadId,
    reference: Arc<str>,
    status: Arc<Mutex<LoadStatus>>,
}

impl PendingLoad {
    fn new(reference: &str) -> Self {
        Self {
            id: LoadId(NEXT_LOAD_ID.fetch_add(1, Ordering::Relaxed)),
            reference: reference.into(),
            status: Arc::new(Mutex::new(LoadStatus {
                state: LoadState::Pending,
                progress: None,
                error: None,
                nodes: Vec::new(),
            })),
        }
    }

    fn status(&self) -> MutexGuard<'_, LoadStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> LoadId {
        self.id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn state(&self) -> LoadState {
        self.status().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() != LoadState::Pending
    }

    pub fn progress(&self) -> Option<Progress> {
        self.status().progress
    }

    pub fn error(&self) -> Option<LoadError> {
        self.status().error.clone()
    }

    /// Handles added to the scene by this load once it succeeded.
    pub fn nodes(&self) -> Vec<NodeHandle> {
        self.status().nodes.clone()
    }

    /// Stores `progress`, keeping ratios non-decreasing, and returns what was stored.
    fn record_progress(&self, progress: Progress) -> Progress {
        let mut status = self.status();
        let progress = match (status.progress, progress) {
            (Some(Progress::Ratio(prev)), Progress::Ratio(next)) => Progress::Ratio(prev.max(next)),
            (_, next) => next,
        };
        status.progress = Some(progress);
        progress
    }

    pub(crate) fn succeed(&self, nodes: Vec<NodeHandle>) {
        let mut status = self.status();
        if status.state == LoadState::Pending {
            status.state = LoadState::Succeeded;
            status.nodes = nodes;
        }
    }

    pub(crate) fn fail(&self, error: LoadError) {
        let mut status = self.status();
        if status.state == LoadState::Pending {
            status.state = LoadState::Failed;
            status.error = Some(error);
        }
    }
}

pub type ProgressCallback = Box<dyn FnMut(Progress)>;
pub type SuccessCallback = Box<dyn FnOnce(&mut Stage, &[NodeHandle])>;
pub type ErrorCallback = Box<dyn FnOnce(&mut Stage, &LoadError)>;
pub type TextureCallback = Box<dyn FnOnce(&mut Stage, Texture)>;

/// Callbacks of one load. All of them run on the render thread.
#[derive(Default)]
pub struct LoadCallbacks {
    on_progress: Option<ProgressCallback>,
    pub(crate) on_success: Option<SuccessCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl LoadCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl FnMut(Progress) + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Called after the payload was merged with the handles it added.
    pub fn on_success(mut self, f: impl FnOnce(&mut Stage, &[NodeHandle]) + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&mut Stage, &LoadError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Result of a finished fetch, ready to apply to a scene.
#[derive(Debug)]
pub(crate) enum Payload {
    Fragment(SceneFragment),
    Material { mesh: NodeHandle, material: Material },
    Texture(Texture),
}

#[derive(Debug)]
enum Delivery {
    Progress(LoadId, Progress),
    Done(LoadId, Result<Payload, LoadError>),
}

/// A load whose task has finished, handed to the stage to apply.
pub(crate) struct Completion {
    pub load: PendingLoad,
    pub result: Result<Payload, LoadError>,
    pub callbacks: LoadCallbacks,
    pub on_texture: Option<TextureCallback>,
}

struct Entry {
    load: PendingLoad,
    callbacks: LoadCallbacks,
    on_texture: Option<TextureCallback>,
    abort: Option<AbortHandle>,
    cancelled: bool,
}

enum Job {
    Model(AssetKind),
    Texture,
    Material { mesh: NodeHandle, desc: MaterialDesc },
}

impl Job {
    async fn run(
        self,
        source: &dyn AssetSource,
        reference: &str,
        progress: ProgressSink<'_>,
    ) -> Result<Payload, LoadError> {
        match self {
            Job::Model(AssetKind::Gltf) => {
                let bytes = source.fetch(reference, progress).await?;
                load_gltf(source, reference, &bytes).await.map(Payload::Fragment)
            }
            Job::Model(AssetKind::Obj) => {
                let bytes = source.fetch(reference, progress).await?;
                load_obj(source, reference, &bytes).await.map(Payload::Fragment)
            }
            Job::Model(AssetKind::Image) | Job::Texture => {
                let bytes = source.fetch(reference, progress).await?;
                let image = decode_image(reference, &bytes, None)?;
                Ok(Payload::Texture(Texture::from_image(reference, image)))
            }
            Job::Material { mesh, desc } => {
                let total = desc.textures.len() as u64;
                let mut ignore = |_: u64, _: Option<u64>| ();
                let mut images = Vec::with_capacity(desc.textures.len());
                for (done, tex) in desc.textures.iter().enumerate() {
                    if AssetKind::of(&tex.reference) != Some(AssetKind::Image) {
                        return Err(LoadError::unresolved(
                            tex.reference.clone(),
                            "texture reference is not an image",
                        ));
                    }
                    let bytes = source.fetch(&tex.reference, &mut ignore).await?;
                    images.push((tex.clone(), decode_image(&tex.reference, &bytes, None)?));
                    progress(done as u64 + 1, Some(total));
                }
                Ok(Payload::Material {
                    mesh,
                    material: desc.build(images),
                })
            }
        }
    }
}

/// Runs load tasks: a tokio handle on native, the browser's microtask queue on
/// the web.
#[derive(Clone, Debug)]
pub struct Spawner {
    #[cfg(not(target_arch = "wasm32"))]
    handle: tokio::runtime::Handle,
}

impl Spawner {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the tokio runtime the caller is running in, if any.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current()
            .ok()
            .map(Self::from_handle)
    }

    #[cfg(target_arch = "wasm32")]
    pub fn local() -> Self {
        Self {}
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + MaybeSend + 'static,
    {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.handle.spawn(fut);
        }
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(fut);
    }
}

/// Issues loads and collects their results for the render thread.
pub struct AssetLoader {
    source: Arc<dyn AssetSource>,
    spawner: Spawner,
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    entries: HashMap<LoadId, Entry>,
    /// Loads whose task has not delivered its result yet.
    outstanding: HashSet<LoadId>,
    ready: VecDeque<Delivery>,
}

impl AssetLoader {
    pub fn new(source: Arc<dyn AssetSource>, spawner: Spawner) -> Self {
        let (sender, receiver) = mpsc::unbounded();
        Self {
            source,
            spawner,
            sender,
            receiver,
            entries: HashMap::new(),
            outstanding: HashSet::new(),
            ready: VecDeque::new(),
        }
    }

    /// Starts loading a model or image. Never blocks.
    pub fn load(&mut self, reference: &str) -> PendingLoad {
        self.load_with(reference, LoadCallbacks::default())
    }

    pub fn load_with(&mut self, reference: &str, callbacks: LoadCallbacks) -> PendingLoad {
        let job = AssetKind::of(reference).map(Job::Model);
        self.start(reference, job, callbacks, None)
    }

    /// Loads an image and hands the decoded texture to `on_loaded`.
    pub fn load_texture(
        &mut self,
        reference: &str,
        on_loaded: impl FnOnce(&mut Stage, Texture) + 'static,
    ) -> PendingLoad {
        self.load_texture_with(reference, on_loaded, LoadCallbacks::default())
    }

    pub fn load_texture_with(
        &mut self,
        reference: &str,
        on_loaded: impl FnOnce(&mut Stage, Texture) + 'static,
        callbacks: LoadCallbacks,
    ) -> PendingLoad {
        let job = (AssetKind::of(reference) == Some(AssetKind::Image)).then_some(Job::Texture);
        self.start(reference, job, callbacks, Some(Box::new(on_loaded)))
    }

    /// Fetches every texture of `desc`, then attaches the built material to
    /// `mesh`, replacing its current one.
    pub fn load_material(
        &mut self,
        mesh: NodeHandle,
        desc: MaterialDesc,
        callbacks: LoadCallbacks,
    ) -> PendingLoad {
        let reference = desc.name.clone();
        self.start(&reference, Some(Job::Material { mesh, desc }), callbacks, None)
    }

    fn start(
        &mut self,
        reference: &str,
        job: Option<Job>,
        callbacks: LoadCallbacks,
        on_texture: Option<TextureCallback>,
    ) -> PendingLoad {
        let load = PendingLoad::new(reference);
        let id = load.id();
        let abort = match job {
            Some(job) => Some(self.spawn_job(id, reference.to_string(), job)),
            None => {
                // surfaces on the next tick like any other failure
                self.ready.push_back(Delivery::Done(
                    id,
                    Err(LoadError::unresolved(reference, "no loader for this kind of asset")),
                ));
                None
            }
        };
        debug!("load {:?} started for '{}'", id, reference);
        self.entries.insert(
            id,
            Entry {
                load: load.clone(),
                callbacks,
                on_texture,
                abort,
                cancelled: false,
            },
        );
        load
    }

    fn spawn_job(&mut self, id: LoadId, reference: String, job: Job) -> AbortHandle {
        let (abort, registration) = AbortHandle::new_pair();
        let sender = self.sender.clone();
        let source = self.source.clone();
        let task = async move {
            let progress_sender = sender.clone();
            let mut report = move |loaded: u64, total: Option<u64>| {
                let _ = progress_sender
                    .unbounded_send(Delivery::Progress(id, Progress::from_counts(loaded, total)));
            };
            let result = job.run(source.as_ref(), &reference, &mut report).await;
            // the loader may be gone already
            let _ = sender.unbounded_send(Delivery::Done(id, result));
        };
        self.outstanding.insert(id);
        self.spawner
            .spawn(Abortable::new(task, registration).map(|_| ()));
        abort
    }

    /// Aborts a load. It completes as failed with a cancellation error on the
    /// next tick, even if its task already delivered a result that has not
    /// been applied yet. Returns `false` if the load was already applied or
    /// cancelled.
    pub fn cancel(&mut self, id: LoadId) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if entry.cancelled {
            return false;
        }
        entry.cancelled = true;
        if let Some(abort) = &entry.abort {
            abort.abort();
        }
        let reference = entry.load.reference().to_string();
        self.outstanding.remove(&id);
        self.ready
            .retain(|delivery| !matches!(delivery, Delivery::Done(done, _) if *done == id));
        self.ready
            .push_back(Delivery::Done(id, Err(LoadError::cancelled(reference))));
        true
    }

    pub fn cancel_all(&mut self) -> usize {
        let ids: Vec<LoadId> = self.entries.keys().copied().collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Loads whose callbacks have not run yet.
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }

    /// Waits until every spawned task has delivered its result. Results are
    /// still applied by the next tick.
    pub async fn wait_idle(&mut self) {
        while !self.outstanding.is_empty() {
            match self.receiver.next().await {
                Some(delivery) => self.accept(delivery),
                None => break,
            }
        }
    }

    fn accept(&mut self, delivery: Delivery) {
        if let Delivery::Done(id, _) = &delivery {
            self.outstanding.remove(id);
        }
        self.ready.push_back(delivery);
    }

    /// Drains the channel without blocking, reports progress and returns the
    /// loads that finished.
    pub(crate) fn take_completions(&mut self) -> Vec<Completion> {
        while let Some(Some(delivery)) = self.receiver.next().now_or_never() {
            self.accept(delivery);
        }
        let mut completions = Vec::new();
        while let Some(delivery) = self.ready.pop_front() {
            match delivery {
                Delivery::Progress(id, progress) => {
                    if let Some(entry) = self.entries.get_mut(&id) {
                        let progress = entry.load.record_progress(progress);
                        if let Some(on_progress) = entry.callbacks.on_progress.as_mut() {
                            on_progress(progress);
                        }
                    }
                }
                Delivery::Done(id, result) => match self.entries.remove(&id) {
                    Some(entry) => completions.push(Completion {
                        load: entry.load,
                        result,
                        callbacks: entry.callbacks,
                        on_texture: entry.on_texture,
                    }),
                    None => warn!("dropping result of unknown or cancelled load {:?}", id),
                },
            }
        }
        completions
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            if let Some(abort) = &entry.abort {
                abort.abort();
            }
        }
    }
}
