//! Scene graph and hierarchical scene organization.
//!
//! A [`Scene`] owns its nodes in a flat table keyed by [`NodeHandle`]; the
//! hierarchy is stored as parent/children links between handles. Node kinds
//! form a closed set ([`NodeKind`]): cameras, lights and meshes.
//!
//! Edits are plain structural mutations. [`Scene::render_frame`] copies the
//! state it needs into an owned [`Frame`], so whatever a tick draws is one
//! consistent snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix, Vector3};
use log::debug;

use crate::{
    data_structures::{
        camera::{clamp_beta, Camera, CameraMode, CameraView},
        color::{Color3, Color4},
        environment::{Environment, EnvironmentTexture, Skybox},
        light::Light,
        material::{Material, MaterialView},
        model::MeshData,
        transform::Transform,
    },
    error::SceneError,
    render::{DrawItem, Frame},
};

static NEXT_NODE_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity. A handle never refers to nodes of two scenes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u64);

impl NodeHandle {
    fn next() -> Self {
        Self(NEXT_NODE_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Mesh payload: optional geometry and at most one material.
///
/// A mesh without geometry only groups its children, like a loader root.
#[derive(Debug)]
pub struct Mesh {
    pub geometry: Option<Arc<MeshData>>,
    pub material: Option<Material>,
    pub pickable: bool,
}

impl Mesh {
    pub fn new(geometry: MeshData) -> Self {
        Self {
            geometry: Some(Arc::new(geometry)),
            material: None,
            pickable: true,
        }
    }

    pub fn empty() -> Self {
        Self {
            geometry: None,
            material: None,
            pickable: false,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Camera(Camera),
    Light(Light),
    Mesh(Mesh),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Camera(_) => "camera",
            NodeKind::Light(_) => "light",
            NodeKind::Mesh(_) => "mesh",
        }
    }
}

impl From<Camera> for NodeKind {
    fn from(camera: Camera) -> Self {
        NodeKind::Camera(camera)
    }
}

impl From<Light> for NodeKind {
    fn from(light: Light) -> Self {
        NodeKind::Light(light)
    }
}

impl From<Mesh> for NodeKind {
    fn from(mesh: Mesh) -> Self {
        NodeKind::Mesh(mesh)
    }
}

impl From<MeshData> for NodeKind {
    fn from(geometry: MeshData) -> Self {
        NodeKind::Mesh(Mesh::new(geometry))
    }
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    kind: NodeKind,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    pub fn as_camera(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&Light> {
        match &self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub(crate) fn as_light_mut(&mut self) -> Option<&mut Light> {
        match &mut self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub(crate) fn as_mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// Node description inside a [`SceneFragment`]. `parent` indexes an earlier
/// entry of the same fragment.
#[derive(Debug)]
pub struct FragmentNode {
    pub name: String,
    pub kind: NodeKind,
    pub transform: Transform,
    pub parent: Option<usize>,
}

/// A batch of nodes produced off-scene (usually by a loader) and merged in
/// one edit.
#[derive(Debug, Default)]
pub struct SceneFragment {
    pub nodes: Vec<FragmentNode>,
}

impl SceneFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its index within the fragment.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<NodeKind>,
        transform: Transform,
        parent: Option<usize>,
    ) -> usize {
        self.nodes.push(FragmentNode {
            name: name.into(),
            kind: kind.into(),
            transform,
            parent,
        });
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Named collection of nodes plus scene-level environment.
#[derive(Debug, Default)]
pub struct Scene {
    pub name: String,
    nodes: BTreeMap<NodeHandle, Node>,
    roots: Vec<NodeHandle>,
    environment: Environment,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a root node.
    ///
    /// A camera constructed with [`Camera::active`] becomes the active
    /// viewpoint and deactivates any previously active camera.
    pub fn create_node(&mut self, name: impl Into<String>, kind: impl Into<NodeKind>) -> NodeHandle {
        self.insert_node(name.into(), kind.into(), Transform::new(), None)
    }

    /// Adds a root node with an initial transform.
    pub fn create_node_at(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<NodeKind>,
        transform: Transform,
    ) -> NodeHandle {
        self.insert_node(name.into(), kind.into(), transform, None)
    }

    fn insert_node(
        &mut self,
        name: String,
        mut kind: NodeKind,
        mut transform: Transform,
        parent: Option<NodeHandle>,
    ) -> NodeHandle {
        let handle = NodeHandle::next();
        if let NodeKind::Camera(camera) = &mut kind {
            sync_camera_transform(camera, &mut transform);
            if camera.active {
                self.deactivate_cameras();
            }
        }
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.push(handle);
                }
            }
            None => self.roots.push(handle),
        }
        self.nodes.insert(
            handle,
            Node {
                name,
                transform,
                visible: true,
                kind,
                parent,
                children: Vec::new(),
            },
        );
        handle
    }

    fn deactivate_cameras(&mut self) {
        for node in self.nodes.values_mut() {
            if let NodeKind::Camera(camera) = &mut node.kind {
                camera.active = false;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(&handle)
    }

    /// Mutable access to the name, transform and visibility of a node.
    ///
    /// Kind payloads go through the `update_*` methods so scene invariants
    /// hold.
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(&handle)
    }

    fn get(&self, handle: NodeHandle) -> Result<&Node, SceneError> {
        self.nodes.get(&handle).ok_or(SceneError::UnknownNode(handle))
    }

    fn get_mut(&mut self, handle: NodeHandle) -> Result<&mut Node, SceneError> {
        self.nodes
            .get_mut(&handle)
            .ok_or(SceneError::UnknownNode(handle))
    }

    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.keys().copied()
    }

    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    pub fn children(&self, handle: NodeHandle) -> Result<&[NodeHandle], SceneError> {
        Ok(&self.get(handle)?.children)
    }

    pub fn parent(&self, handle: NodeHandle) -> Result<Option<NodeHandle>, SceneError> {
        Ok(self.get(handle)?.parent)
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        let mut found = None;
        self.walk(|handle, node| {
            if found.is_none() && node.name == name {
                found = Some(handle);
            }
        });
        found
    }

    /// Depth-first, pre-order traversal starting at the roots.
    pub fn walk(&self, mut visit: impl FnMut(NodeHandle, &Node)) {
        let mut stack: Vec<NodeHandle> = self.roots.iter().rev().copied().collect();
        while let Some(handle) = stack.pop() {
            if let Some(node) = self.nodes.get(&handle) {
                visit(handle, node);
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }

    /// Replaces the material of a mesh and returns the previous one.
    pub fn attach_material(
        &mut self,
        mesh: NodeHandle,
        material: Material,
    ) -> Result<Option<Material>, SceneError> {
        let node = self.get_mut(mesh)?;
        let mesh_payload = node.as_mesh_mut().ok_or(SceneError::WrongNodeKind {
            handle: mesh,
            expected: "mesh",
        })?;
        Ok(mesh_payload.material.replace(material))
    }

    pub fn detach_material(&mut self, mesh: NodeHandle) -> Result<Option<Material>, SceneError> {
        let node = self.get_mut(mesh)?;
        let mesh_payload = node.as_mesh_mut().ok_or(SceneError::WrongNodeKind {
            handle: mesh,
            expected: "mesh",
        })?;
        Ok(mesh_payload.material.take())
    }

    pub fn set_transform(&mut self, handle: NodeHandle, transform: Transform) -> Result<(), SceneError> {
        let node = self.get_mut(handle)?;
        node.transform = transform;
        if let NodeKind::Camera(camera) = &mut node.kind {
            sync_camera_transform(camera, &mut node.transform);
        }
        Ok(())
    }

    pub fn transform(&self, handle: NodeHandle) -> Result<Transform, SceneError> {
        Ok(self.get(handle)?.transform)
    }

    pub fn set_visible(&mut self, handle: NodeHandle, visible: bool) -> Result<(), SceneError> {
        self.get_mut(handle)?.visible = visible;
        Ok(())
    }

    /// Reparents `child`. `None` turns it into a root.
    pub fn set_parent(
        &mut self,
        child: NodeHandle,
        parent: Option<NodeHandle>,
    ) -> Result<(), SceneError> {
        self.get(child)?;
        if let Some(parent) = parent {
            self.get(parent)?;
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == child {
                    return Err(SceneError::ParentCycle { child, parent });
                }
                cursor = self.nodes.get(&current).and_then(|n| n.parent);
            }
        }
        self.unlink(child);
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.push(child);
                }
            }
            None => self.roots.push(child),
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = parent;
        }
        Ok(())
    }

    fn unlink(&mut self, handle: NodeHandle) {
        let parent = self.nodes.get(&handle).and_then(|n| n.parent);
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.retain(|c| *c != handle);
                }
            }
            None => self.roots.retain(|r| *r != handle),
        }
    }

    /// Removes a node together with its descendants.
    ///
    /// Returns every removed handle, the given one first.
    pub fn remove(&mut self, handle: NodeHandle) -> Result<Vec<NodeHandle>, SceneError> {
        self.get(handle)?;
        self.unlink(handle);
        let mut removed = Vec::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children.iter().rev().copied());
                removed.push(current);
            }
        }
        debug!("removed {} node(s) from scene '{}'", removed.len(), self.name);
        Ok(removed)
    }

    /// Inserts all fragment nodes in one edit and returns their handles in
    /// fragment order.
    ///
    /// The fragment is validated first; on error nothing is inserted.
    pub fn merge(&mut self, fragment: SceneFragment) -> Result<Vec<NodeHandle>, SceneError> {
        for (index, node) in fragment.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                if parent >= index {
                    return Err(SceneError::InvalidFragment(format!(
                        "fragment node {index} ('{}') references parent {parent} which does not precede it",
                        node.name
                    )));
                }
            }
        }
        let mut handles: Vec<NodeHandle> = Vec::with_capacity(fragment.nodes.len());
        for node in fragment.nodes {
            let parent = node.parent.map(|index| handles[index]);
            handles.push(self.insert_node(node.name, node.kind, node.transform, parent));
        }
        Ok(handles)
    }

    /// Makes `handle` the only active camera.
    pub fn set_active_camera(&mut self, handle: NodeHandle) -> Result<(), SceneError> {
        if self.get(handle)?.as_camera().is_none() {
            return Err(SceneError::WrongNodeKind {
                handle,
                expected: "camera",
            });
        }
        self.deactivate_cameras();
        if let Some(Node {
            kind: NodeKind::Camera(camera),
            ..
        }) = self.nodes.get_mut(&handle)
        {
            camera.active = true;
        }
        Ok(())
    }

    pub fn active_camera(&self) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|(_, node)| node.as_camera().is_some_and(|c| c.active))
            .map(|(handle, _)| *handle)
    }

    /// Edits a camera in place. Its active flag cannot be changed this way;
    /// use [`Scene::set_active_camera`].
    pub fn update_camera<R>(
        &mut self,
        handle: NodeHandle,
        update: impl FnOnce(&mut Camera) -> R,
    ) -> Result<R, SceneError> {
        let node = self.get_mut(handle)?;
        match &mut node.kind {
            NodeKind::Camera(camera) => {
                let active = camera.active;
                let result = update(camera);
                camera.active = active;
                if let CameraMode::ArcRotate { beta, radius, .. } = &mut camera.mode {
                    *beta = clamp_beta(*beta);
                    *radius = radius.max(f32::EPSILON);
                }
                sync_camera_transform(camera, &mut node.transform);
                Ok(result)
            }
            _ => Err(SceneError::WrongNodeKind {
                handle,
                expected: "camera",
            }),
        }
    }

    pub fn update_light<R>(
        &mut self,
        handle: NodeHandle,
        update: impl FnOnce(&mut Light) -> R,
    ) -> Result<R, SceneError> {
        let light = self.get_mut(handle)?.as_light_mut().ok_or(SceneError::WrongNodeKind {
            handle,
            expected: "light",
        })?;
        Ok(update(light))
    }

    pub fn update_mesh<R>(
        &mut self,
        handle: NodeHandle,
        update: impl FnOnce(&mut Mesh) -> R,
    ) -> Result<R, SceneError> {
        let mesh = self.get_mut(handle)?.as_mesh_mut().ok_or(SceneError::WrongNodeKind {
            handle,
            expected: "mesh",
        })?;
        Ok(update(mesh))
    }

    /// Local-to-world matrix of a node.
    pub fn world_matrix(&self, handle: NodeHandle) -> Result<Matrix4<f32>, SceneError> {
        let mut node = self.get(handle)?;
        let mut world = node.transform.to_matrix();
        while let Some(parent) = node.parent {
            node = self.get(parent)?;
            world = node.transform.to_matrix() * world;
        }
        Ok(world)
    }

    fn parent_world(&self, handle: NodeHandle) -> Result<Matrix4<f32>, SceneError> {
        match self.get(handle)?.parent {
            Some(parent) => self.world_matrix(parent),
            None => Ok(Matrix4::identity()),
        }
    }

    pub fn world_position(&self, handle: NodeHandle) -> Result<Vector3<f32>, SceneError> {
        Ok(self.world_matrix(handle)?.w.truncate())
    }

    /// Whether the node and all its ancestors are visible.
    pub fn is_visible(&self, handle: NodeHandle) -> bool {
        let mut cursor = Some(handle);
        while let Some(current) = cursor {
            match self.nodes.get(&current) {
                Some(node) if node.visible => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// World-space view of the active camera.
    pub fn active_camera_view(&self) -> Result<CameraView, SceneError> {
        let handle = self.active_camera().ok_or(SceneError::NoActiveCamera)?;
        let node = self.get(handle)?;
        let camera = node.as_camera().ok_or(SceneError::NoActiveCamera)?;
        Ok(camera.view(node.transform.position, &self.parent_world(handle)?))
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn set_environment_texture(&mut self, texture: EnvironmentTexture) {
        self.environment.texture = Some(texture);
    }

    pub fn set_environment_intensity(&mut self, intensity: f32) {
        self.environment.intensity = intensity;
    }

    pub fn create_default_skybox(&mut self, size: f32, pbr: bool, blur: f32) {
        self.environment.skybox = Some(Skybox { size, blur, pbr });
    }

    pub fn set_clear_colour(&mut self, colour: impl Into<Color4>) {
        self.environment.clear_colour = colour.into();
    }

    pub fn set_ambient_colour(&mut self, colour: impl Into<Color3>) {
        self.environment.ambient_colour = colour.into();
    }

    pub fn enable_glow(&mut self, intensity: f32) {
        self.environment.glow_intensity = Some(intensity);
    }

    /// Snapshot of the scene for one draw.
    ///
    /// Fails with [`SceneError::NoActiveCamera`] when no camera is active.
    /// Meshes without a material get the default material.
    pub fn render_frame(&self) -> Result<Frame, SceneError> {
        let camera = self.active_camera_view()?;
        let mut lights = Vec::new();
        let mut items = Vec::new();

        let mut stack: Vec<(NodeHandle, Matrix4<f32>)> = self
            .roots
            .iter()
            .rev()
            .map(|root| (*root, Matrix4::identity()))
            .collect();
        while let Some((handle, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get(&handle) else {
                continue;
            };
            // hidden parents hide their whole subtree
            if !node.visible {
                continue;
            }
            let world = parent_world * node.transform.to_matrix();
            match &node.kind {
                NodeKind::Light(light) => lights.push(light.view(&world)),
                NodeKind::Mesh(Mesh {
                    geometry: Some(geometry),
                    material,
                    ..
                }) => items.push(DrawItem {
                    node: handle,
                    mesh: geometry.clone(),
                    world,
                    material: material
                        .as_ref()
                        .map(Material::view)
                        .unwrap_or_else(MaterialView::default),
                }),
                NodeKind::Mesh(_) | NodeKind::Camera(_) => (),
            }
            stack.extend(node.children.iter().rev().map(|child| (*child, world)));
        }

        Ok(Frame {
            index: 0,
            camera: Some(camera),
            lights,
            items,
            environment: self.environment.clone(),
        })
    }
}

/// Arc-rotate cameras derive their position from alpha, beta and radius;
/// keep the node transform in step so world queries agree with the view.
fn sync_camera_transform(camera: &mut Camera, transform: &mut Transform) {
    if let CameraMode::ArcRotate { .. } = camera.mode {
        transform.position = camera.eye(transform.position);
    }
}
