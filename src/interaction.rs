//! Input and per-frame actions bound to scene mutations.
//!
//! An [`InteractionLayer`] owns an explicit table of bindings, each mapping a
//! [`Trigger`] on a [`Target`] to an [`Effect`]. Field paths are parsed and
//! checked against the target when binding, so a binding that could never
//! apply is rejected up front with [`SceneError::InvalidBinding`].
//!
//! Pointer bindings run synchronously inside pointer dispatch. Every-frame
//! bindings run once per tick, before the frame is drawn.

use cgmath::Vector3;
use log::{debug, warn};

use crate::{
    data_structures::{
        material::Material,
        scene_graph::{NodeHandle, NodeKind, Scene},
    },
    error::SceneError,
    resources::AssetLoader,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    PointerDown,
    /// Fires when the pointer enters a mesh.
    PointerOver,
    EveryFrame,
}

impl Trigger {
    fn is_pointer(self) -> bool {
        matches!(self, Trigger::PointerDown | Trigger::PointerOver)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Node(NodeHandle),
    Scene,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Scalar(f32),
    Vector(Vector3<f32>),
    Bool(bool),
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Scalar(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vector3<f32>> for Value {
    fn from(v: Vector3<f32>) -> Self {
        Value::Vector(v)
    }
}

impl From<[f32; 3]> for Value {
    fn from(v: [f32; 3]) -> Self {
        Value::Vector(v.into())
    }
}

impl Value {
    fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Vector(_) => ValueKind::Vector,
            Value::Bool(_) => ValueKind::Bool,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueKind {
    Scalar,
    Vector,
    Bool,
}

/// What a handler gets to know about the event that fired it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionEvent {
    pub trigger: Trigger,
    pub target: Target,
    /// Mesh under the pointer for pointer triggers.
    pub source: Option<NodeHandle>,
    pub pointer: Option<(f32, f32)>,
    pub frame: u64,
    /// Seconds since the previous tick; zero for pointer triggers.
    pub dt: f32,
}

pub type Handler = Box<dyn FnMut(&ActionEvent, &mut Scene, &mut AssetLoader)>;

pub enum Effect {
    SetValue { field: String, value: Value },
    Increment { field: String, delta: Value },
    Execute(Handler),
}

impl Effect {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Effect::SetValue {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn increment(field: impl Into<String>, delta: impl Into<Value>) -> Self {
        Effect::Increment {
            field: field.into(),
            delta: delta.into(),
        }
    }

    pub fn execute(handler: impl FnMut(&ActionEvent, &mut Scene, &mut AssetLoader) + 'static) -> Self {
        Effect::Execute(Box::new(handler))
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::SetValue { field, value } => write!(f, "SetValue({field} = {value:?})"),
            Effect::Increment { field, delta } => write!(f, "Increment({field} += {delta:?})"),
            Effect::Execute(_) => write!(f, "Execute(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Position(Option<Axis>),
    Rotation(Option<Axis>),
    Scaling(Option<Axis>),
    Visible,
    Intensity,
    Fov,
    MaterialAlpha,
    MaterialRoughness,
    MaterialMetallic,
    MaterialEmissiveIntensity,
    EnvironmentIntensity,
}

impl Field {
    fn parse(path: &str) -> Option<Self> {
        let (head, axis) = match path.rsplit_once('.') {
            Some((head, "x")) => (head, Some(Axis::X)),
            Some((head, "y")) => (head, Some(Axis::Y)),
            Some((head, "z")) => (head, Some(Axis::Z)),
            _ => (path, None),
        };
        let field = match (head, axis) {
            ("position", axis) => Field::Position(axis),
            ("rotation", axis) => Field::Rotation(axis),
            ("scaling" | "scale", axis) => Field::Scaling(axis),
            ("visible" | "isVisible", None) => Field::Visible,
            ("intensity", None) => Field::Intensity,
            ("fov", None) => Field::Fov,
            ("material.alpha", None) => Field::MaterialAlpha,
            ("material.roughness", None) => Field::MaterialRoughness,
            ("material.metallic", None) => Field::MaterialMetallic,
            ("material.emissiveIntensity", None) => Field::MaterialEmissiveIntensity,
            ("environmentIntensity", None) => Field::EnvironmentIntensity,
            _ => return None,
        };
        Some(field)
    }

    fn value_kind(self) -> ValueKind {
        match self {
            Field::Position(None) | Field::Rotation(None) | Field::Scaling(None) => ValueKind::Vector,
            Field::Visible => ValueKind::Bool,
            _ => ValueKind::Scalar,
        }
    }

    /// Checks that the field exists on `target`.
    fn check_target(self, target: Target, kind: Option<&NodeKind>) -> Result<(), String> {
        let ok = match (self, kind) {
            (Field::EnvironmentIntensity, None) => true,
            (Field::EnvironmentIntensity, Some(_)) | (_, None) => false,
            (
                Field::Position(_) | Field::Rotation(_) | Field::Scaling(_) | Field::Visible,
                Some(_),
            ) => true,
            (Field::Intensity, Some(NodeKind::Light(_))) => true,
            (Field::Fov, Some(NodeKind::Camera(_))) => true,
            (
                Field::MaterialAlpha
                | Field::MaterialRoughness
                | Field::MaterialMetallic
                | Field::MaterialEmissiveIntensity,
                Some(NodeKind::Mesh(_)),
            ) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            let on = match kind {
                Some(kind) => kind.label(),
                None => "scene",
            };
            Err(format!("field {self:?} does not exist on {on} target {target:?}"))
        }
    }
}

enum Action {
    Set(Field, Value),
    Increment(Field, Value),
    Execute(Handler),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

struct ActionBinding {
    id: BindingId,
    trigger: Trigger,
    target: Target,
    action: Action,
}

/// Pointer input as seen by the interaction layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32, hit: Option<NodeHandle> },
    Move { x: f32, y: f32, hit: Option<NodeHandle> },
}

/// Table of action bindings, evaluated in registration order.
#[derive(Default)]
pub struct InteractionLayer {
    bindings: Vec<ActionBinding>,
    next_id: u64,
    hovered: Option<NodeHandle>,
    last_frame: Option<u64>,
}

impl InteractionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn bind(
        &mut self,
        scene: &Scene,
        trigger: Trigger,
        target: Target,
        effect: Effect,
    ) -> Result<BindingId, SceneError> {
        let kind = match target {
            Target::Node(handle) => Some(
                scene
                    .node(handle)
                    .ok_or_else(|| {
                        SceneError::InvalidBinding(format!("target {handle:?} is not in the scene"))
                    })?
                    .kind(),
            ),
            Target::Scene => None,
        };
        if trigger.is_pointer() {
            if let Some(kind @ (NodeKind::Camera(_) | NodeKind::Light(_))) = kind {
                return Err(SceneError::InvalidBinding(format!(
                    "{trigger:?} cannot target a {}",
                    kind.label()
                )));
            }
        }
        let action = match effect {
            Effect::SetValue { field, value } => {
                let parsed = compile_field(&field, target, kind, value)?;
                Action::Set(parsed, value)
            }
            Effect::Increment { field, delta } => {
                if let Value::Bool(_) = delta {
                    return Err(SceneError::InvalidBinding(format!(
                        "cannot increment '{field}' by a boolean"
                    )));
                }
                let parsed = compile_field(&field, target, kind, delta)?;
                Action::Increment(parsed, delta)
            }
            Effect::Execute(handler) => Action::Execute(handler),
        };

        self.next_id += 1;
        let id = BindingId(self.next_id);
        self.bindings.push(ActionBinding {
            id,
            trigger,
            target,
            action,
        });
        debug!("bound {trigger:?} on {target:?} as {id:?}");
        Ok(id)
    }

    pub fn unbind(&mut self, id: BindingId) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|binding| binding.id != id);
        before != self.bindings.len()
    }

    /// Detaches every binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.hovered = None;
    }

    /// Drops bindings whose target node left the scene.
    fn prune(&mut self, scene: &Scene) {
        self.bindings.retain(|binding| match binding.target {
            Target::Node(handle) if !scene.contains(handle) => {
                warn!("dropping {:?}: target {handle:?} was removed", binding.id);
                false
            }
            _ => true,
        });
        if self.hovered.is_some_and(|h| !scene.contains(h)) {
            self.hovered = None;
        }
    }

    /// Runs pointer bindings for `event`. Returns how many bindings ran.
    pub fn dispatch_pointer(
        &mut self,
        scene: &mut Scene,
        loader: &mut AssetLoader,
        event: PointerEvent,
        frame: u64,
    ) -> usize {
        self.prune(scene);
        let (trigger, x, y, hit) = match event {
            PointerEvent::Down { x, y, hit } => (Trigger::PointerDown, x, y, hit),
            PointerEvent::Move { x, y, hit } => {
                let entered = hit.filter(|h| self.hovered != Some(*h));
                self.hovered = hit;
                (Trigger::PointerOver, x, y, entered)
            }
        };
        let Some(hit) = hit else {
            return 0;
        };
        let mut ran = 0;
        for binding in &mut self.bindings {
            if binding.trigger != trigger {
                continue;
            }
            if binding.target != Target::Node(hit) && binding.target != Target::Scene {
                continue;
            }
            let event = ActionEvent {
                trigger,
                target: binding.target,
                source: Some(hit),
                pointer: Some((x, y)),
                frame,
                dt: 0.0,
            };
            run(binding, &event, scene, loader);
            ran += 1;
        }
        ran
    }

    /// Runs every-frame bindings, at most once per `frame`.
    pub fn dispatch_frame(
        &mut self,
        scene: &mut Scene,
        loader: &mut AssetLoader,
        frame: u64,
        dt: f32,
    ) -> usize {
        if self.last_frame == Some(frame) {
            return 0;
        }
        self.last_frame = Some(frame);
        self.prune(scene);
        let mut ran = 0;
        for binding in &mut self.bindings {
            if binding.trigger != Trigger::EveryFrame {
                continue;
            }
            let event = ActionEvent {
                trigger: Trigger::EveryFrame,
                target: binding.target,
                source: None,
                pointer: None,
                frame,
                dt,
            };
            run(binding, &event, scene, loader);
            ran += 1;
        }
        ran
    }
}

fn compile_field(
    path: &str,
    target: Target,
    kind: Option<&NodeKind>,
    value: Value,
) -> Result<Field, SceneError> {
    let field = Field::parse(path)
        .ok_or_else(|| SceneError::InvalidBinding(format!("unknown field '{path}'")))?;
    field
        .check_target(target, kind)
        .map_err(SceneError::InvalidBinding)?;
    if field.value_kind() != value.kind() {
        return Err(SceneError::InvalidBinding(format!(
            "'{path}' expects a {:?} value, got {value:?}",
            field.value_kind()
        )));
    }
    Ok(field)
}

fn run(binding: &mut ActionBinding, event: &ActionEvent, scene: &mut Scene, loader: &mut AssetLoader) {
    let result = match &mut binding.action {
        Action::Set(field, value) => apply(scene, binding.target, *field, *value, false),
        Action::Increment(field, delta) => apply(scene, binding.target, *field, *delta, true),
        Action::Execute(handler) => {
            handler(event, scene, loader);
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!("{:?} on {:?} skipped: {e}", binding.id, binding.target);
    }
}

fn combine(current: f32, value: f32, add: bool) -> f32 {
    if add { current + value } else { value }
}

fn apply_vector(current: &mut Vector3<f32>, axis: Option<Axis>, value: Value, add: bool) {
    match (axis, value) {
        (None, Value::Vector(v)) => *current = if add { *current + v } else { v },
        (Some(Axis::X), Value::Scalar(s)) => current.x = combine(current.x, s, add),
        (Some(Axis::Y), Value::Scalar(s)) => current.y = combine(current.y, s, add),
        (Some(Axis::Z), Value::Scalar(s)) => current.z = combine(current.z, s, add),
        _ => (),
    }
}

fn apply(scene: &mut Scene, target: Target, field: Field, value: Value, add: bool) -> Result<(), SceneError> {
    let scalar = match value {
        Value::Scalar(s) => s,
        _ => 0.0,
    };
    let handle = match target {
        Target::Node(handle) => handle,
        Target::Scene => {
            if let Field::EnvironmentIntensity = field {
                let env = scene.environment_mut();
                env.intensity = combine(env.intensity, scalar, add);
            }
            return Ok(());
        }
    };
    match field {
        Field::Position(axis) | Field::Rotation(axis) | Field::Scaling(axis) => {
            let mut transform = scene.transform(handle)?;
            match field {
                Field::Position(_) => apply_vector(&mut transform.position, axis, value, add),
                Field::Rotation(_) => {
                    // Euler edits take over from a loader-provided quaternion
                    transform.rotation_quaternion = None;
                    apply_vector(&mut transform.rotation, axis, value, add)
                }
                _ => apply_vector(&mut transform.scale, axis, value, add),
            }
            scene.set_transform(handle, transform)
        }
        Field::Visible => {
            if let Value::Bool(visible) = value {
                scene.set_visible(handle, visible)?;
            }
            Ok(())
        }
        Field::Intensity => scene.update_light(handle, |light| {
            light.intensity = combine(light.intensity, scalar, add);
        }),
        Field::Fov => scene.update_camera(handle, |camera| {
            camera.fov = combine(camera.fov, scalar, add);
        }),
        Field::MaterialAlpha
        | Field::MaterialRoughness
        | Field::MaterialMetallic
        | Field::MaterialEmissiveIntensity => scene.update_mesh(handle, |mesh| {
            let material = mesh
                .material
                .get_or_insert_with(|| Material::standard("default"));
            let params = material.params_mut();
            let slot = match field {
                Field::MaterialAlpha => &mut params.alpha,
                Field::MaterialRoughness => &mut params.roughness,
                Field::MaterialMetallic => &mut params.metallic,
                _ => &mut params.emissive_intensity,
            };
            *slot = combine(*slot, scalar, add);
        }),
        Field::EnvironmentIntensity => Ok(()),
    }
}
