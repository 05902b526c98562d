//! Per-tick movement and facing integration for an owned entity
//!
//! Only ever constructed on the owning execution context. Collaborators
//! (input, view direction, collision-aware mover) are injected at
//! construction and queried synchronously once per tick.

use glam::{Vec2, Vec3};
use std::sync::Arc;
use tracing::{error, info};

use crate::ws::protocol::ReplicatedState;

/// Boolean state of the four directional keys for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionalKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl DirectionalKeys {
    /// Signed (forward, right) axes, each in {-1, 0, +1}
    pub fn axes(&self) -> (f32, f32) {
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        (axis(self.forward, self.back), axis(self.right, self.left))
    }
}

/// Source of directional input, sampled once per tick
pub trait InputProvider: Send + Sync {
    fn directional_keys(&self) -> DirectionalKeys;
}

/// Source of the primary viewing direction. `None` when no view is available.
pub trait ViewDirectionProvider: Send + Sync {
    fn view_forward(&self) -> Option<Vec3>;
}

/// Collision-aware mover; resolves collisions internally
pub trait CharacterMover: Send {
    fn move_by(&mut self, displacement: Vec3);
    fn is_grounded(&self) -> bool;
    fn position(&self) -> Vec3;
}

/// Movement tuning
#[derive(Debug, Clone, Copy)]
pub struct MovementConfig {
    /// Units per second at full input
    pub max_speed: f32,
    /// Velocity change per second while input is held
    pub acceleration: f32,
    /// Velocity change per second with no input
    pub deceleration: f32,
    /// Vertical velocity pinned while grounded, keeps ground contact stable
    pub grounded_vertical_velocity: f32,
    /// Downward acceleration while airborne
    pub gravity: f32,
    /// Time constant of the facing spring
    pub facing_smooth_time: f32,
    /// Facing changes at or below this many degrees are ignored
    pub facing_deadzone_degrees: f32,
    /// Squared horizontal view length treated as degenerate
    pub view_epsilon: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            max_speed: 5.0,
            acceleration: 20.0,
            deceleration: 25.0,
            grounded_vertical_velocity: -1.0,
            gravity: -9.81,
            facing_smooth_time: 0.12,
            facing_deadzone_degrees: 0.5,
            view_epsilon: 1e-6,
        }
    }
}

/// Mutable movement state, written only by the owning driver
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementState {
    /// (x, z) velocity
    pub horizontal_velocity: Vec2,
    pub vertical_velocity: f32,
    /// Degrees, 0 = +Z, 90 = +X
    pub facing_yaw: f32,
    /// Degrees per second, carried between facing updates
    pub yaw_rate: f32,
}

/// The driver of an owned entity
pub struct ControlInputIntegrator {
    config: MovementConfig,
    state: MovementState,
    input: Arc<dyn InputProvider>,
    view: Arc<dyn ViewDirectionProvider>,
    mover: Box<dyn CharacterMover>,
    view_unavailable: bool,
}

impl ControlInputIntegrator {
    pub fn new(
        config: MovementConfig,
        initial_yaw: f32,
        input: Arc<dyn InputProvider>,
        view: Arc<dyn ViewDirectionProvider>,
        mover: Box<dyn CharacterMover>,
    ) -> Self {
        Self {
            config,
            state: MovementState {
                facing_yaw: initial_yaw,
                ..Default::default()
            },
            input,
            view,
            mover,
            view_unavailable: false,
        }
    }

    /// Advance one fixed tick: movement first, then facing
    pub fn tick(&mut self, dt: f32) -> MovementState {
        self.integrate_movement(dt);
        self.update_facing(dt);
        self.state
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.mover.position()
    }

    /// State in wire form, for publishing to replicas
    pub fn replicated_state(&self) -> ReplicatedState {
        ReplicatedState {
            position: self.mover.position().to_array(),
            horizontal_velocity: self.state.horizontal_velocity.to_array(),
            vertical_velocity: self.state.vertical_velocity,
            facing_yaw: self.state.facing_yaw,
        }
    }

    fn integrate_movement(&mut self, dt: f32) {
        let (forward_axis, right_axis) = self.input.directional_keys().axes();

        let basis = forward_from_yaw(self.state.facing_yaw) * forward_axis
            + right_from_yaw(self.state.facing_yaw) * right_axis;
        let mut direction = Vec2::new(basis.x, basis.z);
        if direction.length_squared() > 0.0 {
            direction = direction.normalize();
        }
        let desired = direction * self.config.max_speed;

        let rate = if desired.length_squared() > 0.0 {
            self.config.acceleration
        } else {
            self.config.deceleration
        };
        self.state.horizontal_velocity =
            move_towards(self.state.horizontal_velocity, desired, rate * dt);

        if self.mover.is_grounded() {
            self.state.vertical_velocity = self.config.grounded_vertical_velocity;
        } else {
            self.state.vertical_velocity += self.config.gravity * dt;
        }

        let velocity = Vec3::new(
            self.state.horizontal_velocity.x,
            self.state.vertical_velocity,
            self.state.horizontal_velocity.y,
        );
        self.mover.move_by(velocity * dt);
    }

    fn update_facing(&mut self, dt: f32) {
        let Some(view) = self.view.view_forward() else {
            if !self.view_unavailable {
                error!("View direction unavailable, facing frozen at {:.1}", self.state.facing_yaw);
                self.view_unavailable = true;
            }
            return;
        };
        if self.view_unavailable {
            info!("View direction available again");
            self.view_unavailable = false;
        }

        let flat = Vec3::new(view.x, 0.0, view.z);
        if !flat.is_finite() || flat.length_squared() <= self.config.view_epsilon {
            // Looking straight up or down, or garbage from the provider
            return;
        }
        let flat = flat.normalize();
        let target_yaw = flat.x.atan2(flat.z).to_degrees();

        let delta = delta_angle(self.state.facing_yaw, target_yaw);
        if delta.abs() <= self.config.facing_deadzone_degrees {
            return;
        }

        let smoothed = smooth_damp_angle(
            self.state.facing_yaw,
            target_yaw,
            &mut self.state.yaw_rate,
            self.config.facing_smooth_time,
            dt,
        );
        self.state.facing_yaw = wrap_degrees(smoothed);
    }
}

/// Unit forward vector on the horizontal plane for a yaw in degrees
pub fn forward_from_yaw(yaw_degrees: f32) -> Vec3 {
    let (sin, cos) = yaw_degrees.to_radians().sin_cos();
    Vec3::new(sin, 0.0, cos)
}

/// Unit right vector on the horizontal plane for a yaw in degrees
pub fn right_from_yaw(yaw_degrees: f32) -> Vec3 {
    let (sin, cos) = yaw_degrees.to_radians().sin_cos();
    Vec3::new(cos, 0.0, -sin)
}

/// Step `current` toward `target` by at most `max_delta`, never overshooting
pub fn move_towards(current: Vec2, target: Vec2, max_delta: f32) -> Vec2 {
    let to_target = target - current;
    let distance = to_target.length();
    if distance <= max_delta || distance == 0.0 {
        return target;
    }
    current + to_target / distance * max_delta
}

/// Wrap an angle in degrees into (-180, 180]
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `current` to `target`, in degrees
pub fn delta_angle(current: f32, target: f32) -> f32 {
    wrap_degrees(target - current)
}

/// Critically damped spring toward `target`; `velocity` carries across calls
pub fn smooth_damp(current: f32, target: f32, velocity: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * decay;
    let output = target + (change + temp) * decay;

    // Clamp overshoot
    if (target - current > 0.0) == (output > target) {
        *velocity = 0.0;
        return target;
    }
    output
}

/// [`smooth_damp`] along the shortest arc between two angles in degrees
pub fn smooth_damp_angle(
    current: f32,
    target: f32,
    velocity: &mut f32,
    smooth_time: f32,
    dt: f32,
) -> f32 {
    let target = current + delta_angle(current, target);
    smooth_damp(current, target, velocity, smooth_time, dt)
}
