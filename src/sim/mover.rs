//! Reference collision-aware mover over a flat ground plane

use glam::Vec3;

use super::integrator::CharacterMover;

/// Moves freely in the air and stops at a horizontal ground plane.
/// Used by headless execution contexts that have no physics scene.
#[derive(Debug, Clone)]
pub struct PlaneMover {
    position: Vec3,
    ground_height: f32,
    grounded: bool,
}

impl PlaneMover {
    pub fn new(position: Vec3) -> Self {
        Self::with_ground(position, 0.0)
    }

    pub fn with_ground(position: Vec3, ground_height: f32) -> Self {
        Self {
            position,
            ground_height,
            grounded: position.y <= ground_height,
        }
    }
}

impl CharacterMover for PlaneMover {
    fn move_by(&mut self, displacement: Vec3) {
        self.position += displacement;
        self.grounded = self.position.y <= self.ground_height;
        if self.grounded {
            self.position.y = self.ground_height;
        }
    }

    fn is_grounded(&self) -> bool {
        self.grounded
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}
