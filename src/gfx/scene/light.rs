//! Directional and point lights
//!
//! There is one directional [`Light`] per renderer. Point lights live in a
//! bounded [`LightList`] that hands out monotonically increasing IDs.

use cgmath::Vector3;

pub type LightId = u32;

/// Directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub direction: Vector3<f32>,
    pub color: Vector3<f32>,
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            direction: Vector3::new(1.0, 1.0, 1.0),
            color: Vector3::new(0.8, 0.8, 0.8),
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    id: LightId,
    pub position: Vector3<f32>,
    pub color: Vector3<f32>,
    pub intensity: f32,
    /// Constant attenuation term.
    pub att_k: f32,
    /// Linear attenuation term.
    pub att_l: f32,
    /// Quadratic attenuation term.
    pub att_q: f32,
    pub active: bool,
}

impl PointLight {
    fn new(id: LightId) -> Self {
        Self {
            id,
            position: Vector3::new(0.0, 1.0, 2.0),
            color: Vector3::new(0.8, 0.8, 0.8),
            intensity: 1.0,
            att_k: 1.0,
            att_l: 0.09,
            att_q: 0.032,
            active: true,
        }
    }

    pub fn id(&self) -> LightId {
        self.id
    }

    /// Attenuation factor reached at `max_distance`.
    pub fn light_radius(&self, max_distance: f32) -> f32 {
        1.0 / (self.att_k + self.att_l * max_distance + self.att_q * max_distance * max_distance)
    }
}

/// Point lights with a fixed upper bound.
#[derive(Debug, Clone)]
pub struct LightList {
    lights: Vec<PointLight>,
    capacity: usize,
    next_id: LightId,
}

impl LightList {
    pub fn new(capacity: usize) -> Self {
        Self {
            lights: Vec::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    /// Adds a light with default parameters. Refused once the list is full.
    pub fn add(&mut self) -> Option<&mut PointLight> {
        if self.lights.len() >= self.capacity {
            log::warn!(
                "Couldn't add a new light: the maximum of {} lights is reached",
                self.capacity
            );
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.lights.push(PointLight::new(id));
        log::debug!("Added point light {}", id);
        self.lights.last_mut()
    }

    /// Removes the light with `id`. Returns false when no such light exists.
    pub fn remove(&mut self, id: LightId) -> bool {
        match self.lights.iter().position(|l| l.id == id) {
            Some(index) => {
                self.lights.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: LightId) -> Option<&PointLight> {
        self.lights.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: LightId) -> Option<&mut PointLight> {
        self.lights.iter_mut().find(|l| l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointLight> {
        self.lights.iter()
    }

    /// Lights with `active` set, in insertion order.
    pub fn active(&self) -> impl Iterator<Item = &PointLight> {
        self.lights.iter().filter(|l| l.active)
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every light. IDs keep counting up.
    pub fn clear(&mut self) {
        self.lights.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_list_is_bounded() {
        let mut list = LightList::new(3);
        for _ in 0..5 {
            list.add();
        }
        assert_eq!(list.len(), 3);
        assert!(list.add().is_none());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut list = LightList::new(4);
        let a = list.add().unwrap().id();
        let b = list.add().unwrap().id();
        assert!(list.remove(a));
        let c = list.add().unwrap().id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_remove_absent_id() {
        let mut list = LightList::new(2);
        list.add();
        assert!(!list.remove(42));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_light_radius() {
        let mut list = LightList::new(1);
        let light = list.add().unwrap();
        assert_eq!(light.light_radius(0.0), 1.0);

        light.att_l = 0.0;
        light.att_q = 1.0;
        assert!((light.light_radius(3.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_defaults() {
        let mut list = LightList::new(1);
        let light = list.add().unwrap();
        assert!(light.active);
        assert_eq!(light.att_k, 1.0);
        assert_eq!(light.att_l, 0.09);
        assert_eq!(light.att_q, 0.032);
    }
}
