//! Scene data shared by the importer and the renderer

pub mod light;
pub mod transform;
pub mod vertex;

pub use light::{Light, LightId, LightList, PointLight};
pub use transform::Transform;
pub use vertex::Vertex3D;
