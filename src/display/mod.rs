pub mod surface;
pub mod viewer;

pub use surface::{render_spec, RenderLayout, RenderSpec, RenderSurface, SurfaceUpdate};
