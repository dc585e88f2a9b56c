pub mod camera;
pub mod frame;
pub mod sim;
pub mod sink;
pub mod slot;
pub mod stats;

pub use camera::{CameraHandle, CameraInfo, CameraSystem, TriggerMode};
pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use sink::{CaptureSink, FrameSink};
pub use slot::FrameSlot;
pub use stats::TimingAccumulator;
