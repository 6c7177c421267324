pub mod capture;
pub mod device;
pub mod endpoint;

pub use capture::{CaptureHandle, CaptureNode};
pub use device::DeviceManager;
pub use endpoint::{EndOfSpeechDetector, EndpointConfig};
