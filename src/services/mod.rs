// Glazyr services
// The capture pipeline (orchestrator, coordinator, compositor), policy, image
// codecs, frame sources, settings and the optional vision client.

pub mod capture_coordinator;
pub mod capture_orchestrator;
pub mod frame_source;
pub mod image_codec;
pub mod policy_gate;
pub mod settings_engine;
pub mod stitch_worker;
pub mod stitcher;
#[cfg(feature = "vision")]
pub mod vision_client;
