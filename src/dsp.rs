//! Signal-level building blocks: framing, transforms, filtering and trimming.
//! Nothing in here knows about tempo or beats.

pub mod hpss;
pub mod math;
pub mod silence;
pub mod stft;
