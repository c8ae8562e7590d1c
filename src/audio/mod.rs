//! Audio probing and feature reading: duration lookup and frame-aligned access to PCM16 mono
//! audio, shared by every detection strategy.

pub mod fingerprint;
pub mod pcm;
pub mod probe;
pub mod rms;
pub mod wav;
