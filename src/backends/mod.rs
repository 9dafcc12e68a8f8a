//! Built-in speech backends

// Native TTS backend using the tts crate (cross-platform)
pub mod native;

// Windows SAPI through PowerShell (Windows and WSL)
pub mod sapi;

// espeak-ng executable
pub mod espeak;

use crate::registry::{BackendId, BackendRegistry};

pub const NATIVE: BackendId = BackendId::from_name(native::NAME);
pub const SAPI: BackendId = BackendId::from_name(sapi::NAME);
pub const ESPEAK: BackendId = BackendId::from_name(espeak::NAME);

/// Register every built-in backend
///
/// Construction is cheap for all of them; platform probing happens in
/// `initialize`, so registering a backend the machine cannot run is fine.
pub fn register_builtin(registry: &BackendRegistry) {
    registry.register(NATIVE, native::NAME, 98, native::NativeBackend::new);
    registry.register(SAPI, sapi::NAME, 97, sapi::SapiBackend::new);
    registry.register(ESPEAK, espeak::NAME, 90, espeak::EspeakBackend::new);
}
