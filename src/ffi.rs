//! C ABI over the registry and backend contract
//!
//! Every function returns a status code (`VOX_OK` or a [`BackendError`]
//! code) and writes results through caller-supplied pointers. Pointers are
//! validated before anything else happens, so a null output pointer has no
//! side effects. Panics never cross the boundary; they come back as
//! `Unknown`.
//!
//! Strings returned through a backend handle stay valid until the next call
//! on the same handle that returns the same kind of string, or until the
//! handle is freed. Names returned through a context follow the same rule
//! per context.

use crate::backend::{lock_backend, SharedBackend, TextToSpeechBackend};
use crate::context::Context;
use crate::error::{error_string, BackendError, Result};
use crate::registry::BackendId;
use crate::util::{trim_silence_rms_gate, TrimParams};
use log::{debug, error};
use once_cell::sync::Lazy;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Mutex, PoisonError};

pub const VOX_OK: u32 = 0;

/// Written by `vox_registry_priority` for an unregistered id
pub const VOX_PRIORITY_UNKNOWN: i32 = i32::MIN;

/// Receives synthesized PCM: `(userdata, samples, sample_count, channels, sample_rate)`
///
/// `sample_count` counts interleaved samples, not frames. The buffer is
/// only valid during the call.
pub type VoxAudioCallback = Option<
    unsafe extern "C" fn(
        userdata: *mut c_void,
        samples: *const f32,
        sample_count: usize,
        channels: usize,
        sample_rate: usize,
    ),
>;

/// Opaque context handle
pub struct VoxContext {
    context: Context,
    name: Mutex<CString>,
}

/// Opaque backend handle
pub struct VoxBackend {
    backend: SharedBackend,
    name: CString,
    voice_name: CString,
    voice_language: CString,
    trim: Option<TrimParams>,
}

impl VoxBackend {
    fn new(backend: SharedBackend) -> Result<Self> {
        let name = to_cstring(lock_backend(&backend)?.name())?;
        Ok(Self {
            backend,
            name,
            voice_name: CString::default(),
            voice_language: CString::default(),
            trim: None,
        })
    }

    fn call<R>(&self, f: impl FnOnce(&mut dyn TextToSpeechBackend) -> Result<R>) -> Result<R> {
        let mut backend = lock_backend(&self.backend)?;
        f(&mut *backend)
    }
}

static ERROR_STRINGS: Lazy<Vec<CString>> = Lazy::new(|| {
    (0..=BackendError::COUNT)
        .map(|code| CString::new(error_string(code)).unwrap_or_default())
        .collect()
});

/// Run `f`, converting its result and any panic into a status code
fn guard(f: impl FnOnce() -> Result<()>) -> u32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => VOX_OK,
        Ok(Err(e)) => e.code(),
        Err(_) => {
            error!("Panic caught at the C boundary");
            BackendError::Unknown.code()
        }
    }
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| BackendError::InternalBackendError)
}

/// Contexts are shared between threads, so only ever borrowed immutably
unsafe fn context<'a>(ptr: *const VoxContext) -> Result<&'a VoxContext> {
    ptr.as_ref().ok_or(BackendError::InvalidParam)
}

unsafe fn handle<'a>(ptr: *mut VoxBackend) -> Result<&'a mut VoxBackend> {
    ptr.as_mut().ok_or(BackendError::InvalidParam)
}

unsafe fn out<'a, T>(ptr: *mut T) -> Result<&'a mut T> {
    ptr.as_mut().ok_or(BackendError::InvalidParam)
}

unsafe fn text<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BackendError::InvalidParam);
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| BackendError::InvalidUtf8)
}

fn into_handle(backend: Option<SharedBackend>) -> Result<*mut VoxBackend> {
    match backend {
        Some(backend) => Ok(Box::into_raw(Box::new(VoxBackend::new(backend)?))),
        None => Err(BackendError::BackendNotAvailable),
    }
}

/// Static description of a status code; never null
#[no_mangle]
pub extern "C" fn vox_error_string(code: u32) -> *const c_char {
    // the last slot holds the fallback text
    let index = code.min(BackendError::COUNT) as usize;
    ERROR_STRINGS[index].as_ptr()
}

// Context

#[no_mangle]
pub unsafe extern "C" fn vox_init(out_ctx: *mut *mut VoxContext) -> u32 {
    guard(|| {
        let out_ctx = out(out_ctx)?;
        let ctx = Box::new(VoxContext {
            context: Context::new(),
            name: Mutex::new(CString::default()),
        });
        debug!("Context created");
        *out_ctx = Box::into_raw(ctx);
        Ok(())
    })
}

/// Free a context; backend handles obtained through it stay valid
#[no_mangle]
pub unsafe extern "C" fn vox_shutdown(ctx: *mut VoxContext) -> u32 {
    guard(|| {
        if ctx.is_null() {
            return Err(BackendError::InvalidParam);
        }
        drop(Box::from_raw(ctx));
        debug!("Context released");
        Ok(())
    })
}

// Registry

#[no_mangle]
pub unsafe extern "C" fn vox_registry_count(ctx: *mut VoxContext, out_count: *mut usize) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_count = out(out_count)?;
        *out_count = ctx.context.registry().len();
        Ok(())
    })
}

/// Id at `index` in priority order
#[no_mangle]
pub unsafe extern "C" fn vox_registry_id_at(ctx: *mut VoxContext, index: usize, out_id: *mut u64) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_id = out(out_id)?;
        let ids = ctx.context.registry().list();
        *out_id = ids.get(index).ok_or(BackendError::RangeOutOfBounds)?.0;
        Ok(())
    })
}

/// Id registered under `name`, or 0
#[no_mangle]
pub unsafe extern "C" fn vox_registry_id(ctx: *mut VoxContext, name: *const c_char, out_id: *mut u64) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_id = out(out_id)?;
        let name = text(name)?;
        *out_id = ctx.context.registry().id(name).unwrap_or(BackendId::INVALID).0;
        Ok(())
    })
}

/// Display name for `id`, or null
#[no_mangle]
pub unsafe extern "C" fn vox_registry_name(ctx: *mut VoxContext, id: u64, out_name: *mut *const c_char) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_name = out(out_name)?;
        match ctx.context.registry().name(BackendId(id)) {
            Some(name) => {
                let mut slot = ctx.name.lock().unwrap_or_else(PoisonError::into_inner);
                *slot = to_cstring(&name)?;
                *out_name = slot.as_ptr();
            }
            None => *out_name = ptr::null(),
        }
        Ok(())
    })
}

/// Priority for `id`, or `VOX_PRIORITY_UNKNOWN`
#[no_mangle]
pub unsafe extern "C" fn vox_registry_priority(ctx: *mut VoxContext, id: u64, out_priority: *mut i32) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_priority = out(out_priority)?;
        *out_priority = ctx
            .context
            .registry()
            .priority(BackendId(id))
            .unwrap_or(VOX_PRIORITY_UNKNOWN);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_registry_exists(ctx: *mut VoxContext, id: u64, out_exists: *mut bool) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_exists = out(out_exists)?;
        *out_exists = ctx.context.registry().has(BackendId(id));
        Ok(())
    })
}

/// Cached instance for `id`; writes null when none is alive
#[no_mangle]
pub unsafe extern "C" fn vox_registry_get(ctx: *mut VoxContext, id: u64, out_backend: *mut *mut VoxBackend) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_backend = out(out_backend)?;
        *out_backend = match ctx.context.registry().get(BackendId(id)) {
            Some(backend) => into_handle(Some(backend))?,
            None => ptr::null_mut(),
        };
        Ok(())
    })
}

/// Fresh, uninitialized instance for `id`
#[no_mangle]
pub unsafe extern "C" fn vox_registry_create(ctx: *mut VoxContext, id: u64, out_backend: *mut *mut VoxBackend) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_backend = out(out_backend)?;
        *out_backend = ptr::null_mut();
        *out_backend = into_handle(ctx.context.registry().create(BackendId(id)))?;
        Ok(())
    })
}

/// Fresh instance of the best backend that initializes
#[no_mangle]
pub unsafe extern "C" fn vox_registry_create_best(ctx: *mut VoxContext, out_backend: *mut *mut VoxBackend) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_backend = out(out_backend)?;
        *out_backend = ptr::null_mut();
        *out_backend = into_handle(ctx.context.registry().create_best())?;
        Ok(())
    })
}

/// Cached instance for `id`, creating (but not initializing) one if needed
#[no_mangle]
pub unsafe extern "C" fn vox_registry_acquire(ctx: *mut VoxContext, id: u64, out_backend: *mut *mut VoxBackend) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_backend = out(out_backend)?;
        *out_backend = ptr::null_mut();
        *out_backend = into_handle(ctx.context.registry().acquire(BackendId(id)))?;
        Ok(())
    })
}

/// Cached instance of the best backend that is alive or initializes
#[no_mangle]
pub unsafe extern "C" fn vox_registry_acquire_best(ctx: *mut VoxContext, out_backend: *mut *mut VoxBackend) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        let out_backend = out(out_backend)?;
        *out_backend = ptr::null_mut();
        *out_backend = into_handle(ctx.context.registry().acquire_best())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_registry_clear_cache(ctx: *mut VoxContext) -> u32 {
    guard(|| {
        let ctx = context(ctx)?;
        ctx.context.registry().clear_cache();
        Ok(())
    })
}

// Backend

/// Release a backend handle; the instance lives on while other owners remain
#[no_mangle]
pub unsafe extern "C" fn vox_backend_free(backend: *mut VoxBackend) -> u32 {
    guard(|| {
        if backend.is_null() {
            return Err(BackendError::InvalidParam);
        }
        drop(Box::from_raw(backend));
        Ok(())
    })
}

/// Backend display name, valid for the life of the handle
#[no_mangle]
pub unsafe extern "C" fn vox_backend_name(backend: *mut VoxBackend, out_name: *mut *const c_char) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_name = out(out_name)?;
        *out_name = backend.name.as_ptr();
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_capabilities(backend: *mut VoxBackend, out_caps: *mut u32) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_caps = out(out_caps)?;
        *out_caps = backend.call(|b| Ok(b.capabilities()))?.bits();
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_initialize(backend: *mut VoxBackend) -> u32 {
    guard(|| handle(backend)?.call(|b| b.initialize()))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_speak(backend: *mut VoxBackend, text_ptr: *const c_char, interrupt: bool) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let text = text(text_ptr)?;
        backend.call(|b| b.speak(text, interrupt))
    })
}

/// Synthesize `text` and hand the PCM to `callback` exactly once
///
/// With trimming enabled the audio passes through the silence trimmer
/// first.
#[no_mangle]
pub unsafe extern "C" fn vox_backend_speak_to_memory(
    backend: *mut VoxBackend,
    text_ptr: *const c_char,
    callback: VoxAudioCallback,
    userdata: *mut c_void,
) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let text = text(text_ptr)?;
        let callback = callback.ok_or(BackendError::InvalidParam)?;
        let trim = backend.trim.clone();
        backend.call(|b| {
            b.speak_to_memory(text, &mut |samples, channels, sample_rate| match &trim {
                Some(params) => {
                    let trimmed = trim_silence_rms_gate(samples, channels, sample_rate, params);
                    callback(userdata, trimmed.as_ptr(), trimmed.len(), channels, sample_rate);
                }
                None => callback(userdata, samples.as_ptr(), samples.len(), channels, sample_rate),
            })
        })
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_braille(backend: *mut VoxBackend, text_ptr: *const c_char) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let text = text(text_ptr)?;
        backend.call(|b| b.braille(text))
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_output(backend: *mut VoxBackend, text_ptr: *const c_char, interrupt: bool) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let text = text(text_ptr)?;
        backend.call(|b| b.output(text, interrupt))
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_is_speaking(backend: *mut VoxBackend, out_speaking: *mut bool) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_speaking = out(out_speaking)?;
        *out_speaking = backend.call(|b| b.is_speaking())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_stop(backend: *mut VoxBackend) -> u32 {
    guard(|| handle(backend)?.call(|b| b.stop()))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_pause(backend: *mut VoxBackend) -> u32 {
    guard(|| handle(backend)?.call(|b| b.pause()))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_resume(backend: *mut VoxBackend) -> u32 {
    guard(|| handle(backend)?.call(|b| b.resume()))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_set_volume(backend: *mut VoxBackend, volume: f32) -> u32 {
    guard(|| handle(backend)?.call(|b| b.set_volume(volume)))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_volume(backend: *mut VoxBackend, out_volume: *mut f32) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_volume = out(out_volume)?;
        *out_volume = backend.call(|b| b.volume())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_set_rate(backend: *mut VoxBackend, rate: f32) -> u32 {
    guard(|| handle(backend)?.call(|b| b.set_rate(rate)))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_rate(backend: *mut VoxBackend, out_rate: *mut f32) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_rate = out(out_rate)?;
        *out_rate = backend.call(|b| b.rate())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_set_pitch(backend: *mut VoxBackend, pitch: f32) -> u32 {
    guard(|| handle(backend)?.call(|b| b.set_pitch(pitch)))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_pitch(backend: *mut VoxBackend, out_pitch: *mut f32) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_pitch = out(out_pitch)?;
        *out_pitch = backend.call(|b| b.pitch())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_refresh_voices(backend: *mut VoxBackend) -> u32 {
    guard(|| handle(backend)?.call(|b| b.refresh_voices()))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_count_voices(backend: *mut VoxBackend, out_count: *mut usize) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_count = out(out_count)?;
        *out_count = backend.call(|b| b.count_voices())?;
        Ok(())
    })
}

/// Voice name at `index`, valid until the next call of this function on the handle
#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_voice_name(
    backend: *mut VoxBackend,
    index: usize,
    out_name: *mut *const c_char,
) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_name = out(out_name)?;
        let name = backend.call(|b| b.voice_name(index))?;
        backend.voice_name = to_cstring(&name)?;
        *out_name = backend.voice_name.as_ptr();
        Ok(())
    })
}

/// Voice language at `index`, valid until the next call of this function on the handle
#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_voice_language(
    backend: *mut VoxBackend,
    index: usize,
    out_language: *mut *const c_char,
) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_language = out(out_language)?;
        let language = backend.call(|b| b.voice_language(index))?;
        backend.voice_language = to_cstring(&language)?;
        *out_language = backend.voice_language.as_ptr();
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_set_voice(backend: *mut VoxBackend, index: usize) -> u32 {
    guard(|| handle(backend)?.call(|b| b.set_voice(index)))
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_voice(backend: *mut VoxBackend, out_index: *mut usize) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_index = out(out_index)?;
        *out_index = backend.call(|b| b.voice())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_channels(backend: *mut VoxBackend, out_channels: *mut usize) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_channels = out(out_channels)?;
        *out_channels = backend.call(|b| b.channels())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_sample_rate(backend: *mut VoxBackend, out_rate: *mut usize) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_rate = out(out_rate)?;
        *out_rate = backend.call(|b| b.sample_rate())?;
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vox_backend_get_bit_depth(backend: *mut VoxBackend, out_depth: *mut usize) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        let out_depth = out(out_depth)?;
        *out_depth = backend.call(|b| b.bit_depth())?;
        Ok(())
    })
}

/// Enable or disable silence trimming of `vox_backend_speak_to_memory` output
#[no_mangle]
pub unsafe extern "C" fn vox_backend_set_trim_silence(backend: *mut VoxBackend, enabled: bool) -> u32 {
    guard(|| {
        let backend = handle(backend)?;
        backend.trim = enabled.then(TrimParams::default);
        Ok(())
    })
}
