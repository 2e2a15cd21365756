//! C ABI binding surface for `amio-core`, plus the JACK [`Driver`] implementation.
//!
//! Grounded on `original_source/amio/jack_interface.h` and the `create_jack_interface`/
//! `iface_*`/`AudioClip_*`/`begin_defining_playspec`/`set_entry_in_playspec` entry points
//! enumerated in spec.md §6. Every function here does the minimum possible on the Rust side
//! of the boundary: decode raw arguments into safe types, forward to `amio-core`, encode the
//! result back into something `ctypes` (or any C caller) can read.
//!
//! The process-wide [`Engine`] lives behind a single [`Mutex`], locked only by control-thread
//! entry points and by the JACK process callback's outer dispatch. This is a deliberate
//! simplification over a fully lock-free multi-interface registry (see `DESIGN.md`): the
//! realtime-safety guarantees the core specification cares about - no allocation, no
//! unbounded-latency calls - are fully upheld inside `Interface::process_realtime` itself;
//! the mutex here only guards the *lookup* of which interface's turn it is, which is
//! uncontended in the common case of one interface per process.

use amio_core::driver::Driver;
use amio_core::ids::{ClipId, InterfaceId, PlayspecId};
use amio_core::playspec;
use amio_core::Engine;
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::Mutex;
use tracing::{error, info, warn};

mod jack_driver;
pub use jack_driver::JackDriver;

static ENGINE: OnceCell<Mutex<Engine<JackDriver>>> = OnceCell::new();

pub(crate) fn engine() -> &'static Mutex<Engine<JackDriver>> {
    ENGINE.get_or_init(|| {
        init_logging();
        Mutex::new(Engine::new())
    })
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

thread_local! {
    /// One slot per host thread, filled by `iface_begin_reading_input_chunk` and drained by
    /// the `InputChunk_get_*` accessors, matching the original's single-chunk staging area.
    static CURRENT_INPUT_CHUNK: RefCell<Option<amio_core::message::InputChunk>> = const { RefCell::new(None) };
}

fn interface_id_from_raw(id: i32) -> Option<InterfaceId> {
    InterfaceId::from_i32(id)
}

// ---- Interface lifecycle ----

#[no_mangle]
pub extern "C" fn create_jack_interface(client_name: *const c_char) -> i32 {
    let name = unsafe {
        if client_name.is_null() {
            return -1;
        }
        match CStr::from_ptr(client_name).to_str() {
            Ok(s) => s.to_owned(),
            Err(_) => return -1,
        }
    };
    let driver = match JackDriver::new(&name) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to initialize JACK driver");
            return -1;
        }
    };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    let Some(id) = engine.create_interface(driver) else {
        return -1;
    };
    // The driver's JACK client isn't activated (no process callback registered) until the
    // interface has an id to drive, since the callback dispatches by interface id.
    if let Err(e) = engine.interface_mut(id).unwrap().driver_mut().activate(id) {
        error!(error = %e, interface_id = id.as_i32(), "failed to activate JACK client");
        engine.close_interface(id);
        return -1;
    }
    info!(interface_id = id.as_i32(), client_name = %name, "interface created");
    id.as_i32()
}

#[no_mangle]
pub extern "C" fn iface_close(interface_id: i32) {
    let Some(id) = interface_id_from_raw(interface_id) else { return };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    engine.close_interface(id);
}

#[no_mangle]
pub extern "C" fn iface_process_messages_on_python_queue(interface_id: i32) -> i32 {
    let Some(id) = interface_id_from_raw(interface_id) else { return 0 };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    match engine.process_control_queue(id) {
        amio_core::interface::DrainOutcome::PlayspecApplied => 1,
        amio_core::interface::DrainOutcome::Idle => 0,
    }
}

#[no_mangle]
pub extern "C" fn iface_set_playspec(interface_id: i32) -> i32 {
    let Some(id) = interface_id_from_raw(interface_id) else { return -1 };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    // Check for an already-pending swap *before* publishing: §5 requires "-1 without
    // mutating state" on rejection, and publishing first would both consume the build
    // cursor and insert an orphaned playspec no interface would ever reference or sweep.
    match engine.interface(id) {
        Some(iface) if iface.shadow().pending_playspec.is_none() => {}
        Some(_) => {
            warn!(interface_id, "set_playspec refused, a swap is already pending");
            return -1;
        }
        None => return -1,
    }
    let Some(built) = playspec::publish(&mut engine.playspecs) else {
        return -1;
    };
    match engine.interface_mut(id) {
        Some(iface) if iface.set_playspec(built) => built.as_i32(),
        _ => -1,
    }
}

#[no_mangle]
pub extern "C" fn iface_get_frame_rate(interface_id: i32) -> i32 {
    let Some(id) = interface_id_from_raw(interface_id) else { return 0 };
    let engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    engine
        .interface(id)
        .map(|iface| iface.shadow().last_reported_frame_rate as i32)
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn iface_get_position(interface_id: i32) -> i64 {
    let Some(id) = interface_id_from_raw(interface_id) else { return 0 };
    let engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    engine.interface(id).map(|iface| iface.shadow().last_reported_position).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn iface_set_position(interface_id: i32, position: i64) {
    let Some(id) = interface_id_from_raw(interface_id) else { return };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(iface) = engine.interface_mut(id) {
        iface.set_position(position);
    }
}

#[no_mangle]
pub extern "C" fn iface_get_transport_rolling(interface_id: i32) -> i32 {
    let Some(id) = interface_id_from_raw(interface_id) else { return 0 };
    let engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    engine
        .interface(id)
        .map(|iface| iface.shadow().last_reported_transport_rolling as i32)
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn iface_set_transport_rolling(interface_id: i32, rolling: i32) {
    let Some(id) = interface_id_from_raw(interface_id) else { return };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(iface) = engine.interface_mut(id) {
        iface.set_transport_rolling(rolling != 0);
    }
}

#[no_mangle]
pub extern "C" fn iface_get_current_playspec_id(interface_id: i32) -> i32 {
    let Some(id) = interface_id_from_raw(interface_id) else { return -1 };
    let engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    engine
        .interface(id)
        .and_then(|iface| iface.shadow().current_playspec)
        .map(PlayspecId::as_i32)
        .unwrap_or(-1)
}

/// # Safety
/// `out_buf` must point to at least `n` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn iface_get_logs(interface_id: i32, out_buf: *mut u8, n: i32) {
    let Some(id) = interface_id_from_raw(interface_id) else { return };
    if out_buf.is_null() || n <= 0 {
        return;
    }
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    let Some(iface) = engine.interface_mut(id) else { return };
    let out = std::slice::from_raw_parts_mut(out_buf, n as usize);
    amio_core::message::read_logs(&mut iface.messages_mut().log_rx, out);
}

#[no_mangle]
pub extern "C" fn iface_begin_reading_input_chunk(interface_id: i32) -> bool {
    let Some(id) = interface_id_from_raw(interface_id) else { return false };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    let Some(iface) = engine.interface_mut(id) else { return false };
    let chunk = iface.messages_mut().input_chunk_rx.try_pop();
    let got = chunk.is_some();
    CURRENT_INPUT_CHUNK.with(|slot| *slot.borrow_mut() = chunk);
    got
}

#[no_mangle]
pub extern "C" fn InputChunk_get_starting_frame() -> i64 {
    CURRENT_INPUT_CHUNK.with(|slot| slot.borrow().as_ref().map(|c| c.starting_frame).unwrap_or(0))
}

#[no_mangle]
pub extern "C" fn InputChunk_get_playspec_id() -> i32 {
    CURRENT_INPUT_CHUNK.with(|slot| {
        slot.borrow().as_ref().map(|c| c.playspec_id.as_i32()).unwrap_or(-1)
    })
}

#[no_mangle]
pub extern "C" fn InputChunk_get_was_transport_rolling() -> i32 {
    CURRENT_INPUT_CHUNK
        .with(|slot| slot.borrow().as_ref().map(|c| c.was_transport_rolling as i32).unwrap_or(0))
}

/// # Safety
/// `out` must point to at least `amio_core::INPUT_CLIP_LENGTH` writable `f32`s.
#[no_mangle]
pub unsafe extern "C" fn InputChunk_get_samples(out: *mut f32) {
    if out.is_null() {
        return;
    }
    CURRENT_INPUT_CHUNK.with(|slot| {
        if let Some(chunk) = slot.borrow().as_ref() {
            let dst = std::slice::from_raw_parts_mut(out, amio_core::INPUT_CLIP_LENGTH);
            dst.copy_from_slice(&chunk.samples);
        }
    });
}

// ---- Clips ----

/// # Safety
/// `bytes` must point to at least `n` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn AudioClip_init(bytes: *const u8, n: i32, channels: i32, framerate: i32) -> i32 {
    if bytes.is_null() || n <= 0 || channels <= 0 {
        return -1;
    }
    let slice = std::slice::from_raw_parts(bytes, n as usize);
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    engine
        .clips
        .create(slice, channels as u8, framerate as u32)
        .map(ClipId::as_i32)
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn AudioClip_del(_interface_id: i32, clip_id: i32) {
    let Some(id) = ClipId::from_i32(clip_id) else { return };
    let mut engine = engine().lock().unwrap_or_else(|e| e.into_inner());
    engine.clips.unref_from_control(id);
}

// ---- Playspec authoring ----

#[no_mangle]
pub extern "C" fn begin_defining_playspec(size: i32, insert_at: i64, start_from: i64) -> bool {
    if size < 0 {
        return false;
    }
    playspec::begin(size as usize, insert_at, start_from)
}

#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn set_entry_in_playspec(
    n: i32,
    clip_id: i32,
    clip_frame_a: i32,
    clip_frame_b: i32,
    play_at_frame: i64,
    repeat_interval: i32,
    gain_l: f32,
    gain_r: f32,
) {
    if n < 0 || clip_frame_a < 0 || clip_frame_b < 0 || repeat_interval < 0 {
        return;
    }
    let Some(clip_id) = ClipId::from_i32(clip_id) else { return };
    playspec::set_entry(
        n as usize,
        clip_id,
        clip_frame_a as u32,
        clip_frame_b as u32,
        play_at_frame,
        repeat_interval as u32,
        gain_l,
        gain_r,
    );
}
