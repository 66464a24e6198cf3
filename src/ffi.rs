//! FFI bindings for MoodLens
//!
//! C-compatible entry points for hosts that own the camera and landmark model.
//! All functions take null-terminated C strings and return allocated memory that
//! must be freed by the caller using `moodlens_free_string`.

use serde::Serialize;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::analytics::summarize;
use crate::classifier::{ClassificationRule, EmotionClassifier};
use crate::features::FeatureExtractor;
use crate::history::{MoodHistory, DEFAULT_HISTORY_DAYS};
use crate::smoother::{TemporalSmoother, DEFAULT_SMOOTHING_WINDOW};
use crate::types::{EmotionLabel, FeatureVector, LandmarkFrame};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Caller frees with `moodlens_free_string`
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize `value` to an owned C string, recording failures as the last error
fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

#[derive(Serialize)]
struct FfiClassification {
    label: EmotionLabel,
    rule: ClassificationRule,
    features: FeatureVector,
}

// ============================================================================
// Stateless API
// ============================================================================

/// Classify one landmark frame given as a JSON array of `{x, y, z}` points.
///
/// Returns `{"label": ..., "rule": ..., "features": {...}}`.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `moodlens_free_string`.
/// - Returns NULL when the frame has no usable face; call `moodlens_last_error`.
#[no_mangle]
pub unsafe extern "C" fn moodlens_classify_frame(json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid frame string pointer");
            return ptr::null_mut();
        }
    };

    let frame: LandmarkFrame = match serde_json::from_str(&json_str) {
        Ok(frame) => frame,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match FeatureExtractor::extract(&frame) {
        Ok(features) => {
            let rule = EmotionClassifier::classify_with_rule(&features);
            json_to_cstr(&FfiClassification {
                label: rule.label(),
                rule,
                features,
            })
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Summarize a persisted mood history payload.
///
/// Unreadable payloads summarize as empty, matching how the store loads them.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `moodlens_free_string`.
#[no_mangle]
pub unsafe extern "C" fn moodlens_history_summary(json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid history string pointer");
            return ptr::null_mut();
        }
    };

    let history = MoodHistory::from_json(&json_str, DEFAULT_HISTORY_DAYS).unwrap_or_default();
    json_to_cstr(&summarize(&history))
}

// ============================================================================
// Smoother API
// ============================================================================

/// Opaque handle to a TemporalSmoother
pub struct MoodSmootherHandle {
    smoother: TemporalSmoother,
}

/// Create a smoother with the given window; values <= 0 use the default of 5.
///
/// # Safety
/// - Must be freed with `moodlens_smoother_free`.
#[no_mangle]
pub unsafe extern "C" fn moodlens_smoother_new(window: i32) -> *mut MoodSmootherHandle {
    clear_last_error();

    let window = if window <= 0 {
        DEFAULT_SMOOTHING_WINDOW
    } else {
        window as usize
    };

    Box::into_raw(Box::new(MoodSmootherHandle {
        smoother: TemporalSmoother::with_window(window),
    }))
}

/// Free a smoother.
///
/// # Safety
/// - `smoother` must be a pointer returned by `moodlens_smoother_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn moodlens_smoother_free(smoother: *mut MoodSmootherHandle) {
    if !smoother.is_null() {
        drop(Box::from_raw(smoother));
    }
}

/// Push a label ("happy", "sad", ...) and return the smoothed label.
///
/// # Safety
/// - `smoother` must be a valid pointer returned by `moodlens_smoother_new`.
/// - `label` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `moodlens_free_string`.
/// - Returns NULL on error; call `moodlens_last_error`.
#[no_mangle]
pub unsafe extern "C" fn moodlens_smoother_push(
    smoother: *mut MoodSmootherHandle,
    label: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if smoother.is_null() {
        set_last_error("Null smoother pointer");
        return ptr::null_mut();
    }

    let handle = &mut *smoother;

    let label = match cstr_to_string(label).map(|s| s.parse::<EmotionLabel>()) {
        Some(Ok(label)) => label,
        Some(Err(e)) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
        None => {
            set_last_error("Invalid label string pointer");
            return ptr::null_mut();
        }
    };

    string_to_cstr(handle.smoother.push(label).as_str())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by MoodLens functions.
///
/// # Safety
/// - `ptr` must be a pointer returned by a MoodLens function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn moodlens_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - The returned pointer is valid until the next MoodLens call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn moodlens_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn moodlens_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
