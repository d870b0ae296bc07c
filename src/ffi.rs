//! FFI bindings for Synheart PSG
//!
//! This module provides C-compatible functions for calling the engine from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `psg_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::recording_json_to_report;

// Thread-local storage for the last error message
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

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Convert a result to a newly allocated C string, recording any error
fn result_to_cstr(result: Result<String, AnalysisError>) -> *mut c_char {
    let converted = result.and_then(|s| {
        CString::new(s).map_err(|e| AnalysisError::EncodingError(e.to_string()))
    });
    match converted {
        Ok(cstr) => cstr.into_raw(),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Analyze a JSON-encoded recording and return the report payload JSON.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - `config_json` may be NULL for the default configuration; otherwise it must
///   be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `psg_free_string`.
/// - Returns NULL on error; call `psg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn psg_analyze_recording(
    json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    result_to_cstr(recording_json_to_report(&json_str, config_str.as_deref()))
}

/// Default analysis configuration as JSON.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `psg_free_string`.
/// - Returns NULL on error; call `psg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn psg_default_config() -> *mut c_char {
    clear_last_error();
    let json = serde_json::to_string_pretty(&AnalysisConfig::default()).map_err(AnalysisError::from);
    result_to_cstr(json)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by PSG functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a PSG function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn psg_free_string(ptr: *mut c_char) {
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
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next PSG function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn psg_last_error() -> *const c_char {
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
pub unsafe extern "C" fn psg_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> CString {
        CString::new(
            r#"{
                "id": "ffi-night",
                "sampling_rate": 1,
                "channels": [{"name": "SpO2", "samples": [97, 96, 95, 89, 88, 96]}],
                "annotations": [
                    {"onset": 0, "duration": 30, "label": "Sleep stage W"},
                    {"onset": 30, "duration": 30, "label": "Sleep stage N2"},
                    {"onset": 40, "duration": 10, "label": "Hypopnea"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_analyze_recording() {
        let json = sample_json();
        unsafe {
            let result = psg_analyze_recording(json.as_ptr(), ptr::null());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let value: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(value["provenance"]["recording_id"], "ffi-night");
            assert_eq!(value["report"]["respiratory_events"]["total_hypopneas"], 1);
            assert!(psg_last_error().is_null());

            psg_free_string(result);
        }
    }

    #[test]
    fn test_ffi_config_override() {
        let json = sample_json();
        let config = CString::new(r#"{"ecg": {"rr_min": 5.0, "rr_max": 1.0}}"#).unwrap();
        unsafe {
            let result = psg_analyze_recording(json.as_ptr(), config.as_ptr());
            assert!(result.is_null());

            let error = CStr::from_ptr(psg_last_error()).to_str().unwrap();
            assert!(error.contains("configuration"));
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let invalid_json = CString::new("not json").unwrap();
        unsafe {
            assert!(psg_analyze_recording(ptr::null(), ptr::null()).is_null());
            assert!(!psg_last_error().is_null());

            let result = psg_analyze_recording(invalid_json.as_ptr(), ptr::null());
            assert!(result.is_null());

            let error_str = CStr::from_ptr(psg_last_error()).to_str().unwrap();
            assert!(!error_str.is_empty());
        }
    }

    #[test]
    fn test_ffi_default_config_and_version() {
        unsafe {
            let config = psg_default_config();
            assert!(!config.is_null());
            let parsed = AnalysisConfig::from_json(CStr::from_ptr(config).to_str().unwrap()).unwrap();
            let defaults = AnalysisConfig::default();
            assert_eq!(parsed.batch, defaults.batch);
            assert_eq!(parsed.labels, defaults.labels);
            assert_eq!(parsed.sleep.index_denominator, defaults.sleep.index_denominator);
            psg_free_string(config);

            let version = CStr::from_ptr(psg_version()).to_str().unwrap();
            assert_eq!(version, crate::PSG_VERSION);
        }
    }
}
