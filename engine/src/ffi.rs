//! FFI layer for host runtimes.
//!
//! C-compatible functions for driving a [`DataSourceSession`] from a
//! JNI, Swift or Dart host. All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `ds_*` functions are allocated by Rust
//! - Caller must free them with `ds_string_free`
//! - Session pointers must be freed with `ds_session_free`
//!
//! # Error Handling
//!
//! Functions returning strings return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{DataSourceConfig, DataSourceSession, Direction};
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::new(r#"{"error":"string contained null bytes"}"#)
            .unwrap_or_default()
            .into_raw(),
    }
}

fn error_string(message: impl Into<String>) -> *mut c_char {
    to_c_string(FfiResult::<()>::err(message).to_json())
}

/// Returns None if the pointer is null or not UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

unsafe fn parse_json(ptr: *const c_char) -> Result<serde_json::Value, String> {
    let text = from_c_string(ptr).ok_or("invalid payload string")?;
    serde_json::from_str(&text).map_err(|e| format!("parse error: {}", e))
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Create a new session.
///
/// # Arguments
/// - `config_json`: JSON string of DataSourceConfig, or null for defaults
///
/// # Returns
/// Pointer to the session, or null if the configuration is invalid.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string or null
/// - Caller must free the returned pointer with `ds_session_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_new(config_json: *const c_char) -> *mut DataSourceSession {
    let config = if config_json.is_null() {
        DataSourceConfig::default()
    } else {
        let text = match from_c_string(config_json) {
            Some(s) => s,
            None => return ptr::null_mut(),
        };
        match DataSourceConfig::from_json(&text) {
            Ok(config) => config,
            Err(_) => return ptr::null_mut(),
        }
    };

    match DataSourceSession::new(config) {
        Ok(session) => Box::into_raw(Box::new(session)),
        Err(_) => ptr::null_mut(),
    }
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn ds_session_free(session: *mut DataSourceSession) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `ds_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn ds_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Finish the session, abandoning every list and outstanding fetch.
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
#[no_mangle]
pub unsafe extern "C" fn ds_session_finish(session: *mut DataSourceSession) {
    if let Some(session) = session.as_mut() {
        session.finish();
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Register a list from its full payload.
///
/// # Returns
/// JSON string: `{"ok": <handle>}` or `{"error": "message"}`
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - `source_type` and `payload_json` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `ds_string_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_register(
    session: *mut DataSourceSession,
    source_type: *const c_char,
    payload_json: *const c_char,
) -> *mut c_char {
    let session = match session.as_mut() {
        Some(s) => s,
        None => return error_string("null session pointer"),
    };
    let source_type = match from_c_string(source_type) {
        Some(s) => s,
        None => return error_string("invalid source type"),
    };
    let payload = match parse_json(payload_json) {
        Ok(p) => p,
        Err(e) => return error_string(e),
    };

    match session.register_data_source(&source_type, payload) {
        Ok(handle) => to_c_string(FfiResult::ok(handle).to_json()),
        Err(e) => error_string(e.to_string()),
    }
}

/// Apply a patch or fetch response.
///
/// # Returns
/// 1 if accepted, 0 if rejected, -1 if an argument is null or not UTF-8.
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - `source_type` and `payload_json` must be valid null-terminated C strings or null
#[no_mangle]
pub unsafe extern "C" fn ds_session_update(
    session: *mut DataSourceSession,
    source_type: *const c_char,
    payload_json: *const c_char,
) -> i32 {
    let session = match session.as_mut() {
        Some(s) => s,
        None => return -1,
    };
    let source_type = match from_c_string(source_type) {
        Some(s) => s,
        None => return -1,
    };
    let payload = match from_c_string(payload_json) {
        Some(s) => s,
        None => return -1,
    };

    // Unparseable JSON is a rejected payload, not a bad argument.
    let payload = match serde_json::from_str(&payload) {
        Ok(p) => p,
        Err(_) => serde_json::Value::String(payload),
    };
    i32::from(session.update_data_source(&source_type, payload))
}

// ============================================================================
// Consumer Access
// ============================================================================

/// Note that the consumer wants absolute `index` of an index list.
///
/// # Returns
/// JSON string: `{"ok": [<correlation token>...]}` or `{"error": "message"}`
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - `list_id` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `ds_string_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_ensure_index(
    session: *mut DataSourceSession,
    list_id: *const c_char,
    index: i64,
) -> *mut c_char {
    let session = match session.as_mut() {
        Some(s) => s,
        None => return error_string("null session pointer"),
    };
    let list_id = match from_c_string(list_id) {
        Some(s) => s,
        None => return error_string("invalid list id"),
    };

    match session.ensure_index(&list_id, index) {
        Ok(tokens) => to_c_string(FfiResult::ok(tokens).to_json()),
        Err(e) => error_string(e.to_string()),
    }
}

/// Fetch the adjacent page of a token list.
///
/// `direction` is `"forward"` or `"backward"`.
///
/// # Returns
/// JSON string: `{"ok": <correlation token>}`, `{"ok": null}` when nothing
/// was issued, or `{"error": "message"}`
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - `list_id` and `direction` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `ds_string_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_fetch_page(
    session: *mut DataSourceSession,
    list_id: *const c_char,
    direction: *const c_char,
) -> *mut c_char {
    let session = match session.as_mut() {
        Some(s) => s,
        None => return error_string("null session pointer"),
    };
    let list_id = match from_c_string(list_id) {
        Some(s) => s,
        None => return error_string("invalid list id"),
    };
    let direction = match from_c_string(direction).as_deref() {
        Some("forward") => Direction::Forward,
        Some("backward") => Direction::Backward,
        _ => return error_string("direction must be 'forward' or 'backward'"),
    };

    match session.fetch_page(&list_id, direction) {
        Ok(token) => to_c_string(FfiResult::ok(token).to_json()),
        Err(e) => error_string(e.to_string()),
    }
}

/// Loaded items of a list.
///
/// # Returns
/// JSON string: `{"ok": [...]}` or `{"error": "message"}`
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - `list_id` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `ds_string_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_items(
    session: *const DataSourceSession,
    list_id: *const c_char,
) -> *mut c_char {
    let session = match session.as_ref() {
        Some(s) => s,
        None => return error_string("null session pointer"),
    };
    let list_id = match from_c_string(list_id) {
        Some(s) => s,
        None => return error_string("invalid list id"),
    };

    match session.items(&list_id) {
        Some(items) => to_c_string(FfiResult::ok(items).to_json()),
        None => error_string(format!("list not registered: {}", list_id)),
    }
}

// ============================================================================
// Host Queues
// ============================================================================

/// Drain fetch requests waiting to be sent to producers.
///
/// # Returns
/// JSON string: `{"ok": [FetchRequest...]}` or `{"error": "message"}`
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - Caller must free the returned string with `ds_string_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_take_fetch_requests(
    session: *mut DataSourceSession,
) -> *mut c_char {
    match session.as_mut() {
        Some(session) => to_c_string(FfiResult::ok(session.take_fetch_requests()).to_json()),
        None => error_string("null session pointer"),
    }
}

/// Drain change sets for the rendering layer.
///
/// # Returns
/// JSON string: `{"ok": [{"listId": ..., "diff": ...}...]}` or `{"error": "message"}`
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - Caller must free the returned string with `ds_string_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_take_changes(session: *mut DataSourceSession) -> *mut c_char {
    match session.as_mut() {
        Some(session) => to_c_string(FfiResult::ok(session.take_changes()).to_json()),
        None => error_string("null session pointer"),
    }
}

/// Drain recorded rejections.
///
/// # Returns
/// JSON string: `{"ok": [DataSourceError...]}` or `{"error": "message"}`
///
/// # Safety
/// - `session` must be a valid pointer from `ds_session_new` or null
/// - Caller must free the returned string with `ds_string_free`
#[no_mangle]
pub unsafe extern "C" fn ds_session_take_errors(session: *mut DataSourceSession) -> *mut c_char {
    match session.as_mut() {
        Some(session) => to_c_string(FfiResult::ok(session.take_pending_errors()).to_json()),
        None => error_string("null session pointer"),
    }
}

// ============================================================================
// Utility
// ============================================================================

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn ds_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
