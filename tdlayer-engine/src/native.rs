//! Binding to the system `libtdjson`.
//!
//! Only the five `td_json_client_*` entry points are used. The library owns
//! the string returned by `receive`/`execute` until the next call on the same
//! thread, so it is copied out immediately.

#![allow(unsafe_code)]

use std::ffi::{CStr, CString, c_char, c_double, c_void};
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use crate::{Engine, EngineError};

#[link(name = "tdjson")]
unsafe extern "C" {
    fn td_json_client_create() -> *mut c_void;
    fn td_json_client_send(client: *mut c_void, request: *const c_char);
    fn td_json_client_receive(client: *mut c_void, timeout: c_double) -> *const c_char;
    fn td_json_client_execute(client: *mut c_void, request: *const c_char) -> *const c_char;
    fn td_json_client_destroy(client: *mut c_void);
}

struct Handle(NonNull<c_void>);

// SAFETY: tdjson client handles may be used from any thread; the only
// single-threaded entry point (receive) is serialised separately.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

/// A `libtdjson` client instance.
pub struct NativeEngine {
    /// Read-locked for every call, write-locked only to destroy.
    handle:  RwLock<Option<Handle>>,
    /// `td_json_client_receive` must not run on two threads at once.
    receive: Mutex<()>,
}

impl NativeEngine {
    /// Create a new native instance.
    pub fn create() -> Result<Self, EngineError> {
        // SAFETY: no preconditions; a null return signals failure.
        let handle = NonNull::new(unsafe { td_json_client_create() })
            .ok_or(EngineError::CreateFailed)?;
        log::info!("[native] tdjson client created");
        Ok(Self { handle: RwLock::new(Some(Handle(handle))), receive: Mutex::new(()) })
    }

    fn handle(&self) -> RwLockReadGuard<'_, Option<Handle>> {
        self.handle.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_c(request: &str) -> Result<CString, EngineError> {
    CString::new(request).map_err(|e| EngineError::InvalidRequest(e.to_string()))
}

/// Copy a library-owned C string, if any.
///
/// SAFETY: `raw` must be null or point to a NUL-terminated string that stays
/// valid for the duration of this call.
unsafe fn copy_out(raw: *const c_char) -> Option<Vec<u8>> {
    if raw.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    Some(unsafe { CStr::from_ptr(raw) }.to_bytes().to_vec())
}

impl Engine for NativeEngine {
    fn send(&self, request: &str) -> Result<(), EngineError> {
        let request = to_c(request)?;
        let guard = self.handle();
        let handle = guard.as_ref().ok_or(EngineError::Destroyed)?;
        // SAFETY: the read guard keeps the handle alive; tdjson copies the
        // request before returning and allows concurrent sends.
        unsafe { td_json_client_send(handle.0.as_ptr(), request.as_ptr()) };
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>, EngineError> {
        let _reader = self.receive.lock().unwrap_or_else(PoisonError::into_inner);
        let guard = self.handle();
        let handle = guard.as_ref().ok_or(EngineError::Destroyed)?;
        // SAFETY: the handle is alive, receive is serialised by `_reader` and
        // the result is copied before either lock is released.
        let payload = unsafe {
            copy_out(td_json_client_receive(handle.0.as_ptr(), timeout.as_secs_f64()))
        };
        Ok(payload.filter(|p| !p.is_empty()))
    }

    fn execute(&self, request: &str) -> Result<Option<Vec<u8>>, EngineError> {
        let request = to_c(request)?;
        let guard = self.handle();
        let handle = guard.as_ref().ok_or(EngineError::Destroyed)?;
        // SAFETY: as for `send`; the result is copied immediately.
        Ok(unsafe { copy_out(td_json_client_execute(handle.0.as_ptr(), request.as_ptr())) })
    }

    fn destroy(&self) {
        // Blocks until in-flight calls, including a pending receive, return.
        let taken = self.handle.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = taken {
            // SAFETY: the handle has been taken out under the write lock, so
            // no other call can reach it any more.
            unsafe { td_json_client_destroy(handle.0.as_ptr()) };
            log::info!("[native] tdjson client destroyed");
        }
    }

    fn name(&self) -> &str { "tdjson" }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}
