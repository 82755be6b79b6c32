//! Fault boundary around plugin calls
//!
//! Plugins report problems by returning an error, but a plugin may also
//! panic. Both are turned into a plain error string here so that a single
//! misbehaving plugin never unwinds into the dispatch loop.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Extract a human-readable message from a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run a plugin callback, converting both errors and panics into `Err(detail)`
pub fn guard<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload))),
    }
}
