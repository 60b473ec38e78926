//! Thin logging helpers over `tracing`.
//!
//! Call sites that build their message with `format!` use these instead of the
//! macros so the target stays the crate's own.

pub fn debug(message: impl AsRef<str>) {
    tracing::debug!(target: "genus", "{}", message.as_ref());
}

pub fn info(message: impl AsRef<str>) {
    tracing::info!(target: "genus", "{}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    tracing::warn!(target: "genus", "{}", message.as_ref());
}
