//! Error Types
//!
//! This module defines the error types used throughout the pipeline.
//!
//! # Overview
//!
//! [`GloamError`] covers the failures that can escape a pipeline call:
//! - GPU object validation failures (incomplete targets, missing or unlinkable programs)
//! - Stale handles passed to the graphics context
//! - Rejected runtime configuration
//! - Surface and readback failures of the wgpu backend
//!
//! Usage problems that must not abort a frame (feedback-loop cubemap requests,
//! unknown shader parameters, invalid luminance readings) are *not* errors: they
//! are logged and the affected step degrades to a no-op.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gloam::errors::{GloamError, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum GloamError {
    // ========================================================================
    // GPU Object Validation
    // ========================================================================
    /// A render target descriptor cannot produce a complete framebuffer.
    #[error("Incomplete render target '{label}': {reason}")]
    IncompleteTarget {
        /// Debug label of the target
        label: String,
        /// What made the target incomplete
        reason: String,
    },

    /// No program with the given name has been registered with the context.
    #[error("Shader program not found: {0}")]
    ProgramNotFound(String),

    /// A registered program failed to link or validate against its layout.
    #[error("Shader program '{name}' failed to link: {reason}")]
    ProgramLink {
        /// Program name
        name: String,
        /// Backend diagnostic
        reason: String,
    },

    // ========================================================================
    // Handle Errors
    // ========================================================================
    /// A target id that is not (or no longer) owned by the context.
    #[error("Unknown render target: {0}")]
    UnknownTarget(String),

    /// A cubemap id that is not (or no longer) owned by the context.
    #[error("Unknown cubemap: {0}")]
    UnknownCubemap(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A settings group failed validation in [`Renderer::configure`](crate::renderer::Renderer::configure).
    #[error("Invalid {group} setting: {reason}")]
    InvalidSetting {
        /// Settings group name (e.g. "hdr", "glow")
        group: &'static str,
        /// What was wrong
        reason: String,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The presentation surface could not provide a frame.
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// A GPU → CPU readback failed.
    #[error("Readback failed: {0}")]
    Readback(String),

    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),
}

impl GloamError {
    /// Returns `true` for GPU object validation failures.
    ///
    /// These indicate a build-time or platform configuration defect rather than
    /// a runtime data problem; callers assert on them in debug builds.
    #[must_use]
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::IncompleteTarget { .. } | Self::ProgramNotFound(_) | Self::ProgramLink { .. }
        )
    }
}

/// Logs a GPU validation failure and trips a debug assertion.
///
/// Release builds return the error to the caller unchanged.
pub(crate) fn validation_failure(err: GloamError) -> GloamError {
    log::error!("{err}");
    debug_assert!(false, "GPU object validation failed: {err}");
    err
}

/// Alias for `Result<T, GloamError>`.
pub type Result<T> = std::result::Result<T, GloamError>;
