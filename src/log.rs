//! Logging support, forwarding to [`tracing`] when the `tracing`
//! feature is enabled and compiling to nothing otherwise.

#[cfg(feature = "tracing")]
pub(crate) use tracing::debug;
#[cfg(feature = "tracing")]
pub(crate) use tracing::instrument;
#[cfg(feature = "tracing")]
pub(crate) use tracing::warn;

#[cfg(not(feature = "tracing"))]
mod dummy {
    /// A no-op replacement for `tracing::debug!`.
    macro_rules! debug {
        ($($args:tt)*) => {{
            if false {
                let _ = format_args!($($args)*);
            }
        }};
    }
    pub(crate) use debug;

    /// A no-op replacement for `tracing::warn!`.
    macro_rules! warning {
        ($($args:tt)*) => {{
            if false {
                let _ = format_args!($($args)*);
            }
        }};
    }
    pub(crate) use warning as warn;
}

#[cfg(not(feature = "tracing"))]
pub(crate) use dummy::debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use dummy::warn;
