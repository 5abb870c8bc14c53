// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Internal helpers.

use tracing::span::EnteredSpan;

/// Panics in debug builds, logs an error in release builds.
///
/// Used where a visual misuses its context: the tree stays consistent either
/// way, but the mistake should be loud during development.
macro_rules! debug_panic {
    ($msg:expr$(,)?) => {
        if cfg!(debug_assertions) {
            panic!($msg);
        } else {
            tracing::error!($msg);
        }
    };
    ($fmt:expr, $($arg:tt)+) => {
        if cfg!(debug_assertions) {
            panic!($fmt, $($arg)*);
        } else {
            tracing::error!($fmt, $($arg)*);
        }
    };
}

pub(crate) use debug_panic;

/// Enters the span built by `make` if `enabled`.
#[must_use = "Span will be immediately closed if dropped"]
pub(crate) fn enter_span_if(
    enabled: bool,
    make: impl FnOnce() -> tracing::Span,
) -> Option<EnteredSpan> {
    enabled.then(|| make().entered())
}
