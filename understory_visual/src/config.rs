// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree configuration.

use kurbo::Size;

/// The DPI at which one logical unit is one physical pixel.
pub const DEFAULT_DPI: u32 = 96;

/// Configuration of a [`Tree`](crate::Tree).
#[derive(Clone, Debug, PartialEq)]
pub struct TreeConfig {
    /// DPI the tree starts with, before any theme provider reports one.
    pub dpi: u32,
    /// Size offered to the designated root in measure and arrange.
    pub viewport: Size,
    /// Which passes get per-node tracing spans.
    pub trace: PassTracing,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            viewport: Size::new(800.0, 600.0),
            trace: PassTracing::default(),
        }
    }
}

impl TreeConfig {
    /// Default configuration, with pass tracing read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            trace: PassTracing::from_env(),
            ..Self::default()
        }
    }
}

/// Per-pass switches for per-node tracing spans.
///
/// A pass may visit every node of the tree; a span per node adds noise and
/// slows tracing down a lot, so these spans are off unless asked for through
/// the `UNDERSTORY_TRACE_PASSES` environment variable. The variable holds a
/// comma separated list of pass names (`measure`, `arrange`, `render`) or
/// `all`.
///
/// Stage-level spans and events are not affected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassTracing {
    /// Per-node spans in the measure stage.
    pub measure: bool,
    /// Per-node spans in the arrange stage.
    pub arrange: bool,
    /// Per-node spans in the render stage.
    pub render: bool,
}

impl PassTracing {
    /// The environment variable read by [`PassTracing::from_env`].
    pub const ENV_VAR: &'static str = "UNDERSTORY_TRACE_PASSES";

    /// Reads `UNDERSTORY_TRACE_PASSES`.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(Self::ENV_VAR) {
            Ok(value) => Self::parse(&value),
            Err(std::env::VarError::NotPresent) => Self::unit(false),
            Err(std::env::VarError::NotUnicode(value)) => {
                tracing::error!(
                    ?value,
                    "Couldn't parse `UNDERSTORY_TRACE_PASSES` environment variable: Not valid UTF-8",
                );
                Self::unit(false)
            }
        }
    }

    /// Parses a pass list in the format of `UNDERSTORY_TRACE_PASSES`.
    ///
    /// Unknown names are reported with `tracing::warn!` and ignored.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Self::unit(true);
        }
        let mut result = Self::unit(false);
        let mut supported_passes = [
            ("measure", &mut result.measure),
            ("arrange", &mut result.arrange),
            ("render", &mut result.render),
        ];
        for input_name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if input_name.eq_ignore_ascii_case("all") {
                tracing::warn!(
                    "`UNDERSTORY_TRACE_PASSES=all` cannot be meaningfully combined with other passes"
                );
                return Self::unit(true);
            }
            if let Some((_, enabled)) = supported_passes
                .iter_mut()
                .find(|(pass_name, _)| pass_name.eq_ignore_ascii_case(input_name))
            {
                **enabled = true;
            } else {
                tracing::warn!(
                    pass = input_name,
                    "UNDERSTORY_TRACE_PASSES: Unknown pass, expected measure, arrange, or render"
                );
            }
        }
        result
    }

    /// A `PassTracing` where all the fields have the same `value`.
    #[must_use]
    pub const fn unit(value: bool) -> Self {
        Self {
            measure: value,
            arrange: value,
            render: value,
        }
    }
}
