// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Structured logging of runs via [`tracing`].
//!
//! Every scenario runs inside a `scenario` span, every step inside a `step`
//! span and every worker inside a `worker` span, so installing any
//! [`tracing`] subscriber makes a run observable. The helpers below install a
//! compact stderr one, controlled by the `RUST_LOG` environment variable.

use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt as _,
    util::SubscriberInitExt as _, EnvFilter,
};

/// Default filter directive, used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "scenario_runner=info,warn";

/// Installs a global stderr subscriber, filtered by `RUST_LOG` or
/// [`DEFAULT_DIRECTIVE`].
///
/// Returns `false` if a global subscriber has been installed already.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    install(filter)
}

/// Installs a global stderr subscriber passing everything up to `level`.
///
/// Returns `false` if a global subscriber has been installed already.
pub fn init_with(level: LevelFilter) -> bool {
    install(EnvFilter::default().add_directive(level.into()))
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_once() {
        _ = init_with(LevelFilter::DEBUG);

        assert!(!init(), "second subscriber must be rejected");
    }
}
