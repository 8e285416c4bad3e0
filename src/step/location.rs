// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Source location of a step definition.

use std::panic;

use derive_more::with_trait::Display;

/// Place in source code where a step definition was registered.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{path}:{line}:{column}")]
pub struct Location {
    /// Path to the file.
    pub path: &'static str,

    /// Line in the file.
    pub line: u32,

    /// Column in the line.
    pub column: u32,
}

impl Location {
    /// Creates a new [`Location`].
    #[must_use]
    pub const fn new(path: &'static str, line: u32, column: u32) -> Self {
        Self { path, line, column }
    }

    /// Returns the [`Location`] of the caller of the function this is invoked
    /// from, given it's marked with `#[track_caller]`.
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        let loc = panic::Location::caller();
        Self::new(loc.file(), loc.line(), loc.column())
    }

    /// Returns the last component of the [`Location::path`].
    #[must_use]
    pub fn filename(&self) -> &'static str {
        self.path.rsplit(['/', '\\']).next().unwrap_or(self.path)
    }
}
