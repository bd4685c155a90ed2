// SPDX-License-Identifier: MIT

pub mod boot;
pub mod entries;

pub use boot::*;
pub use entries::*;
