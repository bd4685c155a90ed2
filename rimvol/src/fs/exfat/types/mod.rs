// SPDX-License-Identifier: MIT

pub mod boot;
pub mod entries;
pub mod root;

pub use boot::*;
pub use entries::*;
pub use root::*;
