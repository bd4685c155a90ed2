// SPDX-License-Identifier: MIT

pub mod bitmap;
pub mod checksum;
pub mod path;
pub mod time;
pub mod volume;
