// SPDX-License-Identifier: GPL-3.0-or-later
pub mod memory;
pub mod repositories;

pub use memory::{InMemoryMediaRepository, InMemorySourceRepository};
pub use repositories::{MediaRepository, SourceRepository};
