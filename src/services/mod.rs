// SPDX-License-Identifier: MIT

//! Business logic services.

pub mod charts;
pub mod routine;

pub use routine::RoutineService;
