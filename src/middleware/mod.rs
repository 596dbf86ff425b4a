// SPDX-License-Identifier: MIT

//! HTTP middleware.

pub mod security;
