//! SVT-DECODE: Silicon strip tracker readout decoder
//!
//! This crate decodes the SVT front-end banks of an event container into
//! per-channel sample records and checks the integrity of the frame headers
//! that accompany them, for the test-run, engineering-run and 2019 physics
//! run wire layouts.

pub mod common;
pub mod config;
pub mod container;
pub mod emulator;
pub mod header;
pub mod hits;
pub mod mapping;
pub mod pipeline;
pub mod reader;
