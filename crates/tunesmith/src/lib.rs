//! Tunesmith - audio upload server that asks a hosted model how to visualize
//! each upload.

pub mod server;
pub mod storage;
pub mod telemetry;
pub mod web;
