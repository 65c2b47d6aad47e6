//! Glazyr: full-page screenshot capture and stitching.
//!
//! A page-side orchestrator scrolls the document and asks a background
//! coordinator for one viewport tile per stop; the coordinator checks policy
//! and tab affinity, and a compositor task stitches the tiles into a single
//! image. This library crate exposes every module to the binaries and the
//! integration tests.

pub mod app;
pub mod database;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
