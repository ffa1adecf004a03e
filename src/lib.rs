//! Bucketgate - In-Process Admission Control
//!
//! This crate provides two drop-in-compatible rate limiters: a token bucket
//! refilled by a background task, and a leaky bucket that replenishes lazily
//! on each admission check. Both answer an admission check with a plain
//! `bool` and never block the caller.

pub mod config;
pub mod demo;
pub mod error;
pub mod ratelimit;
