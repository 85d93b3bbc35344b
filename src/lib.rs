//! Recovery Gate - abuse-resistant password recovery requests
//!
//! This crate decides whether a password recovery request is admitted.
//! Admission passes a sliding-window rate limiter (global cap, per-identity
//! cap, minimum interval) and an identity lookup; admitted requests get a
//! single-use, expiring reset token delivered through an external notifier.
//! State lives in a durable-but-ephemeral store; losing it only makes every
//! request look fresh.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod store;
pub mod token;
