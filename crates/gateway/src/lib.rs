//! Voco gateway — the long-lived engine process.
//!
//! Accepts one desktop client per WebSocket connection, segments the
//! microphone stream into turns, drives the reasoning graph, dispatches
//! tool calls back to the client, and streams synthesized speech.

pub mod api;
pub mod cli;
pub mod session;
pub mod state;
pub mod telemetry;
