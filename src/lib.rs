//! Media download job orchestrator
//!
//! Accepts video and playlist download requests, runs each download as a
//! background job, and exposes job progress and the finished file over HTTP.
//! The actual media extraction is delegated to a pluggable fetcher (yt-dlp by
//! default).

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
