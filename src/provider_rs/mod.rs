//! Minimal client for a Spotify-style playlist Web API.
//!
//! Docs:
//! https://developer.spotify.com/documentation/web-api/reference/get-playlists-tracks

pub mod client;
pub mod types;

pub use client::WebApiClient;
