#![forbid(unsafe_code)]

//! VidTube: a video-sharing REST backend. Accounts, uploads, comments,
//! tweets, likes, subscriptions and playlists over a libsql database.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod pagination;
pub mod security;
pub mod store;
