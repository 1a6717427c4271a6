// src/lib.rs

//! Steam community tracker library
//!
//! Relays new announcement comments and new or edited feed entries to chat
//! webhooks, remembering per destination what has already been sent.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
