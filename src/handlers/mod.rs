// src/handlers/mod.rs

pub mod auth;
pub mod interaction;
pub mod listing;
pub mod profile;
