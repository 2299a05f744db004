// src/models/mod.rs

pub mod interaction;
pub mod listing;
pub mod two_factor;
pub mod user;
