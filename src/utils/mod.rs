// src/utils/mod.rs

pub mod email;
pub mod hash;
pub mod html;
pub mod jwt;
pub mod otp;
pub mod token;
