//! Core infrastructure shared by every subsystem

pub mod time;
