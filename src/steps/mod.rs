//! Type-safe command definitions for each deployment step

pub mod browser;
pub mod database;
pub mod permissions;
pub mod php;
pub mod repo;
pub mod service;
