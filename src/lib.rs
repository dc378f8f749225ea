// src/lib.rs — Library root for analyst

pub mod cli;
pub mod core;
pub mod data;
pub mod infra;
pub mod provider;
pub mod sandbox;
