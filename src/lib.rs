// Grammar workbench library - the re-parse pipeline and its supporting layers

pub mod app;
pub mod config;
pub mod model;
pub mod primitives;
pub mod services;
