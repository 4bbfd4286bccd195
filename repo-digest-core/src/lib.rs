#![doc = "repo-digest-core: core pipeline library for repo-digest."]

//! This crate contains the fetch → extract → serialize pipeline that turns a user's
//! repositories into one context document each, plus the collaborator interfaces around it
//! (repository listing, text generation).
//!
//! # Usage
//! Build a [`config::PipelineConfig`], list references through a
//! [`contract::RepositoryLister`] and hand both to [`pipeline::run_config`].

pub mod config;
pub mod contract;
pub mod document;
pub mod download;
pub mod extract;
pub mod generate;
pub mod pipeline;

pub use config::PipelineConfig;
pub use contract::{RepositoryReference, Visibility};
pub use pipeline::{PipelineReport, RepositoryDocument};
