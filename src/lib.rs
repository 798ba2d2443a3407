//! CRM core: declarative resource schemas, staged edits committed through a
//! validating commit protocol, and per-resource/per-field access control.
//!
//! All modules are public so integration tests can drive them directly.

pub mod access;
pub mod edit;
pub mod entities;
pub mod errors;
pub mod fields;
pub mod jobs;
pub mod mutation;
pub mod resource;
pub mod session;
pub mod settings;
pub mod storage;
pub mod web;
