//! Core text-annotation model for scanlation tools.
//!
//! Scanlation editors run OCR over manga pages and get back a pile of
//! per-line detections. This crate turns those detections into
//! something a human can edit: merged, addressable text rows
//! ([`merge`], [`rows`]), parallel named text variants with
//! copy-on-first-edit semantics ([`profiles`]), and a fault-tolerant
//! tagged format for round-tripping rows through an external
//! translation step ([`exchange`]).
//!
//! The GUI, the OCR model, and the image pipeline are all external
//! collaborators; nothing here blocks, performs I/O (outside of
//! [`project`]), or keeps state between calls except the two stores.

#![warn(missing_docs)]

pub use anyhow::{Error, Result};

pub mod exchange;
pub mod fragment;
pub mod geom;
pub mod merge;
pub mod profiles;
pub mod project;
pub mod rows;
