#![doc(html_root_url = "https://docs.rs/claim-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! Runtime support for compiled DOM components:
//!
//! - [claiming](`claim`) server-rendered nodes during hydration,
//! - [reordering](`reorder`) claimed children into claim order with as few moves as possible,
//! - [hydrated insertion](`hydrate`) that leaves correctly placed nodes alone,
//! - a [scheduler](`scheduler`) that batches component updates per microtask,
//! - and [`init`](`init::init`), which hydrates (or creates) and mounts a root component.
//!
//! The DOM itself is accessed through the [`Dom`](`dom::Dom`) trait, implemented for
//! live browser nodes ([`web`], on `wasm32`) and for an [in-memory tree](`memory`).

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod claim;
pub mod dom;
mod error;
pub mod hydrate;
pub mod init;
pub mod memory;
pub mod microtask;
pub mod reorder;
pub mod scheduler;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use error::{DomError, FlushError, InitError, PatchError};
