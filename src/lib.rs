//! Identifiability and numerical diagnostics for fitted phylogenetic
//! substitution models.
//!
//! Layers, innermost first: [`domain`] (matrix classification, trees,
//! identifiability, boundary scan, records), [`application`] (fit files and
//! services), [`infrastructure`] (I/O and wiring) and [`cli`].

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod tree_traits;
pub mod util;
