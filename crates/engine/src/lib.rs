//! # contextloom engine
//!
//! Token-budgeted context assembly on top of the core fragment machinery
//! and the codec boundary:
//!
//! - [`TokenizedAssembly`] — a fragment assembly paired with its tokens,
//!   kept consistent through splits and affix removal
//! - [`trim`] — streaming encoders and the coarse-to-fine budget search
//! - [`ContextEntry`] / [`StaticEntry`] — the unit of text competing for
//!   budget
//! - [`CompoundAssembly`] — the context under construction: insertion,
//!   placement, shunting, and budget accounting

pub mod compound;
pub mod entry;
pub mod error;
pub mod tokenized;
pub mod trim;

pub use compound::{CompoundAssembly, InsertionOutcome, InsertionReport, RejectionReason};
pub use entry::{
    ActivationHit, BudgetStats, ContextEntry, ContextParams, StaticEntry, TrimDirection, TrimType,
};
pub use error::{EngineError, Result};
pub use tokenized::TokenizedAssembly;
pub use trim::{ReplayTrimmer, TrimOptions, Trimmer, trim_by_length};
