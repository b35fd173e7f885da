//! The trimming engine: streaming encoders, granularity sequencers, and the
//! coarse-to-fine budget search. See [`Trimmer`] for the entry point.

mod encoder;
mod provider;
mod sequencer;
mod trimmer;

pub use encoder::{EncodeDirection, EncodeResult, StreamEncoder};
pub use trimmer::{ReplayTrimmer, TrimOptions, Trimmer, trim_by_length};

pub(crate) use sequencer::Sequencer;
