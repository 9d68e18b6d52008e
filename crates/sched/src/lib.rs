//! gpuq-sched
//!
//! Driver for the external GPU scheduler CLI: allocation response
//! parsing, the alloc/dealloc command invocations, and the blocking
//! allocate-with-retry state machine run on the consumer path.

pub mod allocator;
pub mod client;
pub mod response;

pub use allocator::{allocate_until_decided, AllocationDecision};
pub use client::{SchedConfig, SchedError, Scheduler, SsgmCli};
pub use response::{AllocationOutcome, GrantedLease};
