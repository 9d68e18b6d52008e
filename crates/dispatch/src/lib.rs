//! gpuq-dispatch
//!
//! The dispatch supervisor: for every granted GPU lease it spawns an
//! independent job task (stage inputs, trigger remote execution, poll
//! for the result artifact) and guarantees the lease is released exactly
//! once however the task ends. Live leases are tracked in a process-wide
//! registry so an interrupt can release all of them before exit.

pub mod error;
pub mod invoker;
pub mod poller;
pub mod registry;
pub mod supervisor;
pub mod task;

pub use error::DispatchError;
pub use invoker::{CliInvoker, FunctionInvoker, InvokeError, UploadInvoker};
pub use registry::{Allocation, AllocationRegistry};
pub use supervisor::DispatchSupervisor;
pub use task::JobParams;
