//! Built-in passes.
//!
//! - [`PostProcessPass`]: always runs, draws its optional `Color` input
//!   full-screen onto the current target.
//! - [`PassThroughPass`]: exposes its `Input` under a new `Output` ticket
//!   through forwarding, without doing any work.

mod pass_through;
mod post_process;

pub use pass_through::PassThroughPass;
pub use post_process::PostProcessPass;
