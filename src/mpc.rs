//! The protocol kernel layer and the session engine that drives it.
//!
//! * [`kernel`]: the kernel traits, the evaluation context and the registry with its cost model.
//! * [`beaver`] and [`state`]: correlated randomness and the protocol-scoped session state.
//! * [`semi2k`]: the kernels of the semi2k protocol.
//! * [`plain`]: local evaluation of public operations.
//! * [`session`]: the driver running programs of kernel calls.

pub mod beaver;
pub mod kernel;
pub mod plain;
pub mod semi2k;
pub mod session;
pub mod state;
