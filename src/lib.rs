//! Protocol kernels and a session engine for secure multi-party computation over rings.
//!
//! Values are secret-shared among `N` parties modulo `2^K`, either additively or with XOR, as in
//! the semi2k protocol. A computation is a sequence of kernel calls: every kernel is a named,
//! typed protocol step with a symbolic cost, and runs on the own shares of one party while
//! exchanging messages with the other parties through a tagged communication context.
//!
//! ## Main Components
//!
//! * [`ring`]: ring values ([`ring::ArrayRef`]) and local ring arithmetic.
//! * [`cexpr`]: symbolic cost expressions over `K` and `N`.
//! * [`channel`]: the transport abstraction, an in-memory transport and an encrypted wrapper.
//! * [`link`]: the communication context, with tagged point-to-point messages and collectives.
//! * [`mpc`]: kernels, Beaver sources, the protocol state and the [`mpc::session::Session`]
//!   driver.
//!
//! ## Example
//!
//! ```
//! use ringmpc::{
//!     config::SessionConfig,
//!     mpc::session::simulate,
//!     ring::{ArrayRef, Field},
//! };
//!
//! let config = SessionConfig::default().with_seed([7; 32]);
//! let results = simulate(2, config, |mut session| async move {
//!     let x = ArrayRef::new(Field::Ring32, [17]);
//!     let y = ArrayRef::new(Field::Ring32, [25]);
//!     let own = (session.rank() == 0).then_some(&x);
//!     let x = session.input(0, Field::Ring32, 1, own).await?;
//!     let own = (session.rank() == 1).then_some(&y);
//!     let y = session.input(1, Field::Ring32, 1, own).await?;
//!     let z = session.call("AddAA", &[x, y]).await?;
//!     session.reveal(&z).await
//! })
//! .unwrap();
//! assert_eq!(results[0].as_slice(), &[42]);
//! assert_eq!(results[1].as_slice(), &[42]);
//! ```
//!
//! ## Security Properties
//!
//! The semi2k kernels are secure against a semi-honest adversary corrupting any `N - 1`
//! parties, provided the Beaver source is: the trusted dealer variant trusts rank 0, the OT
//! variant trusts nobody.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cexpr;
pub mod channel;
pub mod config;
pub mod crypto;
pub mod error;
pub mod link;
pub mod mpc;
pub mod ring;

mod ot;
mod utils;

pub use error::{ConfigError, Error};
