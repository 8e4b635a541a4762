//! # Testing
//!
//! Integration test harness for assembled servers. Four pieces work together:
//!
//! - [`TestFixtures`]: typed per-test declarations with inheritance-aware
//!   lookup, the structured stand-in for test annotations.
//! - [`ContextCustomizer`] and its factories: hooks that mutate an assembly
//!   before it is built. The in-process transport customizer resolves the
//!   [`InProcessTransportFixture`] (or the ambient `inprocess.auto_configure`
//!   property) and injects `inprocess.enabled=true` when the test should run
//!   on the in-memory transport.
//! - [`ContextCache`]: shares running servers between tests whose
//!   [`ContextKey`]s are equal. Customizer equality decides interchangeability.
//! - [`AssemblyRunner`]: the declarative entry point tying the above together.
//!
//! ```rust
//! use gantry_grpc::testing::{AssemblyRunner, InProcessTransportFixture};
//!
//! # fn example() -> Result<(), gantry_grpc::AssemblyError> {
//! AssemblyRunner::new()
//!     .with_fixture(InProcessTransportFixture::enabled())
//!     .run(|server| {
//!         assert!(server.config().inprocess.enabled);
//!     })?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod customizer;
mod fixture;
mod runner;

pub use cache::{ContextCache, ContextKey, TestContext};
pub use customizer::{
    ContextCustomizer, ContextCustomizerFactory, CustomizerKey, InProcessTransportCustomizer,
    InProcessTransportCustomizerFactory, INPROCESS_AUTO_CONFIGURE_PROPERTY,
    INPROCESS_ENABLED_PROPERTY,
};
pub use fixture::{InProcessTransportFixture, TestFixture, TestFixtures};
pub use runner::AssemblyRunner;
