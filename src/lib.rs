//! Task-scoped service identity tokens on behalf of scheduled workloads.
//!
//! An orchestrator checks that an operator's ACL credential could itself
//! write a service, mints a token scoped to exactly that service for each
//! task it schedules, and revokes those tokens when allocations stop. Every
//! call to the ACL service passes through one shared rate limiter.
//!
//! Entry point: [`facade::AclFacade`] implementing [`facade::ServiceIdentityAcls`].
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod config;
pub mod context;
pub mod error;
pub mod facade;
pub mod identity;
pub mod issuer;
pub mod limiter;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod revoker;

pub use context::CallContext;
pub use error::AclError;
pub use facade::{AclFacade, FacadeOptions, ServiceIdentityAcls};
pub use identity::{IdentityRequest, IssuedToken, RevocationTarget};
