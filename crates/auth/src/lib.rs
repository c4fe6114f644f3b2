//! `shopforge-auth` — pure authentication/authorization boundary.
//!
//! Session issuance lives upstream; this crate only models the claims an
//! already-verified token carries and the policy checks the API applies
//! before dispatching commands. Intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use roles::Role;
