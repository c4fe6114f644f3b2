//! API-side authorization guard for commands.
//!
//! Enforced at the command boundary (before dispatch), keeping domain
//! aggregates and infra auth-agnostic.

use shopforge_auth::{AuthzError, CommandAuthorization, Permission, Principal, Role, authorize};

use crate::context::PrincipalContext;

/// Permission requirements of one HTTP operation.
pub struct CmdAuth {
    required: Vec<Permission>,
}

impl CmdAuth {
    pub fn requiring(permission: &'static str) -> Self {
        Self {
            required: vec![Permission::new(permission)],
        }
    }
}

impl CommandAuthorization for CmdAuth {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Check authorization for a command in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = Principal {
        user_id: principal.user_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Shorthand for the common single-permission case.
pub fn require(principal: &PrincipalContext, permission: &'static str) -> Result<(), AuthzError> {
    authorize_command(principal, &CmdAuth::requiring(permission))
}

/// Role→permission mapping.
///
/// "admin" (operations staff) holds everything; "customer" holds the
/// self-service surface only.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.is_admin()) {
        return vec![Permission::new("*")];
    }

    if roles.iter().any(|r| r.as_str() == "customer") {
        return vec![
            Permission::new("orders.place"),
            Permission::new("orders.read_own"),
            Permission::new("returns.open"),
            Permission::new("returns.read_own"),
        ];
    }

    Vec::new()
}
