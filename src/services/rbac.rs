// Role-based access control

use std::collections::BTreeSet;
use tracing::info;

use super::{bounded_text, ServiceContext};
use crate::core::errors::{GameError, GameResult};
use crate::core::models::{Permission, Role};
use crate::store::StoreTx;

/// Union of the permissions granted by a user's roles
pub async fn permissions_in(tx: &mut dyn StoreTx, user_id: i64) -> GameResult<BTreeSet<Permission>> {
    Ok(tx
        .roles_of_user(user_id)
        .await?
        .into_iter()
        .flat_map(|role| role.permissions)
        .collect())
}

/// Fails with `Forbidden` unless the user holds `permission`
pub async fn require_permission(
    tx: &mut dyn StoreTx,
    user_id: i64,
    permission: Permission,
) -> GameResult<()> {
    if permissions_in(tx, user_id).await?.contains(&permission) {
        Ok(())
    } else {
        Err(GameError::forbidden(format!("Missing permission {}", permission)))
    }
}

/// Fails with `Forbidden` unless the user holds at least one of `permissions`
pub async fn require_any(
    tx: &mut dyn StoreTx,
    user_id: i64,
    permissions: &[Permission],
) -> GameResult<()> {
    let granted = permissions_in(tx, user_id).await?;
    if permissions.iter().any(|p| granted.contains(p)) {
        Ok(())
    } else {
        Err(GameError::forbidden("Administrator access required"))
    }
}

pub struct RbacService {
    ctx: ServiceContext,
}

impl RbacService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn permissions_of(&self, user_id: i64) -> GameResult<BTreeSet<Permission>> {
        let mut tx = self.ctx.store.begin().await?;
        permissions_in(tx.as_mut(), user_id).await
    }

    pub async fn has_permission(&self, user_id: i64, permission: Permission) -> GameResult<bool> {
        Ok(self.permissions_of(user_id).await?.contains(&permission))
    }

    pub async fn has_any(&self, user_id: i64, permissions: &[Permission]) -> GameResult<bool> {
        let granted = self.permissions_of(user_id).await?;
        Ok(permissions.iter().any(|p| granted.contains(p)))
    }

    pub async fn has_all(&self, user_id: i64, permissions: &[Permission]) -> GameResult<bool> {
        let granted = self.permissions_of(user_id).await?;
        Ok(permissions.iter().all(|p| granted.contains(p)))
    }

    pub async fn list_roles(&self, admin_id: i64) -> GameResult<Vec<Role>> {
        let mut tx = self.ctx.store.begin().await?;
        require_permission(tx.as_mut(), admin_id, Permission::AdministratorPrivilegesManagement).await?;
        tx.list_roles().await
    }

    pub async fn create_role(
        &self,
        admin_id: i64,
        name: &str,
        permissions: Vec<Permission>,
    ) -> GameResult<Role> {
        let name = bounded_text("Role name", name, 1, 50)?;
        let mut tx = self.ctx.store.begin().await?;
        require_permission(tx.as_mut(), admin_id, Permission::AdministratorPrivilegesManagement).await?;
        if tx.role_by_name(name).await?.is_some() {
            return Err(GameError::conflict("Role already exists"));
        }
        let role = tx
            .insert_role(&Role {
                id: 0,
                name: name.to_string(),
                permissions: dedup(permissions),
            })
            .await?;
        tx.commit().await?;
        info!(admin_id, role = %role.name, "Role created");
        Ok(role)
    }

    pub async fn update_role(
        &self,
        admin_id: i64,
        role_id: i64,
        name: Option<&str>,
        permissions: Option<Vec<Permission>>,
    ) -> GameResult<Role> {
        let mut tx = self.ctx.store.begin().await?;
        require_permission(tx.as_mut(), admin_id, Permission::AdministratorPrivilegesManagement).await?;
        let mut role = tx
            .role_by_id(role_id)
            .await?
            .ok_or_else(|| GameError::not_found("Role"))?;
        if let Some(name) = name {
            let name = bounded_text("Role name", name, 1, 50)?;
            if let Some(other) = tx.role_by_name(name).await? {
                if other.id != role.id {
                    return Err(GameError::conflict("Role already exists"));
                }
            }
            role.name = name.to_string();
        }
        if let Some(permissions) = permissions {
            role.permissions = dedup(permissions);
        }
        tx.update_role(&role).await?;
        tx.commit().await?;
        info!(admin_id, role = %role.name, "Role updated");
        Ok(role)
    }

    /// Returns false when the user already had the role
    pub async fn assign_role(&self, admin_id: i64, user_id: i64, role_id: i64) -> GameResult<bool> {
        let mut tx = self.ctx.store.begin().await?;
        require_permission(tx.as_mut(), admin_id, Permission::AdministratorPrivilegesManagement).await?;
        tx.user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("User"))?;
        tx.role_by_id(role_id)
            .await?
            .ok_or_else(|| GameError::not_found("Role"))?;
        let changed = tx.assign_role(user_id, role_id).await?;
        tx.commit().await?;
        if changed {
            info!(admin_id, user_id, role_id, "Role assigned");
        }
        Ok(changed)
    }

    /// Returns false when the user did not have the role
    pub async fn revoke_role(&self, admin_id: i64, user_id: i64, role_id: i64) -> GameResult<bool> {
        let mut tx = self.ctx.store.begin().await?;
        require_permission(tx.as_mut(), admin_id, Permission::AdministratorPrivilegesManagement).await?;
        let changed = tx.revoke_role(user_id, role_id).await?;
        tx.commit().await?;
        if changed {
            info!(admin_id, user_id, role_id, "Role revoked");
        }
        Ok(changed)
    }

    pub async fn roles_of(&self, user_id: i64) -> GameResult<Vec<Role>> {
        let mut tx = self.ctx.store.begin().await?;
        tx.roles_of_user(user_id).await
    }
}

fn dedup(permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}
