// YAML seed loading - roles, admin accounts and catalogue data

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::auth::password::PasswordHasher;
use crate::core::clock::Clock;
use crate::core::constants::auth::PASSWORD_MIN_CHARS;
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::services::shop::ProductInput;
use crate::services::wallet::{CouponTypeInput, EVoucherTypeInput};
use crate::store::Store;

/// Container for the seed file root structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeedYaml {
    roles: Vec<RoleEntry>,
    admins: Vec<AdminEntry>,
    coupon_types: Vec<CouponTypeInput>,
    evoucher_types: Vec<EVoucherTypeInput>,
    products: Vec<ProductInput>,
    forums: Vec<ForumEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RoleEntry {
    name: String,
    permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize)]
struct AdminEntry {
    account: String,
    email: String,
    nickname: Option<String>,
    password: SecretString,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ForumEntry {
    name: String,
    description: Option<String>,
}

/// Rows created by one `apply` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub roles: usize,
    pub admins: usize,
    pub role_assignments: usize,
    pub coupon_types: usize,
    pub evoucher_types: usize,
    pub products: usize,
    pub forums: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        *self == SeedReport::default()
    }
}

/// Seed loader - validated seed data ready to apply
pub struct SeedLoader {
    seed: SeedYaml,
}

impl SeedLoader {
    /// Load seed data from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> GameResult<Self> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(GameError::Configuration(format!(
                "Seed file not found at {:?}",
                path_ref
            )));
        }

        let yaml_content = fs::read_to_string(path_ref)
            .map_err(|e| GameError::Configuration(format!("Failed to read seed file: {}", e)))?;

        Self::from_yaml(&yaml_content)
    }

    pub fn from_yaml(yaml_content: &str) -> GameResult<Self> {
        let seed: SeedYaml = serde_yaml::from_str(yaml_content)
            .map_err(|e| GameError::Configuration(format!("Failed to parse seed YAML: {}", e)))?;
        let loader = Self { seed };
        loader.validate()?;
        Ok(loader)
    }

    /// Check entries and cross-references before touching the store
    pub fn validate(&self) -> GameResult<()> {
        let invalid = |what: &str, name: &str, e: GameError| {
            GameError::Configuration(format!("Seed {} '{}': {}", what, name, e.user_message()))
        };
        for admin in &self.seed.admins {
            for role in &admin.roles {
                if !self.seed.roles.iter().any(|r| &r.name == role) {
                    return Err(GameError::Configuration(format!(
                        "Admin '{}' references undefined role '{}'",
                        admin.account, role
                    )));
                }
            }
            if admin.password.expose_secret().chars().count() < PASSWORD_MIN_CHARS {
                return Err(GameError::Configuration(format!(
                    "Admin '{}' password is too short",
                    admin.account
                )));
            }
        }
        for entry in &self.seed.coupon_types {
            entry.validate().map_err(|e| invalid("coupon type", &entry.name, e))?;
        }
        for entry in &self.seed.evoucher_types {
            entry.validate().map_err(|e| invalid("e-voucher type", &entry.name, e))?;
        }
        for entry in &self.seed.products {
            entry.validate().map_err(|e| invalid("product", &entry.name, e))?;
        }
        Ok(())
    }

    /// Write the seed data in one transaction. Rows that already exist,
    /// matched by name or account, are left as they are.
    pub async fn apply(
        &self,
        store: &dyn Store,
        clock: &dyn Clock,
        hasher: &PasswordHasher,
    ) -> GameResult<SeedReport> {
        let now = clock.now();
        let mut report = SeedReport::default();
        let mut tx = store.begin().await?;

        for entry in &self.seed.roles {
            if tx.role_by_name(&entry.name).await?.is_none() {
                let mut permissions = entry.permissions.clone();
                permissions.sort();
                permissions.dedup();
                tx.insert_role(&Role {
                    id: 0,
                    name: entry.name.clone(),
                    permissions,
                })
                .await?;
                report.roles += 1;
            }
        }

        for entry in &self.seed.admins {
            let user = match tx.user_by_account(&entry.account).await? {
                Some(user) => user,
                None => {
                    let user = tx
                        .insert_user(&User {
                            id: 0,
                            account: entry.account.clone(),
                            email: entry.email.clone(),
                            nickname: entry.nickname.clone().unwrap_or_else(|| entry.account.clone()),
                            password_hash: hasher.hash(entry.password.expose_secret())?,
                            is_active: true,
                            email_confirmed: true,
                            shopping_permission: true,
                            message_permission: true,
                            access_failed_count: 0,
                            lockout_end: None,
                            created_at: now,
                            last_login_at: None,
                        })
                        .await?;
                    tx.insert_wallet(&Wallet {
                        user_id: user.id,
                        points: 0,
                        updated_at: now,
                    })
                    .await?;
                    report.admins += 1;
                    user
                }
            };
            for role_name in &entry.roles {
                let role = tx
                    .role_by_name(role_name)
                    .await?
                    .ok_or_else(|| GameError::Configuration(format!("Role '{}' missing", role_name)))?;
                if tx.assign_role(user.id, role.id).await? {
                    report.role_assignments += 1;
                }
            }
        }

        for entry in &self.seed.coupon_types {
            if tx.coupon_type_by_name(entry.name.trim()).await?.is_none() {
                tx.insert_coupon_type(&entry.clone().into_model(0)).await?;
                report.coupon_types += 1;
            }
        }

        for entry in &self.seed.evoucher_types {
            if tx.evoucher_type_by_name(entry.name.trim()).await?.is_none() {
                tx.insert_evoucher_type(&entry.clone().into_model(0)).await?;
                report.evoucher_types += 1;
            }
        }

        for entry in &self.seed.products {
            if tx.product_by_name(entry.name.trim()).await?.is_none() {
                tx.insert_product(&Product {
                    id: 0,
                    name: entry.name.trim().to_string(),
                    product_type: entry.product_type.trim().to_string(),
                    description: entry.description.clone(),
                    price: entry.price,
                    stock: entry.stock,
                    is_active: entry.is_active,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
                report.products += 1;
            }
        }

        for entry in &self.seed.forums {
            if tx.forum_by_name(&entry.name).await?.is_none() {
                tx.insert_forum(&Forum {
                    id: 0,
                    name: entry.name.clone(),
                    description: entry.description.clone(),
                    created_at: now,
                })
                .await?;
                report.forums += 1;
            }
        }

        tx.commit().await?;
        info!(?report, "Seed data applied");
        Ok(report)
    }
}
