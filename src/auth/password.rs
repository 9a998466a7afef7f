// Password hashing (Argon2id, PHC string format)

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::core::errors::{GameError, GameResult};

/// Hashes and verifies user passwords.
///
/// The cost parameters only apply to new hashes. Verification reads the
/// parameters embedded in the stored PHC string, so raising the cost does not
/// invalidate existing passwords.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32) -> GameResult<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| GameError::Configuration(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> GameResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| GameError::Crypto(format!("argon2: {}", e)))
    }

    /// `Ok(false)` for a wrong password, `Err` only for an unreadable hash.
    pub fn verify(&self, password: &str, stored_hash: &str) -> GameResult<bool> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| GameError::Crypto(format!("stored hash: {}", e)))?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(GameError::Crypto(format!("argon2: {}", e))),
        }
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .finish()
    }
}
