use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{RegisterOutcome, RegisterPayload, Role};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Fixed for the lifetime of a store; changing any of them invalidates every stored hash.
pub const ITERATIONS: u32 = 100_000;
pub const SALT_BYTES: usize = 16;
pub const KEY_BYTES: usize = 32;

fn derive_key_hex(password: &str, salt: &[u8], iterations: u32) -> String {
    let mut key = [0u8; KEY_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    hex::encode(key)
}

/// Derive a key for `password`. A fresh random salt is drawn when none is given.
/// Returns `(salt_hex, key_hex)`.
pub fn hash_password(password: &str, salt: Option<&[u8]>) -> (String, String) {
    let salt = match salt {
        Some(bytes) => bytes.to_vec(),
        None => rand::random::<[u8; SALT_BYTES]>().to_vec(),
    };
    let key_hex = derive_key_hex(password, &salt, ITERATIONS);
    (hex::encode(salt), key_hex)
}

pub fn verify_password(stored_salt_hex: &str, stored_hash_hex: &str, attempt: &str) -> bool {
    verify_with_iterations(stored_salt_hex, stored_hash_hex, attempt, ITERATIONS)
}

fn verify_with_iterations(stored_salt_hex: &str, stored_hash_hex: &str, attempt: &str, iterations: u32) -> bool {
    let Ok(salt) = hex::decode(stored_salt_hex.trim()) else {
        return false;
    };
    let attempt_hex = derive_key_hex(attempt, &salt, iterations);
    let stored = stored_hash_hex.trim().to_ascii_lowercase();
    attempt_hex.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Registration and authentication against the `users` table.
#[derive(Debug, Clone)]
pub struct CredentialService {
    db: Database,
}

impl CredentialService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn register(&self, username: &str, password: &str, role: Role) -> AppResult<RegisterOutcome> {
        let (salt_hex, hash_hex) = hash_password(password, None);
        let outcome = self.db.insert_user(username, &salt_hex, &hash_hex, role)?;
        match outcome {
            RegisterOutcome::Created => {
                tracing::info!(username = %username, role = role.as_str(), "user registered")
            }
            RegisterOutcome::Duplicate => {
                tracing::info!(username = %username, "registration rejected: username taken")
            }
        }
        Ok(outcome)
    }

    /// Form-level checks before [`CredentialService::register`].
    pub fn register_from_payload(&self, payload: &RegisterPayload) -> AppResult<RegisterOutcome> {
        let username = payload.username.trim();
        if username.is_empty() || payload.password.is_empty() {
            return Err(AppError::Validation("All fields required.".to_string()));
        }
        if let Some(confirmation) = payload.password_confirmation.as_deref() {
            if confirmation != payload.password {
                return Err(AppError::Validation("Passwords do not match.".to_string()));
            }
        }
        self.register(username, &payload.password, payload.role)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> AppResult<bool> {
        Ok(self.login(username, password)?.is_some())
    }

    /// Role of the user when the password verifies, `None` otherwise.
    pub fn login(&self, username: &str, password: &str) -> AppResult<Option<Role>> {
        let Some(stored) = self.db.find_credentials(username)? else {
            return Ok(None);
        };
        if verify_password(&stored.salt, &stored.pw_hash, password) {
            Ok(Some(stored.role))
        } else {
            Ok(None)
        }
    }

    pub fn set_role(&self, username: &str, role: Role) -> AppResult<()> {
        if self.db.set_user_role(username, role)? {
            tracing::info!(username = %username, role = role.as_str(), "user role changed");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("user '{}'", username)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        derive_key_hex, hash_password, verify_password, verify_with_iterations, CredentialService, KEY_BYTES,
        SALT_BYTES,
    };
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{RegisterOutcome, RegisterPayload, Role};
    use rand::distr::Alphanumeric;
    use rand::Rng;

    fn service() -> (tempfile::TempDir, CredentialService, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("data.db")).expect("db");
        (dir, CredentialService::new(db.clone()), db)
    }

    #[test]
    fn generated_salt_and_key_have_fixed_lengths() {
        let (salt, key) = hash_password("secret", None);
        assert_eq!(salt.len(), SALT_BYTES * 2);
        assert_eq!(key.len(), KEY_BYTES * 2);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_salt_gives_same_key() {
        let salt = [7u8; SALT_BYTES];
        let (salt_a, key_a) = hash_password("hunter2", Some(&salt));
        let (salt_b, key_b) = hash_password("hunter2", Some(&salt));
        assert_eq!(salt_a, salt_b);
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn different_salts_give_different_keys() {
        let (salt_hex, first) = hash_password("password", Some(b"salt"));
        assert_eq!(salt_hex, "73616c74");
        assert_ne!(first, hash_password("password", Some(b"pepper")).1);
    }

    #[test]
    fn verify_accepts_only_the_original_password() {
        let corpus = ["", "password", "Password ", "密码"];
        let salt = [3u8; SALT_BYTES];
        for password in corpus {
            let (salt_hex, hash_hex) = hash_password(password, Some(&salt));
            assert!(verify_password(&salt_hex, &hash_hex, password));
            for other in corpus.iter().filter(|other| **other != password) {
                assert!(!verify_password(&salt_hex, &hash_hex, other), "{:?} matched {:?}", other, password);
            }
        }
    }

    fn random_password(rng: &mut impl Rng) -> String {
        let len = rng.random_range(0..24);
        let mut password = (0..len).map(|_| rng.sample(Alphanumeric) as char).collect::<String>();
        if rng.random_bool(0.1) {
            password.push('é');
        }
        password
    }

    #[test]
    fn random_corpus_has_no_false_positives() {
        // Reduced work factor for the bulk corpus; the full one is covered below.
        const CORPUS_ITERATIONS: u32 = 32;
        let mut rng = rand::rng();
        for _ in 0..300 {
            let salt = rng.random::<[u8; SALT_BYTES]>();
            let salt_hex = hex::encode(salt);
            let password = random_password(&mut rng);
            let mut other = random_password(&mut rng);
            if other == password {
                other.push('x');
            }

            let hash_hex = derive_key_hex(&password, &salt, CORPUS_ITERATIONS);
            assert!(verify_with_iterations(&salt_hex, &hash_hex, &password, CORPUS_ITERATIONS));
            assert!(
                !verify_with_iterations(&salt_hex, &hash_hex, &other, CORPUS_ITERATIONS),
                "{:?} matched {:?}",
                other,
                password
            );
        }
    }

    #[test]
    fn random_passwords_at_full_work_factor() {
        let mut rng = rand::rng();
        for _ in 0..3 {
            let password = random_password(&mut rng);
            let other = format!("{}!", password);
            let (salt_hex, hash_hex) = hash_password(&password, None);
            assert!(verify_password(&salt_hex, &hash_hex, &password));
            assert!(!verify_password(&salt_hex, &hash_hex, &other));
        }
    }

    #[test]
    fn malformed_salt_never_verifies() {
        let (_, hash_hex) = hash_password("pw", None);
        assert!(!verify_password("not-hex", &hash_hex, "pw"));
    }

    #[test]
    fn register_twice_keeps_first_hash() {
        let (_dir, service, db) = service();
        assert_eq!(service.register("erin", "first", Role::User).expect("register"), RegisterOutcome::Created);
        let before = db.find_credentials("erin").expect("find").expect("exists");

        assert_eq!(
            service.register("erin", "second", Role::Admin).expect("register again"),
            RegisterOutcome::Duplicate
        );
        let after = db.find_credentials("erin").expect("find").expect("exists");
        assert_eq!(before.salt, after.salt);
        assert_eq!(before.pw_hash, after.pw_hash);
        assert!(service.authenticate("erin", "first").expect("auth"));
        assert!(!service.authenticate("erin", "second").expect("auth"));
    }

    #[test]
    fn unknown_user_and_wrong_password_look_the_same() {
        let (_dir, service, _db) = service();
        service.register("frank", "right", Role::Admin).expect("register");
        assert!(!service.authenticate("ghost", "right").expect("auth"));
        assert!(!service.authenticate("frank", "wrong").expect("auth"));
        assert_eq!(service.login("frank", "right").expect("login"), Some(Role::Admin));
    }

    #[test]
    fn payload_validation_runs_before_storage() {
        let (_dir, service, db) = service();
        let blank = RegisterPayload {
            username: "  ".to_string(),
            password: "pw".to_string(),
            password_confirmation: None,
            role: Role::User,
        };
        assert!(matches!(service.register_from_payload(&blank), Err(AppError::Validation(_))));

        let mismatch = RegisterPayload {
            username: "gina".to_string(),
            password: "pw1".to_string(),
            password_confirmation: Some("pw2".to_string()),
            role: Role::User,
        };
        assert!(matches!(service.register_from_payload(&mismatch), Err(AppError::Validation(_))));
        assert!(db.get_user("gina").expect("get").is_none());
    }

    #[test]
    fn set_role_on_missing_user_is_not_found() {
        let (_dir, service, _db) = service();
        assert!(matches!(service.set_role("nobody", Role::Admin), Err(AppError::NotFound(_))));
    }
}
