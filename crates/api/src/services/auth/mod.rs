//! Authentication service.
//!
//! Password registration with email verification, buyer/seller login and the
//! operator login against configured credentials.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use secrecy::ExposeSecret;
use tracing::{instrument, warn};

use merkato_core::Email;

use crate::config::AdminCredentials;
use crate::db::{RepositoryError, UserStore};
use crate::models::{NewUser, User};
use crate::services::email::{Mailer, verification_link};
use crate::services::tokens::{SessionTokens, VERIFICATION_TOKEN_BYTES, random_token};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub telebirr_phone: Option<String>,
}

/// Authentication service.
///
/// Handles registration, verification and login for marketplace users and
/// the operator.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
    mailer: &'a dyn Mailer,
    tokens: &'a SessionTokens,
    admin: &'a AdminCredentials,
    frontend_url: &'a str,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        mailer: &'a dyn Mailer,
        tokens: &'a SessionTokens,
        admin: &'a AdminCredentials,
        frontend_url: &'a str,
    ) -> Self {
        Self {
            users,
            mailer,
            tokens,
            admin,
            frontend_url,
        }
    }

    /// Register an unverified user and mail the verification link.
    ///
    /// The account is removed again if the mail cannot be sent, so an
    /// address never ends up registered but unverifiable.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BlankName`, `AuthError::InvalidEmail` or
    /// `AuthError::WeakPassword` for invalid input.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    /// Returns `AuthError::Mail` if the verification mail fails.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(AuthError::BlankName);
        }
        let email = Email::parse(&registration.email)?;
        validate_password(&registration.password)?;

        let password_hash = hash_password(&registration.password)?;
        let verification_token = random_token(VERIFICATION_TOKEN_BYTES);

        let user = self
            .users
            .insert_user(NewUser {
                name: name.to_owned(),
                email,
                password_hash,
                telebirr_phone: registration.telebirr_phone.unwrap_or_default(),
                verification_token: verification_token.clone(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        let link = verification_link(self.frontend_url, &verification_token);
        if let Err(e) = self
            .mailer
            .send_verification(&user.email, &user.name, &link)
            .await
        {
            warn!(user_id = %user.id, error = %e, "Verification mail failed, removing user");
            self.users.delete_user(user.id).await?;
            return Err(AuthError::Mail(e));
        }

        Ok(user)
    }

    /// Consume a verification token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::VerificationTokenNotFound` if no user holds the token.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        self.users
            .verify_email(token)
            .await?
            .ok_or(AuthError::VerificationTokenNotFound)
    }

    /// Login with email and password and issue a session token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::NotVerified` if the password matches an
    /// unverified account.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .find_login(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if !user.is_verified {
            return Err(AuthError::NotVerified);
        }

        let token = self.tokens.issue_user(user.id)?;
        Ok((user, token))
    }

    /// Login as the operator and issue an admin-scoped token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` on any mismatch.
    pub fn admin_login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email_ok = constant_time_eq(
            email.trim().to_lowercase().as_bytes(),
            self.admin.email.to_lowercase().as_bytes(),
        );
        let password_ok = constant_time_eq(
            password.as_bytes(),
            self.admin.password.expose_secret().as_bytes(),
        );

        if email_ok && password_ok {
            Ok(self.tokens.issue_admin(&self.admin.email)?)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use secrecy::SecretString;

    use merkato_core::{Cart, UserId};

    use super::*;
    use crate::db::MockUserStore;
    use crate::services::email::{MailError, MockMailer};
    use crate::services::tokens::TokenScope;

    const PASSWORD: &str = "correct horse battery";

    fn tokens() -> SessionTokens {
        SessionTokens::new(SecretString::from("unit-test-session-secret-value"), None)
    }

    fn admin() -> AdminCredentials {
        AdminCredentials {
            email: "ops@merkato.et".to_string(),
            password: SecretString::from("operator-password"),
        }
    }

    fn user(id: i32, verified: bool) -> User {
        User {
            id: UserId::new(id),
            name: "Hana".to_string(),
            email: Email::parse("hana@shop.et").unwrap(),
            is_seller: false,
            telebirr_phone: String::new(),
            cbe_account: String::new(),
            is_verified: verified,
            cart: Cart::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn registration(password: &str) -> Registration {
        Registration {
            name: "Hana".to_string(),
            email: "Hana@Shop.et".to_string(),
            password: password.to_string(),
            telebirr_phone: Some("0911000000".to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_sends_verification_link() {
        let mut users = MockUserStore::new();
        users
            .expect_insert_user()
            .withf(|new| new.email.as_str() == "hana@shop.et" && new.verification_token.len() == 64)
            .times(1)
            .returning(|_| Ok(user(1, false)));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send_verification()
            .withf(|_, _, link| link.starts_with("https://merkato.et/verify-email/"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let registered = service.register(registration(PASSWORD)).await.unwrap();
        assert!(!registered.is_verified);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let mut users = MockUserStore::new();
        users
            .expect_insert_user()
            .returning(|_| Err(RepositoryError::Conflict("email already exists".to_string())));
        let mut mailer = MockMailer::new();
        mailer.expect_send_verification().never();

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let err = service.register(registration(PASSWORD)).await.unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let mut users = MockUserStore::new();
        users.expect_insert_user().never();
        let mailer = MockMailer::new();

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let err = service.register(registration("short")).await.unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword(_)));
    }

    #[tokio::test]
    async fn test_register_mail_failure_removes_user() {
        let mut users = MockUserStore::new();
        users.expect_insert_user().returning(|_| Ok(user(5, false)));
        users
            .expect_delete_user()
            .withf(|id| *id == UserId::new(5))
            .times(1)
            .returning(|_| Ok(true));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send_verification()
            .returning(|_, _, _| Err(MailError::InvalidAddress("hana@shop.et".to_string())));

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let err = service.register(registration(PASSWORD)).await.unwrap_err();
        assert!(matches!(err, AuthError::Mail(_)));
    }

    #[tokio::test]
    async fn test_login_unverified_is_rejected() {
        let hash = hash_password(PASSWORD).unwrap();
        let mut users = MockUserStore::new();
        users
            .expect_find_login()
            .returning(move |_| Ok(Some((user(2, false), hash.clone()))));
        let mailer = MockMailer::new();

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let err = service.login("hana@shop.et", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::NotVerified));
        let err = service.login("hana@shop.et", "wrong password").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_issues_user_token() {
        let hash = hash_password(PASSWORD).unwrap();
        let mut users = MockUserStore::new();
        users
            .expect_find_login()
            .returning(move |_| Ok(Some((user(2, true), hash.clone()))));
        let mailer = MockMailer::new();

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let (_, token) = service.login("HANA@shop.et", PASSWORD).await.unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.scope, TokenScope::User { id: UserId::new(2) });
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let mut users = MockUserStore::new();
        users.expect_find_login().returning(|_| Ok(None));
        let mailer = MockMailer::new();

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let err = service.login("nobody@shop.et", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_verify_email_unknown_token() {
        let mut users = MockUserStore::new();
        users.expect_verify_email().returning(|_| Ok(None));
        let mailer = MockMailer::new();

        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let err = service.verify_email("nope").await.unwrap_err();
        assert!(matches!(err, AuthError::VerificationTokenNotFound));
    }

    #[test]
    fn test_admin_login() {
        let users = MockUserStore::new();
        let mailer = MockMailer::new();
        let (tokens, admin) = (tokens(), admin());
        let service = AuthService::new(&users, &mailer, &tokens, &admin, "https://merkato.et");

        let token = service
            .admin_login("ops@merkato.et", "operator-password")
            .unwrap();
        assert_eq!(
            tokens.verify(&token).unwrap().scope,
            TokenScope::Admin {
                email: "ops@merkato.et".to_string()
            }
        );

        assert!(service.admin_login("ops@merkato.et", "guess").is_err());
        assert!(service.admin_login("other@merkato.et", "operator-password").is_err());
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password(PASSWORD).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(PASSWORD, &hash).is_ok());
        assert!(verify_password("not it", &hash).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
