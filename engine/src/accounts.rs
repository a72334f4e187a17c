// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::Engine;
use anyhow::Error;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{NaiveDateTime, Utc};
use controller::{Controller, ErrorKind, NewUser, Role, Token, TokenKind, User, UserChanges};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

pub const MAX_EMAIL_LENGTH: usize = 120;
pub const DISPLAY_NAME_LENGTH: (usize, usize) = (2, 80);
const TOKEN_LENGTH: usize = 43;

/// Outcome of following a confirmation link
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Confirmed(User),
    AlreadyConfirmed(User),
}

pub fn hash_password(password: &str) -> Result<String, ErrorKind> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ErrorKind::Storage(format!("couldn't hash password: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Unreadable password hash: {}", e);
            false
        }
    }
}

pub fn generate_token(kind: TokenKind, issued_at: NaiveDateTime) -> Token {
    let value: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();

    Token {
        kind,
        value,
        issued_at,
    }
}

/// Lower-cased email with a non empty local part and domain
pub fn normalize_email(email: &str) -> Result<String, ErrorKind> {
    let email = email.trim().to_lowercase();
    let invalid = || ErrorKind::Validation(format!("{:?} is not a valid email address", email));

    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(ErrorKind::Validation(format!(
            "email can't be longer than {} characters",
            MAX_EMAIL_LENGTH
        )));
    }

    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace) =>
        {
            Ok(email.clone())
        }
        _ => Err(invalid()),
    }
}

fn check_display_name(name: &str) -> Result<String, ErrorKind> {
    let name = name.trim();
    let (min, max) = DISPLAY_NAME_LENGTH;
    let length = name.chars().count();

    if length < min || length > max {
        return Err(ErrorKind::Validation(format!(
            "display name must be between {} and {} characters",
            min, max
        )));
    }

    Ok(name.to_owned())
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    fn check_password(&self, password: &str) -> Result<(), ErrorKind> {
        let min = self.settings.min_password_length;
        if password.chars().count() < min {
            return Err(ErrorKind::Validation(format!(
                "password must be at least {} characters long",
                min
            )));
        }

        Ok(())
    }

    /// Create an unconfirmed member account. The returned token confirms the
    /// email address.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(User, Token), Error> {
        let email = normalize_email(email)?;
        let display_name = check_display_name(display_name)?;
        self.check_password(password)?;

        if self.controller.user_by_email(&email)?.is_some() {
            return Err(ErrorKind::AlreadyExists(format!("user with email {}", email)).into());
        }

        let token = generate_token(TokenKind::Confirmation, now());
        let user = self.controller.insert_user(&NewUser {
            email,
            password_hash: hash_password(password)?,
            display_name,
            role: Role::Member,
            token: Some(token.clone()),
        })?;

        log::info!("user({}) registered as {}", user.user_id, user.email);
        Ok((user, token))
    }

    pub fn confirm_email(&self, value: &str) -> Result<Confirmation, Error> {
        self.confirm_email_at(value, now())
    }

    pub fn confirm_email_at(&self, value: &str, now: NaiveDateTime) -> Result<Confirmation, Error> {
        let user = self.consume_token(value, TokenKind::Confirmation, now)?;

        if user.email_confirmed {
            let user = self.clear_token(&user)?;
            return Ok(Confirmation::AlreadyConfirmed(user));
        }

        let user = self.controller.update_user(
            user.user_id,
            &UserChanges {
                email_confirmed: Some(true),
                token: Some(None),
                ..Default::default()
            },
        )?;

        log::info!("user({}) confirmed {}", user.user_id, user.email);
        Ok(Confirmation::Confirmed(user))
    }

    pub fn request_password_reset(&self, email: &str) -> Result<Option<Token>, Error> {
        self.request_password_reset_at(email, now())
    }

    /// Issue a reset token, replacing any outstanding token. Unknown and
    /// unconfirmed addresses get `None` and no hint about which it was.
    pub fn request_password_reset_at(
        &self,
        email: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Token>, Error> {
        let email = match normalize_email(email) {
            Ok(email) => email,
            Err(_) => return Ok(None),
        };

        let user = match self.controller.user_by_email(&email)? {
            Some(user) if user.email_confirmed => user,
            _ => {
                log::debug!("password reset requested for unknown address");
                return Ok(None);
            }
        };

        let token = generate_token(TokenKind::Reset, now);
        self.controller.update_user(
            user.user_id,
            &UserChanges {
                token: Some(Some(token.clone())),
                ..Default::default()
            },
        )?;

        Ok(Some(token))
    }

    pub fn reset_password(&self, value: &str, new_password: &str) -> Result<User, Error> {
        self.reset_password_at(value, new_password, now())
    }

    pub fn reset_password_at(
        &self,
        value: &str,
        new_password: &str,
        now: NaiveDateTime,
    ) -> Result<User, Error> {
        self.check_password(new_password)?;
        let user = self.consume_token(value, TokenKind::Reset, now)?;

        let user = self.controller.update_user(
            user.user_id,
            &UserChanges {
                password_hash: Some(hash_password(new_password)?),
                token: Some(None),
                ..Default::default()
            },
        )?;

        log::info!("user({}) reset their password", user.user_id);
        Ok(user)
    }

    /// Check credentials. Wrong email and wrong password are
    /// indistinguishable to the caller.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, Error> {
        let email = email.trim().to_lowercase();
        let user = match self.controller.user_by_email(&email)? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => return Err(ErrorKind::AuthenticationFailed.into()),
        };

        if !user.email_confirmed {
            return Err(ErrorKind::EmailNotConfirmed.into());
        }

        if !user.is_active {
            log::warn!("inactive user({}) tried to log in", user.user_id);
            return Err(ErrorKind::AuthenticationFailed.into());
        }

        Ok(user)
    }

    /// Find the holder of an unexpired token of the given kind. An expired
    /// token is cleared on the way out.
    fn consume_token(
        &self,
        value: &str,
        kind: TokenKind,
        now: NaiveDateTime,
    ) -> Result<User, Error> {
        let user = self
            .controller
            .user_by_token(value)?
            .ok_or(ErrorKind::InvalidToken)?;

        let token = match &user.token {
            Some(token) if token.kind == kind => token,
            _ => return Err(ErrorKind::InvalidToken.into()),
        };

        if token.is_expired(now, self.settings.token_validity) {
            log::info!("user({}) used an expired {} token", user.user_id, kind.as_str());
            self.clear_token(&user)?;
            return Err(ErrorKind::InvalidToken.into());
        }

        Ok(user)
    }

    pub(crate) fn clear_token(&self, user: &User) -> Result<User, Error> {
        self.controller.update_user(
            user.user_id,
            &UserChanges {
                token: Some(None),
                ..Default::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::store;
    use chrono::Duration;

    fn kind_of(err: &Error) -> Option<&ErrorKind> {
        ErrorKind::of(err)
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").ok(),
            Some("alice@example.com".into())
        );
        assert!(normalize_email("alice").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("alice@").is_err());
        assert!(normalize_email("a@b@c").is_err());
        assert!(normalize_email(&format!("{}@x.io", "a".repeat(120))).is_err());
    }

    #[test]
    fn passwords_are_hashed() -> Result<(), ErrorKind> {
        let hash = hash_password("correct horse")?;

        assert_ne!(hash, "correct horse");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("correct horse", "garbage"));

        Ok(())
    }

    #[test]
    fn tokens_are_random() {
        let now = Utc::now().naive_utc();
        let a = generate_token(TokenKind::Reset, now);
        let b = generate_token(TokenKind::Reset, now);

        assert_eq!(a.value.len(), TOKEN_LENGTH);
        assert!(a.value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn registration_validates_input() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let long_name = "n".repeat(81);

        let bad = vec![
            ("not-an-email", "long enough", "Alice"),
            ("alice@example.com", "short", "Alice"),
            ("alice@example.com", "long enough", "A"),
            ("alice@example.com", "long enough", long_name.as_str()),
        ];

        for (email, password, name) in bad {
            let err = engine.register(email, password, name).unwrap_err();
            assert!(matches!(kind_of(&err), Some(ErrorKind::Validation(_))));
        }

        assert_eq!(controller.counts()?.users, 0);
        Ok(())
    }

    #[test]
    fn full_registration_flow() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);

        let (user, token) = engine.register("Alice@Example.com", "long enough", " Alice ")?;
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.display_name, "Alice");
        assert!(!user.email_confirmed);
        assert_eq!(token.kind, TokenKind::Confirmation);

        let err = engine.authenticate("alice@example.com", "long enough").unwrap_err();
        assert_eq!(kind_of(&err), Some(&ErrorKind::EmailNotConfirmed));

        match engine.confirm_email(&token.value)? {
            Confirmation::Confirmed(user) => {
                assert!(user.email_confirmed);
                assert_eq!(user.token, None);
            }
            other => panic!("unexpected {:?}", other),
        }

        // The token is single use
        let err = engine.confirm_email(&token.value).unwrap_err();
        assert_eq!(kind_of(&err), Some(&ErrorKind::InvalidToken));

        let logged_in = engine.authenticate(" ALICE@example.com", "long enough")?;
        assert_eq!(logged_in.user_id, user.user_id);

        let err = engine.authenticate("alice@example.com", "wrong password").unwrap_err();
        assert_eq!(kind_of(&err), Some(&ErrorKind::AuthenticationFailed));

        let err = engine.authenticate("bob@example.com", "long enough").unwrap_err();
        assert_eq!(kind_of(&err), Some(&ErrorKind::AuthenticationFailed));

        Ok(())
    }

    #[test]
    fn duplicate_email_is_rejected() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);

        engine.register("alice@example.com", "long enough", "Alice")?;
        let err = engine
            .register("ALICE@example.com", "long enough", "Other Alice")
            .unwrap_err();

        assert!(matches!(kind_of(&err), Some(ErrorKind::AlreadyExists(_))));
        assert_eq!(controller.counts()?.users, 1);

        Ok(())
    }

    #[test]
    fn expired_confirmation_is_cleared() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let (user, token) = engine.register("alice@example.com", "long enough", "Alice")?;

        let late = token.issued_at + Duration::minutes(31);
        let err = engine.confirm_email_at(&token.value, late).unwrap_err();

        assert_eq!(kind_of(&err), Some(&ErrorKind::InvalidToken));
        let user = controller.user(user.user_id)?;
        assert!(!user.email_confirmed);
        assert_eq!(user.token, None);

        Ok(())
    }

    #[test]
    fn token_at_the_deadline_is_still_valid() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let (_, token) = engine.register("alice@example.com", "long enough", "Alice")?;

        let deadline = token.issued_at + Duration::minutes(30);
        assert!(matches!(
            engine.confirm_email_at(&token.value, deadline)?,
            Confirmation::Confirmed(_)
        ));

        Ok(())
    }

    #[test]
    fn password_reset_flow() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let (_, confirmation) = engine.register("alice@example.com", "long enough", "Alice")?;
        engine.confirm_email(&confirmation.value)?;

        let token = engine
            .request_password_reset("alice@example.com")?
            .expect("confirmed users get a token");
        assert_eq!(token.kind, TokenKind::Reset);

        // A reset token can't confirm an email
        let err = engine.confirm_email(&token.value).unwrap_err();
        assert_eq!(kind_of(&err), Some(&ErrorKind::InvalidToken));

        let err = engine.reset_password(&token.value, "short").unwrap_err();
        assert!(matches!(kind_of(&err), Some(ErrorKind::Validation(_))));

        let user = engine.reset_password(&token.value, "brand new secret")?;
        assert_eq!(user.token, None);

        assert!(engine.authenticate("alice@example.com", "long enough").is_err());
        engine.authenticate("alice@example.com", "brand new secret")?;

        Ok(())
    }

    #[test]
    fn reset_is_silent_for_unknown_or_unconfirmed() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let (user, confirmation) = engine.register("alice@example.com", "long enough", "Alice")?;

        assert_eq!(engine.request_password_reset("nobody@example.com")?, None);
        assert_eq!(engine.request_password_reset("alice@example.com")?, None);
        assert_eq!(engine.request_password_reset("garbage")?, None);

        // The confirmation token is left alone
        assert_eq!(controller.user(user.user_id)?.token, Some(confirmation));

        Ok(())
    }

    #[test]
    fn expired_reset_token_is_rejected() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let (_, confirmation) = engine.register("alice@example.com", "long enough", "Alice")?;
        engine.confirm_email(&confirmation.value)?;

        let token = engine
            .request_password_reset("alice@example.com")?
            .expect("token");
        let late = token.issued_at + Duration::hours(2);

        let err = engine
            .reset_password_at(&token.value, "brand new secret", late)
            .unwrap_err();
        assert_eq!(kind_of(&err), Some(&ErrorKind::InvalidToken));
        engine.authenticate("alice@example.com", "long enough")?;

        Ok(())
    }

    #[test]
    fn inactive_users_cannot_log_in() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let (user, token) = engine.register("alice@example.com", "long enough", "Alice")?;
        engine.confirm_email(&token.value)?;

        controller.update_user(
            user.user_id,
            &UserChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )?;

        let err = engine.authenticate("alice@example.com", "long enough").unwrap_err();
        assert_eq!(kind_of(&err), Some(&ErrorKind::AuthenticationFailed));

        Ok(())
    }
}
