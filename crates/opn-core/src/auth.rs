use opn_shared::LoginRequest;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::{NetworkError, TaskApi};
use crate::session::{self, Session, SessionStore};

const MIN_USER_NAME_CHARS: usize = 3;

#[derive(Debug, Clone)]
pub struct LoginForm {
    pub idn: String,
    pub user_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("ID number is required")]
    MissingIdn,

    #[error("ID number must be numeric")]
    NonNumericIdn,

    #[error("user name is required")]
    MissingUserName,

    #[error("user name must be at least 3 characters")]
    UserNameTooShort,

    #[error("login failed, check your credentials")]
    Rejected(#[source] NetworkError),

    #[error("failed to store session: {0}")]
    Storage(String),
}

impl LoginForm {
    pub fn new(idn: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            idn: idn.into(),
            user_name: user_name.into(),
        }
    }

    pub fn validate(&self) -> Result<LoginRequest, LoginError> {
        let idn = self.idn.trim();
        if idn.is_empty() {
            return Err(LoginError::MissingIdn);
        }
        if !idn.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(LoginError::NonNumericIdn);
        }

        let user_name = self.user_name.trim();
        if user_name.is_empty() {
            return Err(LoginError::MissingUserName);
        }
        if user_name.chars().count() < MIN_USER_NAME_CHARS {
            return Err(LoginError::UserNameTooShort);
        }

        Ok(LoginRequest {
            idn: idn.to_string(),
            user_name: user_name.to_string(),
        })
    }
}

/// Validates the form, authenticates against the API and writes the session.
/// The store is untouched unless the API accepts the login.
#[instrument(skip(api, store, form), fields(idn = %form.idn))]
pub async fn login(
    api: &dyn TaskApi,
    store: &dyn SessionStore,
    form: &LoginForm,
) -> Result<Session, LoginError> {
    let request = form.validate()?;

    let response = api.login(&request).await.map_err(|err| {
        warn!(error = %err, "login request failed");
        LoginError::Rejected(err)
    })?;

    // The API does not issue a credential yet; mint an opaque marker then.
    let marker = response
        .token
        .clone()
        .filter(|token| !token.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_id = if response.idn.trim().is_empty() {
        request.idn.clone()
    } else {
        response.idn.clone()
    };
    let display_name = if response.name.trim().is_empty() {
        request.user_name.clone()
    } else {
        response.name.clone()
    };

    let session = Session {
        display_name,
        user_id,
        session_marker: Some(marker),
    };
    session::write_session(store, &session, response.task.as_ref())
        .map_err(|err| LoginError::Storage(format!("{err:#}")))?;

    info!(user_id = %session.user_id, has_task = response.task.is_some(), "logged in");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_mirrors_the_login_form_rules() {
        assert!(matches!(
            LoginForm::new("", "Ana").validate(),
            Err(LoginError::MissingIdn)
        ));
        assert!(matches!(
            LoginForm::new("12a", "Ana").validate(),
            Err(LoginError::NonNumericIdn)
        ));
        assert!(matches!(
            LoginForm::new("123", "  ").validate(),
            Err(LoginError::MissingUserName)
        ));
        assert!(matches!(
            LoginForm::new("123", "Al").validate(),
            Err(LoginError::UserNameTooShort)
        ));

        let request = LoginForm::new(" 123 ", " Ana ")
            .validate()
            .expect("valid form");
        assert_eq!(request.idn, "123");
        assert_eq!(request.user_name, "Ana");
    }

    #[test]
    fn short_names_count_characters_not_bytes() {
        assert!(LoginForm::new("1", "Zoë").validate().is_ok());
    }
}
