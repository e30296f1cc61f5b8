use std::fmt;

use serde::Deserialize;

/// Per-worker identity issued by the control plane.
///
/// Owned by exactly one worker at a time. Not `Clone`: revoking consumes it,
/// so a credential can be revoked at most once.
#[derive(Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub username: String,
    pub email: String,
    pub password: String,
    pub delete_token: String,
}

impl Credential {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        delete_token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            delete_token: delete_token.into(),
        }
    }

    /// Expands `{username}`, `{email}` and `{password}` in an argument template.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{username}", &self.username)
            .replace("{email}", &self.email)
            .replace("{password}", &self.password)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("delete_token", &"<redacted>")
            .finish()
    }
}
