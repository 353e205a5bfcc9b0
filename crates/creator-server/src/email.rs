//! Signed auth-email hook
//!
//! The auth backend posts one request per outgoing email. The body is signed
//! with the shared hook secret in `x-creator-signature`; unsigned or stale
//! requests are rejected before anything is rendered.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use url::Url;

use creator_core::{CreatorError, EmailMessage};
use creator_payments::signature::{self, DEFAULT_TOLERANCE_SECS};

use crate::error::{ApiError, api_error, creator_error, payment_error};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-creator-signature";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailAction {
    Signup,
    Recovery,
    Magiclink,
    EmailChange,
}

impl EmailAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Recovery => "recovery",
            Self::Magiclink => "magiclink",
            Self::EmailChange => "email_change",
        }
    }

    const fn subject(&self) -> &'static str {
        match self {
            Self::Signup => "Confirm your Creator account",
            Self::Recovery => "Reset your Creator password",
            Self::Magiclink => "Your Creator sign-in link",
            Self::EmailChange => "Confirm your new email address",
        }
    }

    const fn intro(&self) -> &'static str {
        match self {
            Self::Signup => "Welcome to Creator! Confirm your email address to get started.",
            Self::Recovery => "We received a request to reset your password.",
            Self::Magiclink => "Use the link below to sign in.",
            Self::EmailChange => "Confirm this address to finish changing your email.",
        }
    }

    const fn button(&self) -> &'static str {
        match self {
            Self::Signup => "Confirm email",
            Self::Recovery => "Reset password",
            Self::Magiclink => "Sign in",
            Self::EmailChange => "Confirm new email",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HookUser {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct HookEmailData {
    pub email_action_type: EmailAction,
    pub token_hash: String,

    /// Path to land on after confirming
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailHookRequest {
    pub user: HookUser,
    pub email_data: HookEmailData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailHookResponse {
    pub sent: bool,
    pub action: EmailAction,
}

const TEMPLATE_NAME: &str = "auth_email.html";

/// Local path from `redirect_to`, if it points inside the app
fn local_next(public_url: &str, redirect_to: Option<&str>) -> Option<String> {
    let path = redirect_to?.strip_prefix(public_url)?;
    let safe = path.starts_with('/') && !path.starts_with("//") && !path.contains('\\');
    safe.then(|| path.to_string())
}

/// Confirmation link with every query value form-encoded
fn confirm_link(public_url: &str, data: &HookEmailData) -> Result<String, url::ParseError> {
    let mut link = Url::parse(&format!("{public_url}/auth/confirm"))?;
    {
        let mut query = link.query_pairs_mut();
        query
            .append_pair("token_hash", &data.token_hash)
            .append_pair("type", data.email_action_type.as_str());
        if let Some(next) = local_next(public_url, data.redirect_to.as_deref()) {
            query.append_pair("next", &next);
        }
    }
    Ok(link.into())
}

/// Auth email templates
///
/// Templates are registered under `.html` names, so every value is
/// HTML-escaped on render.
pub struct EmailTemplates {
    tera: Tera,
}

impl EmailTemplates {
    pub fn new() -> Result<Self, CreatorError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, include_str!("../templates/auth_email.html"))
            .map_err(|e| CreatorError::Config(format!("email template: {e}")))?;
        Ok(Self { tera })
    }

    /// Render the email for a hook request
    pub fn render(&self, public_url: &str, request: &EmailHookRequest) -> Result<EmailMessage, CreatorError> {
        let action = request.email_data.email_action_type;
        let link = confirm_link(public_url, &request.email_data)
            .map_err(|e| CreatorError::Config(format!("public URL {public_url}: {e}")))?;

        let mut context = Context::new();
        context.insert("subject", action.subject());
        context.insert("intro", action.intro());
        context.insert("button", action.button());
        context.insert("link", &link);
        context.insert("email", &request.user.email);

        let html = self
            .tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| CreatorError::Config(format!("email template: {e}")))?;

        Ok(EmailMessage {
            to: request.user.email.clone(),
            subject: action.subject().into(),
            html,
        })
    }
}

/// Signed email hook endpoint
pub async fn email_hook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<EmailHookResponse>, ApiError> {
    let hook = state.email.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "EMAIL_DISABLED",
            "Email hook not configured",
        )
    })?;

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "MISSING_SIGNATURE", "Missing signature"))?;

    signature::verify(
        &hook.secret,
        header,
        &body,
        chrono::Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECS,
    )
    .map_err(payment_error)?;

    let request: EmailHookRequest = serde_json::from_str(&body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "VALIDATION", format!("Invalid hook body: {e}")))?;

    if request.email_data.token_hash.trim().is_empty() || !request.user.email.contains('@') {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "VALIDATION",
            "email and token_hash are required",
        ));
    }

    let action = request.email_data.email_action_type;
    let message = hook
        .templates
        .render(&state.public_url, &request)
        .map_err(creator_error)?;
    hook.sender.send(&message).await.map_err(creator_error)?;

    tracing::info!(
        action = action.as_str(),
        sender = hook.sender.name(),
        "Auth email sent"
    );

    Ok(Json(EmailHookResponse { sent: true, action }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: EmailAction, redirect_to: Option<&str>) -> EmailHookRequest {
        EmailHookRequest {
            user: HookUser {
                email: "ana@example.com".into(),
            },
            email_data: HookEmailData {
                email_action_type: action,
                token_hash: "abc123".into(),
                redirect_to: redirect_to.map(String::from),
            },
        }
    }

    fn render(request: &EmailHookRequest) -> EmailMessage {
        EmailTemplates::new()
            .unwrap()
            .render("https://app.test", request)
            .unwrap()
    }

    #[test]
    fn test_render_recovery_link() {
        let message = render(&request(EmailAction::Recovery, None));
        assert_eq!(message.to, "ana@example.com");
        assert_eq!(message.subject, "Reset your Creator password");
        assert!(message.html.contains("Reset password"));
        assert!(message.html.contains("token_hash=abc123&amp;type=recovery"));
    }

    #[test]
    fn test_link_query_is_encoded() {
        let mut req = request(EmailAction::Signup, Some("https://app.test/done?tab=a&b=c"));
        req.email_data.token_hash = "a&type=recovery#x".into();

        let link = confirm_link("https://app.test", &req.email_data).unwrap();
        let parsed = Url::parse(&link).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("token_hash".to_string(), "a&type=recovery#x".to_string()),
                ("type".to_string(), "signup".to_string()),
                ("next".to_string(), "/done?tab=a&b=c".to_string()),
            ]
        );
        assert!(parsed.fragment().is_none());
    }

    #[test]
    fn test_redirect_only_inside_app() {
        let inside = render(&request(EmailAction::Signup, Some("https://app.test/dashboard")));
        assert!(inside.html.contains("next=%2Fdashboard"));

        for outside in [
            "https://evil.test/dashboard",
            "https://app.test.evil.test/dashboard",
            "https://app.test//evil.test",
        ] {
            let message = render(&request(EmailAction::Signup, Some(outside)));
            assert!(!message.html.contains("next="), "{outside}");
        }
    }

    #[test]
    fn test_email_is_escaped() {
        let mut req = request(EmailAction::Magiclink, None);
        req.user.email = "<script>@x.test".into();
        let message = render(&req);
        assert!(message.html.contains("&lt;script&gt;@x.test"));
        assert!(!message.html.contains("<script>"));
        assert_eq!(message.to, "<script>@x.test");
    }

    #[test]
    fn test_bad_public_url_is_error() {
        let templates = EmailTemplates::new().unwrap();
        assert!(templates.render("not a url", &request(EmailAction::Signup, None)).is_err());
    }

    #[test]
    fn test_action_names() {
        let action: EmailAction = serde_json::from_str("\"email_change\"").unwrap();
        assert_eq!(action, EmailAction::EmailChange);
        assert_eq!(action.as_str(), "email_change");
    }
}
