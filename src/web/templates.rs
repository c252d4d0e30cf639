use askama::Template;

#[derive(Template)]
#[template(path = "landing.html")]
pub struct LandingTemplate {
    pub auth_enabled: bool,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub next: Option<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub display_name: String,
    pub email: Option<String>,
}

/// Error page for failed logins; `error_code` is the provider's code, if any
#[derive(Template)]
#[template(path = "auth_code_error.html")]
pub struct AuthCodeErrorTemplate {
    pub error_code: Option<String>,
}
