use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::parse::{parse_section_threads, parse_thread_posts};
use super::{FetchError, ForumSource};
use crate::constants::FORUM_USER_AGENT;
use crate::snapshot::{ListingOrder, SectionSnapshot, ThreadSnapshot};

static FORM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("Invalid selector"));
static LOGOUT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*=\"/logout\"]").expect("Invalid selector"));
static LOGIN_MESSAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[class*=\"error\"], [class*=\"message\"]").expect("Invalid selector")
});

/// Session-cookie authenticated client for a Foroactivo forum.
///
/// Logs in lazily on the first fetch and reuses the session cookies for
/// every following request.
pub struct ForoactivoClient {
    http: Client,
    forum_url: Url,
    username: String,
    password: String,
    logged_in: Mutex<bool>,
}

/// What the page returned after submitting the login form says.
#[derive(Debug, PartialEq, Eq)]
enum LoginCheck {
    LoggedIn,
    /// No logout link, but the username is on the page.
    Probable,
    Rejected(String),
}

impl ForoactivoClient {
    /// Create a client for the forum at `forum_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `forum_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(
        forum_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let forum_url = Url::parse(forum_url)
            .map_err(|e| FetchError::Parse(format!("invalid forum URL {forum_url}: {e}")))?;

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(FORUM_USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            http,
            forum_url,
            username: username.to_string(),
            password: password.to_string(),
            logged_in: Mutex::new(false),
        })
    }

    /// Log in unless this client already holds a session.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Auth`] if the forum rejects the credentials.
    pub async fn ensure_logged_in(&self) -> Result<(), FetchError> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }
        self.login().await?;
        *logged_in = true;
        Ok(())
    }

    async fn login(&self) -> Result<(), FetchError> {
        let login_url = self
            .forum_url
            .join("/login")
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        debug!(url = %login_url, "Fetching login form");
        let page = self.get_text(login_url.as_str()).await?;

        let action = find_login_action(&page, &login_url)
            .ok_or_else(|| FetchError::Auth("could not find login form".to_string()))?;

        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("login", "Log in"),
            ("autologin", "on"),
            ("redirect", ""),
        ];

        let response = self.http.post(action.as_str()).form(&form).send().await?;
        let response = check_status(response)?;
        let body = response.text().await?;

        match check_login(&body, &self.username) {
            LoginCheck::LoggedIn => {
                info!(forum = %self.forum_url, user = %self.username, "Logged in");
                Ok(())
            }
            LoginCheck::Probable => {
                warn!(
                    forum = %self.forum_url,
                    user = %self.username,
                    "No logout link after login but username found on page, assuming logged in"
                );
                Ok(())
            }
            LoginCheck::Rejected(reason) => Err(FetchError::Auth(reason)),
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.http.get(url).send().await?;
        let response = check_status(response)?;
        Ok(response.text().await?)
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.ensure_logged_in().await?;
        debug!(url = %url, "Fetching forum page");
        self.get_text(url).await
    }
}

#[async_trait]
impl ForumSource for ForoactivoClient {
    async fn fetch_section_threads(
        &self,
        section_url: &str,
    ) -> Result<SectionSnapshot, FetchError> {
        let html = self.fetch_page(section_url).await?;
        let threads = parse_section_threads(&html, section_url)?;
        // Foroactivo lists topics by latest activity, newest on top.
        Ok(SectionSnapshot::new(ListingOrder::NewestFirst, threads))
    }

    async fn fetch_thread_posts(&self, thread_url: &str) -> Result<ThreadSnapshot, FetchError> {
        let html = self.fetch_page(thread_url).await?;
        let posts = parse_thread_posts(&html, thread_url)?;
        Ok(ThreadSnapshot::new(posts))
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Auth(format!(
            "{} returned {status}",
            response.url()
        )));
    }
    if !status.is_success() {
        return Err(FetchError::Network(format!(
            "{} returned {status}",
            response.url()
        )));
    }
    Ok(response)
}

/// Absolute URL the login form posts to.
fn find_login_action(html: &str, page_url: &Url) -> Option<Url> {
    let document = Html::parse_document(html);

    let form = document.select(&FORM).find(|form| {
        form.value()
            .attr("method")
            .is_some_and(|m| m.eq_ignore_ascii_case("post"))
    })?;

    let action = form
        .value()
        .attr("action")
        .filter(|a| !a.is_empty())
        .unwrap_or("/login");
    page_url.join(action).ok()
}

/// An error message on the page wins over the username heuristic.
fn check_login(html: &str, username: &str) -> LoginCheck {
    let document = Html::parse_document(html);
    if document.select(&LOGOUT_LINK).next().is_some() {
        return LoginCheck::LoggedIn;
    }

    if let Some(message) = document
        .select(&LOGIN_MESSAGE)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
    {
        return LoginCheck::Rejected(message);
    }

    if !username.is_empty() && html.to_lowercase().contains(&username.to_lowercase()) {
        return LoginCheck::Probable;
    }

    LoginCheck::Rejected("no logout link found after login".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_login_action() {
        let page = Url::parse("https://rol.foroactivo.com/login").unwrap();
        let html = r#"
            <form method="get" action="/search"></form>
            <form method="POST" action="/login?tt=1"><input name="username"></form>
        "#;
        assert_eq!(
            find_login_action(html, &page).unwrap().as_str(),
            "https://rol.foroactivo.com/login?tt=1"
        );
        assert!(find_login_action("<p>no form</p>", &page).is_none());
    }

    #[test]
    fn test_login_action_defaults_to_login_path() {
        let page = Url::parse("https://rol.foroactivo.com/login").unwrap();
        let html = r#"<form method="post"></form>"#;
        assert_eq!(
            find_login_action(html, &page).unwrap().as_str(),
            "https://rol.foroactivo.com/login"
        );
    }

    #[test]
    fn test_check_login() {
        assert_eq!(
            check_login(r#"<a href="/login?logout=1&amp;tid=x">Salir</a>"#, "lyra"),
            LoginCheck::Rejected("no logout link found after login".to_string())
        );
        assert_eq!(
            check_login(r#"<a href="/logout?tid=x">Salir</a>"#, "lyra"),
            LoginCheck::LoggedIn
        );
        assert_eq!(
            check_login("<p>Bienvenido, Lyra</p>", "lyra"),
            LoginCheck::Probable
        );
        assert_eq!(
            check_login(r#"<div class="errorbox">Contraseña incorrecta</div>"#, "lyra"),
            LoginCheck::Rejected("Contraseña incorrecta".to_string())
        );
        // The rejected form often echoes the submitted username back.
        assert_eq!(
            check_login(
                r#"<div class="errorbox">Contraseña incorrecta</div><form method="post"><input name="username" value="lyra"></form>"#,
                "lyra"
            ),
            LoginCheck::Rejected("Contraseña incorrecta".to_string())
        );
    }
}
