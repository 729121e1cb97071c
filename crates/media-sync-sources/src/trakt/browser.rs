use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use which::which;

use crate::error::TraktError;
use crate::trakt::auth::{DeviceActivator, DeviceCode};

const TRAKT_SIGNIN_URL: &str = "https://trakt.tv/auth/signin";
const LOGIN_SELECTOR: &str = "input[name='user[login]']";
const PASSWORD_SELECTOR: &str = "input[name='user[password]']";
const SUBMIT_SELECTOR: &str = "form input[type='submit'], form button[type='submit']";
const CODE_SELECTOR: &str = "input[name='code'], input#code";

/// Clicks the "Yes" authorize button, returning whether one was found
const CLICK_AUTHORIZE_SCRIPT: &str = r#"(() => {
    const buttons = Array.from(document.querySelectorAll("input[type='submit'], button"));
    const yes = buttons.find(b => (b.value || b.innerText || "").trim().toLowerCase() === "yes");
    if (!yes) { return false; }
    yes.click();
    return true;
})()"#;

/// Activates device codes by driving a headless Chromium through the Trakt
/// web login and activation pages.
pub struct BrowserActivator {
    email: String,
    password: String,
    user_data_dir: PathBuf,
    step_timeout: Duration,
}

impl BrowserActivator {
    pub fn new(email: String, password: String, user_data_dir: PathBuf) -> Self {
        Self {
            email,
            password,
            user_data_dir,
            step_timeout: Duration::from_secs(30),
        }
    }

    /// Find system Chromium: well-known paths first, then PATH
    fn find_system_chromium() -> Option<PathBuf> {
        let system_paths = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/local/bin/chromium-browser",
            "/opt/chromium/chromium",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ];

        for path in &system_paths {
            if Path::new(path).exists() {
                return Some(PathBuf::from(path));
            }
        }

        which("chromium")
            .or_else(|_| which("chromium-browser"))
            .or_else(|_| which("google-chrome"))
            .ok()
    }

    fn build_browser_config(&self) -> Result<BrowserConfig, TraktError> {
        let chrome_path = Self::find_system_chromium()
            .ok_or_else(|| TraktError::Auth("no Chromium executable found".to_string()))?;
        debug!(path = %chrome_path.display(), "Using Chromium");

        BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-features=WebAuthentication")
            .arg("--window-size=800,600")
            .arg(format!("--user-data-dir={}", self.user_data_dir.display()))
            .build()
            .map_err(|e| TraktError::Auth(format!("failed to build browser config: {}", e)))
    }

    async fn run(&self, browser: &Browser, code: &DeviceCode) -> Result<(), TraktError> {
        let page = browser.new_page(TRAKT_SIGNIN_URL).await.map_err(browser_error)?;
        self.sign_in(&page).await?;

        page.goto(code.verification_url.as_str()).await.map_err(browser_error)?;
        let code_input = page.find_element(CODE_SELECTOR).await.map_err(browser_error)?;
        code_input.click().await.map_err(browser_error)?;
        code_input.type_str(&code.user_code).await.map_err(browser_error)?;
        page.find_element(SUBMIT_SELECTOR)
            .await
            .map_err(browser_error)?
            .click()
            .await
            .map_err(browser_error)?;
        self.settle(&page).await;

        let clicked: bool = page
            .evaluate(CLICK_AUTHORIZE_SCRIPT)
            .await
            .map_err(browser_error)?
            .into_value()
            .map_err(|e| TraktError::Auth(format!("unexpected script result: {}", e)))?;
        if !clicked {
            return Err(TraktError::Auth("authorize button not found on activation page".to_string()));
        }
        self.settle(&page).await;

        let url = page.url().await.map_err(browser_error)?.unwrap_or_default();
        if url.contains("/auth/signin") {
            return Err(TraktError::Auth("Trakt session was lost during activation".to_string()));
        }
        info!(url = %url, "Device code authorized");
        Ok(())
    }

    async fn sign_in(&self, page: &Page) -> Result<(), TraktError> {
        // A persisted profile may already be signed in, which redirects away from the form
        let Ok(login) = page.find_element(LOGIN_SELECTOR).await else {
            debug!("No Trakt sign-in form, reusing existing session");
            return Ok(());
        };

        login.click().await.map_err(browser_error)?;
        login.type_str(&self.email).await.map_err(browser_error)?;
        let password = page.find_element(PASSWORD_SELECTOR).await.map_err(browser_error)?;
        password.click().await.map_err(browser_error)?;
        password.type_str(&self.password).await.map_err(browser_error)?;
        page.find_element(SUBMIT_SELECTOR)
            .await
            .map_err(browser_error)?
            .click()
            .await
            .map_err(browser_error)?;
        self.settle(page).await;

        let url = page.url().await.map_err(browser_error)?.unwrap_or_default();
        if url.contains("/auth/signin") {
            return Err(TraktError::Auth("Trakt sign-in was rejected".to_string()));
        }
        info!("Signed in to Trakt web");
        Ok(())
    }

    /// Wait for the navigation triggered by a form submit, bounded by the step timeout
    async fn settle(&self, page: &Page) {
        if tokio::time::timeout(self.step_timeout, page.wait_for_navigation())
            .await
            .is_err()
        {
            warn!(timeout_secs = self.step_timeout.as_secs(), "Timed out waiting for navigation");
        }
    }
}

fn browser_error(e: chromiumoxide::error::CdpError) -> TraktError {
    TraktError::Auth(format!("browser automation failed: {}", e))
}

#[async_trait]
impl DeviceActivator for BrowserActivator {
    async fn activate(&self, code: &DeviceCode) -> Result<(), TraktError> {
        tokio::fs::create_dir_all(&self.user_data_dir).await?;
        let config = self.build_browser_config()?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| TraktError::Auth(format!("failed to launch browser: {}", e)))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = ?e, "Browser handler error");
                }
            }
        });

        let result = self.run(&browser, code).await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        let _ = tokio::time::timeout(Duration::from_secs(2), handler_task).await;

        result
    }
}
