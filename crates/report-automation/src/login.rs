use anyhow::anyhow;
use chromiumoxide::Page;
use report_config::PortalConfig;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::AutomationError;
use crate::render;
use crate::session::Credentials;

/// Check whether the persisted browser profile is still signed in, probing
/// the inbox for a signed-in marker.
pub async fn is_signed_in(page: &Page, portal: &PortalConfig) -> anyhow::Result<bool> {
    page.goto(portal.inbox_url.as_str()).await?;
    sleep(Duration::from_secs(2)).await;

    // Redirected back to the login form means the cookie expired
    if let Ok(Some(url)) = page.url().await {
        if url.contains("login") || url.starts_with(portal.login_url.as_str()) {
            return Ok(false);
        }
    }

    for selector in &portal.signed_in_selectors {
        if page.find_element(selector.as_str()).await.is_ok() {
            info!("Existing browser profile is already signed in");
            return Ok(true);
        }
    }

    Ok(false)
}

/// Unattended sign-in handshake. Fails fast with `LoginRequired` when the
/// portal still shows a login page afterwards - that condition needs an
/// operator, not a retry loop.
pub async fn sign_in(
    page: &Page,
    portal: &PortalConfig,
    credentials: &Credentials,
) -> Result<(), AutomationError> {
    info!("Not signed in, performing login handshake...");

    page.goto(portal.login_url.as_str())
        .await
        .map_err(|e| AutomationError::Other(anyhow!("Failed to open login page: {}", e)))?;
    render::wait_for_page_load(page)
        .await
        .map_err(AutomationError::Other)?;
    sleep(Duration::from_secs(2)).await;

    let username_input = find_username_input(page)
        .await
        .map_err(AutomationError::Other)?;
    let password_input = find_password_input(page)
        .await
        .map_err(AutomationError::Other)?;

    username_input
        .type_str(&credentials.username)
        .await
        .map_err(|e| AutomationError::Other(anyhow!("Failed to type username: {}", e)))?;
    password_input
        .type_str(&credentials.password)
        .await
        .map_err(|e| AutomationError::Other(anyhow!("Failed to type password: {}", e)))?;

    let submit = find_submit_button(page).await.map_err(AutomationError::Other)?;
    submit
        .click()
        .await
        .map_err(|e| AutomationError::Other(anyhow!("Failed to submit login form: {}", e)))?;

    info!("Submitted login form, waiting for authentication...");
    sleep(Duration::from_secs(3)).await;

    if let Some(error_info) = check_for_errors(page).await {
        warn!("Error detected on login page: {}", error_info);
    }

    // Land on the inbox and verify the handshake actually took
    page.goto(portal.inbox_url.as_str())
        .await
        .map_err(|e| AutomationError::Other(anyhow!("Failed to open inbox after login: {}", e)))?;
    sleep(Duration::from_secs(2)).await;

    let landed = page.url().await.ok().flatten().unwrap_or_default();
    let still_on_login = landed.contains("login") || landed.starts_with(portal.login_url.as_str());

    let mut marker_present = false;
    for selector in &portal.signed_in_selectors {
        if page.find_element(selector.as_str()).await.is_ok() {
            marker_present = true;
            break;
        }
    }

    if still_on_login || !marker_present {
        warn!(
            "Login handshake failed: url = {}, signed-in marker present = {}",
            landed, marker_present
        );
        return Err(AutomationError::LoginRequired);
    }

    info!("Successfully signed in to the portal");
    Ok(())
}

/// Find the username/email input field
async fn find_username_input(page: &Page) -> anyhow::Result<chromiumoxide::Element> {
    let selectors = [
        "input[type='email']",
        "input[name*='email' i]",
        "input[id*='email' i]",
        "input[name*='user' i]",
    ];

    for selector in &selectors {
        match page.find_element(*selector).await {
            Ok(element) => return Ok(element),
            Err(_) => continue,
        }
    }

    Err(anyhow!("Could not find username input field on login page"))
}

/// Find the password input field
async fn find_password_input(page: &Page) -> anyhow::Result<chromiumoxide::Element> {
    let selectors = [
        "input[type='password']",
        "input[name*='password' i]",
        "input[id*='password' i]",
    ];

    for selector in &selectors {
        match page.find_element(*selector).await {
            Ok(element) => return Ok(element),
            Err(_) => continue,
        }
    }

    Err(anyhow!("Could not find password input field on login page"))
}

/// Find the submit button
async fn find_submit_button(page: &Page) -> anyhow::Result<chromiumoxide::Element> {
    let selectors = [
        "input[type='submit']",
        "button[type='submit']",
        "button[id*='signIn' i]",
        "button[class*='submit']",
        "button",
    ];

    for selector in &selectors {
        match page.find_element(*selector).await {
            Ok(element) => return Ok(element),
            Err(_) => continue,
        }
    }

    Err(anyhow!("Could not find submit button on login page"))
}

/// Check for visible error messages on the current page
async fn check_for_errors(page: &Page) -> Option<String> {
    let error_selectors = [
        "[role='alert']",
        "[data-testid*='error']",
        ".error",
        ".alert-error",
        ".form-error",
    ];

    for selector in &error_selectors {
        if let Ok(element) = page.find_element(*selector).await {
            if let Ok(Some(text)) = element.inner_text().await {
                if !text.trim().is_empty() {
                    return Some(format!("Error element found (selector: {}): {}", selector, text));
                }
            }
        }
    }

    let captcha_selectors = ["[data-testid*='captcha']", "iframe[src*='captcha']", ".captcha"];
    for selector in &captcha_selectors {
        if page.find_element(*selector).await.is_ok() {
            return Some(format!("CAPTCHA detected (selector: {})", selector));
        }
    }

    None
}
