use anyhow::Result;
use serde_json::{json, Value};
use shortly::config::Config;
use shortly::utils::test_utils::random_string;

use crate::helpers::*;

pub mod helpers;

async fn register_user(
    client: &reqwest::Client,
    addr: std::net::SocketAddr,
) -> Result<(String, String, String)> {
    let email = format!("{}@example.com", random_string("user", 10)).to_lowercase();
    let response = client
        .post(format!("http://{addr}/api/user/register"))
        .json(&json!({
            "name": "Test User",
            "email": email,
            "password": "correct-horse-battery"
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);

    let refresh_cookie = response
        .headers()
        .get("set-cookie")
        .expect("register should set the refresh cookie")
        .to_str()?
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    let access_token = body["data"]["access_token"].as_str().unwrap().to_string();
    Ok((email, access_token, refresh_cookie))
}

#[tokio::test]
async fn should_register_login_and_fetch_profile() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::new();

    let (email, access_token, _cookie) = register_user(&client, server_handle.addr).await?;

    // A second registration with the same email conflicts
    let response = client
        .post(format!("http://{}/api/user/register", server_handle.addr))
        .json(&json!({
            "name": "Other User",
            "email": email,
            "password": "another-password"
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 409);

    // Login works and reports the profile
    let response = client
        .post(format!("http://{}/api/user/login", server_handle.addr))
        .json(&json!({ "email": email, "password": "correct-horse-battery" }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["user"]["email"], email.as_str());

    // /me with the access token
    let response = client
        .get(format!("http://{}/api/user/me", server_handle.addr))
        .bearer_auth(&access_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["email"], email.as_str());

    Ok(())
}

#[tokio::test]
async fn should_reject_bad_credentials() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::new();

    let (email, _token, _cookie) = register_user(&client, server_handle.addr).await?;

    let response = client
        .post(format!("http://{}/api/user/login", server_handle.addr))
        .json(&json!({ "email": email, "password": "wrong-password" }))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    let response = client
        .post(format!("http://{}/api/user/login", server_handle.addr))
        .json(&json!({ "email": "nobody@example.com", "password": "whatever-123" }))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    Ok(())
}

#[tokio::test]
async fn should_require_auth_for_me() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/api/user/me", server_handle.addr))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    let response = client
        .get(format!("http://{}/api/user/me", server_handle.addr))
        .bearer_auth("not-a-real-token")
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    Ok(())
}

#[tokio::test]
async fn should_rotate_tokens_on_refresh() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::new();

    let (_email, _access, refresh_cookie) = register_user(&client, server_handle.addr).await?;

    let response = client
        .post(format!(
            "http://{}/api/user/refresh-token",
            server_handle.addr
        ))
        .header("Cookie", &refresh_cookie)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("set-cookie").is_some());
    let body: Value = response.json().await?;
    assert!(body["data"]["access_token"].as_str().is_some());

    // Without the cookie the refresh is a 401
    let response = client
        .post(format!(
            "http://{}/api/user/refresh-token",
            server_handle.addr
        ))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    Ok(())
}

#[tokio::test]
async fn should_clear_refresh_cookie_on_logout() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::new();

    let (_email, access_token, refresh_cookie) = register_user(&client, server_handle.addr).await?;

    let response = client
        .post(format!("http://{}/api/user/logout", server_handle.addr))
        .bearer_auth(&access_token)
        .header("Cookie", &refresh_cookie)
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    // The response replaces the refresh cookie with an expired empty one
    let cleared = response
        .headers()
        .get("set-cookie")
        .expect("logout should reset the refresh cookie")
        .to_str()?;
    assert!(cleared.starts_with("refresh_token="));

    // Logout requires a session
    let response = client
        .post(format!("http://{}/api/user/logout", server_handle.addr))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    Ok(())
}

#[tokio::test]
async fn should_manage_links_from_dashboard() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let (_email, access_token, _cookie) = register_user(&client, server_handle.addr).await?;

    // Create two links as the user
    let mut codes = Vec::new();
    for target in ["https://example.com/a", "https://example.com/b"] {
        let response = client
            .post(format!("http://{}/api/shorten", server_handle.addr))
            .bearer_auth(&access_token)
            .json(&json!({ "url": target }))
            .send()
            .await?;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await?;
        codes.push(body["data"]["short_code"].as_str().unwrap().to_string());
    }

    // The dashboard lists both
    let response = client
        .get(format!("http://{}/api/dashboard/urls", server_handle.addr))
        .bearer_auth(&access_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["pagination"]["total"], 2);
    assert_eq!(body["data"]["urls"].as_array().unwrap().len(), 2);

    // Stats see both links
    let response = client
        .get(format!("http://{}/api/dashboard/stats", server_handle.addr))
        .bearer_auth(&access_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["total_links"], 2);

    // Attach an alias to the first link, redirect follows it
    let alias = random_string("edited-", 8);
    let response = client
        .put(format!(
            "http://{}/api/urls/{}",
            server_handle.addr, codes[0]
        ))
        .bearer_auth(&access_token)
        .json(&json!({ "custom_alias": alias }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("http://{}/{}", server_handle.addr, alias))
        .send()
        .await?;
    assert_eq!(response.status(), 302);

    // Delete the second link, its redirect disappears
    let response = client
        .delete(format!(
            "http://{}/api/urls/{}",
            server_handle.addr, codes[1]
        ))
        .bearer_auth(&access_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("http://{}/{}", server_handle.addr, codes[1]))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    Ok(())
}

#[tokio::test]
async fn should_not_touch_other_users_links() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::new();

    let (_e1, owner_token, _c1) = register_user(&client, server_handle.addr).await?;
    let (_e2, intruder_token, _c2) = register_user(&client, server_handle.addr).await?;

    let response = client
        .post(format!("http://{}/api/shorten", server_handle.addr))
        .bearer_auth(&owner_token)
        .json(&json!({ "url": "https://example.com/private" }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await?;
    let short_code = body["data"]["short_code"].as_str().unwrap();

    // Another user cannot edit or delete it
    let response = client
        .put(format!(
            "http://{}/api/urls/{}",
            server_handle.addr, short_code
        ))
        .bearer_auth(&intruder_token)
        .json(&json!({ "is_public": true }))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    let response = client
        .delete(format!(
            "http://{}/api/urls/{}",
            server_handle.addr, short_code
        ))
        .bearer_auth(&intruder_token)
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    Ok(())
}

#[tokio::test]
async fn should_bulk_delete_own_links() -> Result<()> {
    let config = Config::default_for_test();
    let server_handle = ServerHandle::for_config(config).await;
    let client = reqwest::Client::new();

    let (_email, access_token, _cookie) = register_user(&client, server_handle.addr).await?;

    let mut codes = Vec::new();
    for _ in 0..3 {
        let response = client
            .post(format!("http://{}/api/shorten", server_handle.addr))
            .bearer_auth(&access_token)
            .json(&json!({ "url": "https://example.com" }))
            .send()
            .await?;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await?;
        codes.push(body["data"]["short_code"].as_str().unwrap().to_string());
    }

    let response = client
        .post(format!(
            "http://{}/api/urls/bulk-delete",
            server_handle.addr
        ))
        .bearer_auth(&access_token)
        .json(&json!({ "short_codes": codes }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["deleted_count"], 3);

    Ok(())
}
