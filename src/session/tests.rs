use super::*;
use wiremock::matchers::{body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn upstream_for(server: &MockServer, flow: LoginFlow) -> UpstreamConfig {
    UpstreamConfig {
        base_url: format!("{}/", server.uri()),
        username: "alice".to_string(),
        password: "hunter2".to_string(),
        login_flow: flow,
        ..Default::default()
    }
}

fn manager_for(server: &MockServer, flow: LoginFlow) -> SessionManager {
    let upstream = upstream_for(server, flow);
    let context = ClientContext::new(&upstream).unwrap();
    SessionManager::new(context, &upstream).unwrap()
}

fn logged_out() -> ResponseTemplate {
    ResponseTemplate::new(200).insert_header("refresh", "0; url=login.php")
}

async fn mount_logged_out_probe(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(logged_out())
        .mount(server)
        .await;
}

async fn mount_login_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form></form>"))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_valid_session_skips_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome back"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let manager = manager_for(&server, LoginFlow::default());
    let session = manager.ensure_authenticated().await.unwrap();

    assert_eq!(
        session,
        Session {
            authenticated: true,
            refreshed: false
        }
    );
}

#[tokio::test]
async fn test_account_update_flow_logs_in() {
    let server = MockServer::start().await;
    mount_logged_out_probe(&server).await;
    mount_login_page(&server).await;

    Mock::given(method("POST"))
        .and(path("/account-upd.php"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(body_string_contains("f="))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .and(query_param("type", "login"))
        .and(body_string_contains("username=alice"))
        .and(body_string_contains("password=hunter2"))
        .and(body_string_contains("do=login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "sid=0123abcd; path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server, LoginFlow::default());
    let session = manager.ensure_authenticated().await.unwrap();

    assert!(session.authenticated);
    assert!(session.refreshed);
}

#[tokio::test]
async fn test_fingerprint_is_stable_hex() {
    let server = MockServer::start().await;
    let manager = manager_for(&server, LoginFlow::Direct);

    assert_eq!(manager.fingerprint.len(), 32);
    assert!(manager.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_csrf_flow_echoes_token() {
    let server = MockServer::start().await;
    mount_logged_out_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "csrfp_token=tok42; path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .and(body_string_contains("csrfp_token=tok42"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=fresh; path=/"))
        .expect(1)
        .mount(&server)
        .await;

    let flow = LoginFlow::CsrfToken {
        cookie: "csrfp_token".to_string(),
        field: "csrfp_token".to_string(),
    };
    let session = manager_for(&server, flow).ensure_authenticated().await.unwrap();

    assert!(session.refreshed);
}

#[tokio::test]
async fn test_csrf_flow_without_token_fails() {
    let server = MockServer::start().await;
    mount_logged_out_probe(&server).await;
    mount_login_page(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let flow = LoginFlow::CsrfToken {
        cookie: "csrfp_token".to_string(),
        field: "csrfp_token".to_string(),
    };
    let err = manager_for(&server, flow)
        .ensure_authenticated()
        .await
        .unwrap_err();

    match err {
        AuthError::MissingCsrfToken { cookie } => assert_eq!(cookie, "csrfp_token"),
        other => panic!("expected MissingCsrfToken, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_without_session_cookie_is_rejected() {
    let server = MockServer::start().await;
    mount_logged_out_probe(&server).await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("wrong password"))
        .expect(1)
        .mount(&server)
        .await;

    let err = manager_for(&server, LoginFlow::Direct)
        .ensure_authenticated()
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Rejected { ref cookie } if cookie == "sid"));
}

#[tokio::test]
async fn test_unexpected_status_names_stage() {
    let server = MockServer::start().await;
    mount_logged_out_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = manager_for(&server, LoginFlow::default())
        .ensure_authenticated()
        .await
        .unwrap_err();

    match err {
        AuthError::UnexpectedStatus { stage, status } => {
            assert_eq!(stage, AuthStage::LoginPage);
            assert_eq!(status, 503);
        }
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_redirect_is_not_followed() {
    let server = MockServer::start().await;
    mount_logged_out_probe(&server).await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/index.php")
                .insert_header("set-cookie", "sid=abc; path=/"),
        )
        .mount(&server)
        .await;

    let err = manager_for(&server, LoginFlow::Direct)
        .ensure_authenticated()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthError::UnexpectedStatus {
            stage: AuthStage::Login,
            status: 302
        }
    ));
}

#[tokio::test]
async fn test_probe_transport_failure() {
    // Nothing listens on port 1
    let upstream = UpstreamConfig {
        base_url: "http://127.0.0.1:1/".to_string(),
        username: "alice".to_string(),
        password: "hunter2".to_string(),
        ..Default::default()
    };
    let context = ClientContext::new(&upstream).unwrap();
    let manager = SessionManager::new(context, &upstream).unwrap();

    let err = manager.ensure_authenticated().await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Network {
            stage: AuthStage::Probe,
            ..
        }
    ));
}

#[tokio::test]
async fn test_session_cookie_is_reused_by_next_probe() {
    let server = MockServer::start().await;

    // Once the jar carries the session cookie the probe sees a logged-in page
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header_regex("cookie", "sid=0123abcd"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_logged_out_probe(&server).await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "sid=0123abcd; path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server, LoginFlow::Direct);

    let first = manager.ensure_authenticated().await.unwrap();
    assert!(first.refreshed);
    assert!(
        manager
            .context
            .cookie_header()
            .is_some_and(|cookies| cookies.contains("sid=0123abcd"))
    );

    let second = manager.ensure_authenticated().await.unwrap();
    assert!(!second.refreshed);
}

#[test]
fn test_invalid_marker_header_is_config_error() {
    let upstream = UpstreamConfig {
        base_url: "https://tracker.example/".to_string(),
        login_marker_header: "not a header".to_string(),
        ..Default::default()
    };
    let context = ClientContext::new(&upstream).unwrap();

    assert!(matches!(
        SessionManager::new(context, &upstream),
        Err(Error::Config { .. })
    ));
}
