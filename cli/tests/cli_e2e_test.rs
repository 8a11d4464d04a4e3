use assert_cmd::{Command, cargo_bin_cmd};
use predicates::prelude::predicate;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pos_context() -> Command {
    let mut cmd = cargo_bin_cmd!("pos-context");
    cmd.env("RUST_LOG", "off");
    cmd
}

/// Command bound to a mock server and an isolated storage directory.
fn pos_context_against(server: &MockServer, storage: &TempDir) -> Command {
    let mut cmd = pos_context();
    cmd.args(["--base-url", &server.uri()])
        .arg("--storage-dir")
        .arg(storage.path());
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

mod help_and_version {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        pos_context()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage:"))
            .stdout(predicate::str::contains("resolve"))
            .stdout(predicate::str::contains("select"))
            .stdout(predicate::str::contains("guard"))
            .stdout(predicate::str::contains("logout"));
    }

    #[test]
    fn test_version_flag() {
        pos_context()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pos-context"));
    }

    #[test]
    fn test_no_args_shows_help() {
        pos_context()
            .assert()
            .failure()
            .stderr(predicate::str::contains("Usage:"));
    }

    #[test]
    fn test_select_requires_profile_and_branch() {
        pos_context()
            .args(["select", "--profile", "cashier"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--branch"));
    }
}

mod resolve_command {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_then_served_from_cache() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/operational-context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "activeContext": {"profile": "cashier", "branch": "downtown"},
                "eligibleProfiles": [{"id": "cashier"}],
                "requiresSelection": false,
                "hasAccess": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let first = pos_context_against(&server, &storage)
            .args(["resolve", "--json"])
            .output()
            .unwrap();
        assert!(first.status.success());
        let first = stdout_json(&first);
        assert_eq!(first["source"], "server_active");
        assert_eq!(first["context"]["profile"], "cashier");

        let second = pos_context_against(&server, &storage)
            .args(["resolve", "--json"])
            .output()
            .unwrap();
        assert!(second.status.success());
        assert_eq!(stdout_json(&second)["source"], "cache");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_failure_exits_with_category() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/operational-context"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let output = pos_context_against(&server, &storage)
            .args(["resolve", "--json"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(2));
        let body = stdout_json(&output);
        assert_eq!(body["category"], "transient");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_access() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/operational-context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "eligibleProfiles": [],
                "requiresSelection": false,
                "hasAccess": false
            })))
            .mount(&server)
            .await;

        let output = pos_context_against(&server, &storage)
            .args(["resolve", "--json"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(2));
        assert_eq!(stdout_json(&output)["category"], "no_access");
    }
}

mod select_command {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_selection_is_cached_for_later_commands() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .and(path("/api/operational-context/select"))
            .and(body_json(serde_json::json!({"profile": "waiter", "branch": "north"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "context": {"profile": "waiter", "branch": "north"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/operational-context"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        pos_context_against(&server, &storage)
            .args(["select", "--profile", "waiter", "--branch", "north"])
            .assert()
            .success()
            .stdout(predicate::str::contains("waiter"));

        let output = pos_context_against(&server, &storage)
            .args(["resolve", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let body = stdout_json(&output);
        assert_eq!(body["context"]["branch"], "north");
        assert_eq!(body["source"], "cache");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refused_selection_fails() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .and(path("/api/operational-context/select"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "Branch not allowed"
            })))
            .mount(&server)
            .await;

        pos_context_against(&server, &storage)
            .args(["select", "--profile", "waiter", "--branch", "south"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Branch not allowed"));
    }
}

mod guard_command {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_selection_required_redirects() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/operational-context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "eligibleProfiles": [{"id": "cashier"}, {"id": "waiter"}],
                "requiresSelection": true,
                "hasAccess": true
            })))
            .expect(3)
            .mount(&server)
            .await;

        let output = pos_context_against(&server, &storage)
            .args(["guard", "--destination", "/cashier", "--json"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(3));
        let body = stdout_json(&output);
        assert_eq!(body["state"], "selection_required");
        assert_eq!(
            body["action"]["url"],
            "/select-profile?reason=selection_required&returnTo=%2Fcashier"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_passes_with_open_shift() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/operational-context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "activeContext": {"profile": "cashier", "branch": "downtown"},
                "eligibleProfiles": [{"id": "cashier"}],
                "requiresSelection": false,
                "hasAccess": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/opening/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resourceId": "opening-7"
            })))
            .mount(&server)
            .await;

        let output = pos_context_against(&server, &storage)
            .args(["guard", "--requires-opening", "--json"])
            .output()
            .unwrap();

        assert!(output.status.success());
        let body = stdout_json(&output);
        assert_eq!(body["state"], "passed");
        assert_eq!(body["resourceId"], "opening-7");
    }
}

mod logout_command {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_logout_purges_cached_context() {
        let server = MockServer::start().await;
        let storage = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .and(path("/api/operational-context/select"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "context": {"profile": "waiter", "branch": "north"}
            })))
            .mount(&server)
            .await;

        pos_context_against(&server, &storage)
            .args(["select", "-p", "waiter", "-b", "north"])
            .assert()
            .success();

        let output = pos_context_against(&server, &storage)
            .args(["logout", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(stdout_json(&output)["preserved"][0], "pos:debug");

        let stored =
            std::fs::read_to_string(storage.path().join("storage.json")).unwrap_or_default();
        assert!(!stored.contains("waiter"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn test_token_is_redacted() {
        let storage = TempDir::new().unwrap();
        let output = pos_context()
            .env("POS_GATEWAY_TOKEN", "secret-token")
            .arg("--storage-dir")
            .arg(storage.path())
            .arg("config")
            .output()
            .unwrap();

        assert!(output.status.success());
        let body = stdout_json(&output);
        assert_eq!(body["gateway"]["api_token"], "***");
        assert_eq!(body["cache"]["storage_dir"], storage.path().display().to_string());
    }

    #[test]
    fn test_invalid_config_file_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pos.toml");
        std::fs::write(&file, "[gateway]\nbase_url = \"not a url\"\n").unwrap();

        pos_context()
            .arg("--config")
            .arg(&file)
            .arg("config")
            .assert()
            .failure();
    }
}
