use super::*;
use clap::CommandFactory;
use kusina::{RedirectReason, RouteDescriptor, View};

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn navigate_defaults_to_path_target() {
    let cli = Cli::try_parse_from(["kusina", "navigate", "/admin/users"]).unwrap();
    let Command::Online(OnlineCommand::Navigate { target, by_name }) = cli.command else {
        panic!("expected navigate");
    };
    assert_eq!(navigation_target(target, by_name), NavigationTarget::Path("/admin/users".into()));
}

#[test]
fn navigate_by_name_flag() {
    let cli = Cli::try_parse_from(["kusina", "navigate", "--by-name", "dashboard"]).unwrap();
    let Command::Online(OnlineCommand::Navigate { target, by_name }) = cli.command else {
        panic!("expected navigate");
    };
    assert_eq!(navigation_target(target, by_name), NavigationTarget::Name("dashboard".into()));
}

#[test]
fn profile_parses_display_name() {
    let cli = Cli::try_parse_from(["kusina", "profile", "--display-name", "Lola Nena"]).unwrap();
    assert!(matches!(cli.command, Command::Online(OnlineCommand::Profile { display_name: Some(ref n) }) if n == "Lola Nena"));
}

#[test]
fn identity_json_includes_role() {
    let user = UserIdentity {
        id: "u1".into(),
        email: "u1@kusina.test".into(),
        display_name: Some("Cook".into()),
        is_admin: true,
        image_url: None,
    };
    let value = identity_json(&user);
    assert_eq!(value["role"], "Administrator");
    assert_eq!(value["id"], "u1");
    assert!(value["image_url"].is_null());
}

#[test]
fn redirected_outcome_reports_reason() {
    let outcome = NavigationOutcome::Redirected {
        requested: RouteDescriptor::new("dashboard", "/dashboard", View::Dashboard).requires_auth(),
        to: RouteDescriptor::new("login", "/login", View::Login),
        reason: RedirectReason::LoginRequired,
    };
    let value = outcome_json(&outcome);
    assert_eq!(value["status"], "redirected");
    assert_eq!(value["requested"], "dashboard");
    assert_eq!(value["path"], "/login");
    assert_eq!(value["reason"], RedirectReason::LoginRequired.as_str());
}

#[test]
fn superseded_outcome() {
    assert_eq!(outcome_json(&NavigationOutcome::Superseded)["status"], "superseded");
}

#[test]
fn local_commands_stay_outside_online_group() {
    assert!(matches!(Cli::try_parse_from(["kusina", "whoami"]).unwrap().command, Command::Whoami));
    assert!(matches!(Cli::try_parse_from(["kusina", "routes"]).unwrap().command, Command::Routes));
    assert!(matches!(
        Cli::try_parse_from(["kusina", "logout"]).unwrap().command,
        Command::Online(OnlineCommand::Logout)
    ));
}

// =============================================================================
// errors
// =============================================================================

#[test]
fn error_json_carries_code_and_message() {
    let err = CliError::from(AuthError::InvalidCredentials("Invalid login credentials".into()));
    let value = error_json(&err);
    assert_eq!(value["error"], "E_INVALID_CREDENTIALS");
    assert_eq!(value["message"], "invalid login credentials: Invalid login credentials");
    assert_eq!(value["retryable"], false);
}

#[test]
fn error_json_delegates_retryable() {
    let err = CliError::from(SessionError::from(AuthError::Transport("timed out".into())));
    let value = error_json(&err);
    assert_eq!(value["error"], "E_AUTH_TRANSPORT");
    assert_eq!(value["retryable"], true);
}

#[test]
fn cli_only_errors_have_codes() {
    assert_eq!(CliError::MissingPassword.error_code(), "E_MISSING_PASSWORD");
    assert_eq!(CliError::EmptyPatch.error_code(), "E_EMPTY_PATCH");
    let config = CliError::from(ConfigError::Missing { var: "SUPABASE_URL".into() });
    assert_eq!(config.error_code(), "E_CONFIG_MISSING");
}

#[test]
fn command_error_wins_over_token_save_error() {
    let command = Err(CliError::from(AuthError::NoSession));
    let saved = Err(CliError::from(CacheError::Io(std::io::Error::other("disk full"))));
    let err = finish(command, saved).unwrap_err();
    assert_eq!(err.error_code(), "E_NO_SESSION");
}

#[test]
fn token_save_error_surfaces_after_success() {
    let saved = Err(CliError::from(CacheError::Io(std::io::Error::other("disk full"))));
    let err = finish(Ok(()), saved).unwrap_err();
    assert_eq!(err.error_code(), "E_CACHE_IO");
    assert!(finish(Ok(()), Ok(())).is_ok());
}
