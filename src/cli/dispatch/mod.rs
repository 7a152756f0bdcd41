//! Map validated CLI matches to an action.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::Algorithm;
use secrecy::SecretString;

use crate::auth::config::AuthConfig;
use crate::cli::actions::Action;

/// Build the server action from parsed arguments.
///
/// # Errors
///
/// Returns an error if required arguments are missing or the resulting
/// configuration fails validation.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let jwt_secret = matches
        .get_one::<String>("jwt-secret")
        .cloned()
        .context("missing required argument: --jwt-secret")?;
    let algorithm = parse_algorithm(
        matches
            .get_one::<String>("jwt-algorithm")
            .map_or("HS256", String::as_str),
    )?;

    let mut config = AuthConfig::new(SecretString::from(jwt_secret)).with_jwt_algorithm(algorithm);
    if let Some(audience) = matches.get_one::<String>("jwt-audience") {
        config = config.with_jwt_audience(audience.clone());
    }
    if let Some(issuer) = matches.get_one::<String>("jwt-issuer") {
        config = config.with_jwt_issuer(issuer.clone());
    }
    if let Some(seconds) = matches.get_one::<i64>("access-ttl") {
        config = config.with_access_ttl_seconds(*seconds);
    }
    if let Some(seconds) = matches.get_one::<i64>("refresh-ttl") {
        config = config.with_refresh_ttl_seconds(*seconds);
    }
    if let Some(seconds) = matches.get_one::<i64>("code-ttl") {
        config = config.with_code_ttl_seconds(*seconds);
    }
    if let Some(seconds) = matches.get_one::<i64>("resend-cooldown") {
        config = config.with_resend_cooldown_seconds(*seconds);
    }
    if matches.get_flag("allow-unverified-login") {
        config = config.with_require_email_verification_for_login(false);
    }

    if matches.get_one::<String>("kv-url").is_some() {
        tracing::warn!("KV_URL is set but this build uses the in-process key-value store");
    }
    if matches.get_one::<String>("smtp-host").is_some() {
        tracing::warn!("SMTP_HOST is set but this build logs outgoing mail instead of relaying");
    }

    config.validate()?;

    Ok(Action::Server { port, dsn, config })
}

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    match name {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(anyhow!("unsupported JWT algorithm: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    fn matches(args: &[&str]) -> clap::ArgMatches {
        let mut full = vec!["reviewinn-auth"];
        full.extend_from_slice(args);
        commands::new().get_matches_from(full)
    }

    #[test]
    fn builds_server_action_with_defaults() {
        temp_env::with_vars_unset(
            ["REVIEWINN_PORT", "ACCESS_TOKEN_TTL_SECONDS", "JWT_ALGORITHM"],
            || {
                let matches = matches(&[
                    "--dsn",
                    "postgres://localhost/reviewinn",
                    "--jwt-secret",
                    "secret",
                ]);
                let Action::Server { port, dsn, config } =
                    handler(&matches).expect("server action");
                assert_eq!(port, 8080);
                assert_eq!(dsn, "postgres://localhost/reviewinn");
                assert_eq!(config.access_ttl_seconds(), 900);
                assert!(config.require_email_verification_for_login());
            },
        );
    }

    #[test]
    fn overrides_flow_into_config() {
        temp_env::with_vars_unset(["JWT_ALGORITHM", "ACCESS_TOKEN_TTL_SECONDS"], || {
            let matches = matches(&[
                "--dsn",
                "postgres://localhost/reviewinn",
                "--jwt-secret",
                "secret",
                "--jwt-algorithm",
                "HS512",
                "--access-ttl",
                "300",
                "--allow-unverified-login",
            ]);
            let Action::Server { config, .. } = handler(&matches).expect("server action");
            assert_eq!(config.jwt_algorithm(), jsonwebtoken::Algorithm::HS512);
            assert_eq!(config.access_ttl_seconds(), 300);
            assert!(!config.require_email_verification_for_login());
        });
    }

    #[test]
    fn rejects_non_hmac_algorithm() {
        temp_env::with_vars_unset(["JWT_ALGORITHM"], || {
            let matches = matches(&[
                "--dsn",
                "postgres://localhost/reviewinn",
                "--jwt-secret",
                "secret",
                "--jwt-algorithm",
                "RS256",
            ]);
            assert!(handler(&matches).is_err());
        });
    }

    #[test]
    fn rejects_zero_access_ttl() {
        let matches = matches(&[
            "--dsn",
            "postgres://localhost/reviewinn",
            "--jwt-secret",
            "secret",
            "--access-ttl",
            "0",
        ]);
        assert!(handler(&matches).is_err());
    }
}
