use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{redirect::Policy, Client, ClientBuilder};
use thiserror::Error;

use crate::summary::fetch::{public_redirect_policy, PublicAddressResolver};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; PageSummaryBot/1.0; +https://example.com/page-summary)";

pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_redirects: usize,
    /// Bytes of page body scanned before the head is treated as ended.
    pub max_body_bytes: u64,
    pub user_agent: String,
    /// Disables the private-address check on summary targets and redirects.
    /// Only meant for local development and tests.
    pub allow_private_hosts: bool,
    pub is_production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parse_var(&lookup, "SERVER_PORT", 8080, "a port number")?,
            fetch_timeout: Duration::from_secs(parse_var(
                &lookup,
                "FETCH_TIMEOUT_SECS",
                5,
                "a number of seconds",
            )?),
            connect_timeout: Duration::from_secs(parse_var(
                &lookup,
                "CONNECT_TIMEOUT_SECS",
                3,
                "a number of seconds",
            )?),
            max_redirects: parse_var(&lookup, "MAX_REDIRECTS", 5, "a non-negative integer")?,
            max_body_bytes: parse_var(
                &lookup,
                "MAX_BODY_BYTES",
                DEFAULT_MAX_BODY_BYTES,
                "a number of bytes",
            )?,
            user_agent: lookup("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            allow_private_hosts: parse_var(&lookup, "ALLOW_PRIVATE_HOSTS", false, "true or false")?,
            is_production: lookup("APP_ENV").as_deref() == Some("production"),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// The outbound client used for every summary fetch.
    pub fn http_client(&self) -> reqwest::Result<Client> {
        self.http_client_builder().build()
    }

    /// Client settings before build. Unless private hosts are allowed, every
    /// connection and redirect hop is checked against private addresses.
    pub fn http_client_builder(&self) -> ClientBuilder {
        let builder = Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout)
            .timeout(self.fetch_timeout);

        if self.allow_private_hosts {
            builder.redirect(Policy::limited(self.max_redirects))
        } else {
            builder
                .dns_resolver(Arc::new(PublicAddressResolver))
                .redirect(public_redirect_policy(self.max_redirects))
        }
    }
}

fn parse_var<F, T>(
    lookup: &F,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
            expected,
        }),
    }
}
