//! User credentials and per-request authorization.
//!
//! Credentials are acquired once at startup and handed to the workflow by
//! reference; nothing here is process-global.
use crate::api::ApiRequest;
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::io::{self, BufRead, Write};

pub const USER_ENV: &str = "APPLURA_USER";
pub const PASSWORD_ENV: &str = "APPLURA_PASSWORD";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Attach HTTP Basic authorization to an outgoing request.
    pub fn authorize(&self, request: &mut ApiRequest) {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        request.set_header("authorization", format!("Basic {token}"));
    }

    /// Resolve credentials from the `--user` flag, the environment, or an
    /// interactive prompt, in that order.
    pub fn acquire(user_flag: Option<&str>) -> Result<Self> {
        Self::acquire_with(
            user_flag,
            |name| std::env::var(name).ok(),
            &mut TerminalPrompt,
        )
    }

    fn acquire_with<F>(user_flag: Option<&str>, env: F, prompt: &mut dyn Prompt) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = match non_empty(user_flag.map(str::to_string)).or_else(|| non_empty(env(USER_ENV)))
        {
            Some(username) => username,
            None => prompt.username().context("read username")?,
        };
        if username.trim().is_empty() {
            return Err(anyhow!("please enter a username"));
        }
        let password = match non_empty(env(PASSWORD_ENV)) {
            Some(password) => password,
            None => prompt.password().context("read password")?,
        };
        if password.is_empty() {
            return Err(anyhow!("please enter a password"));
        }
        Ok(Self::new(username.trim(), password))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

trait Prompt {
    fn username(&mut self) -> io::Result<String>;
    fn password(&mut self) -> io::Result<String>;
}

struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn username(&mut self) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "username: ")?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn password(&mut self) -> io::Result<String> {
        rpassword::prompt_password("password: ")
    }
}
