//! Parsing of SNS appliance responses.
//!
//! Every answer from the appliance ends with a status line of the form
//! `100 code=00a00100 msg="Ok"`. Level `101` opens a multi-line data
//! section and is not a terminator. Levels below 200 are successes.

use crate::error::CommandError;

/// Level announcing the start of a data section.
pub const LEVEL_BEGIN: u16 = 101;

/// First level treated as a failure.
const LEVEL_FAILURE: u16 = 200;

/// One parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub level: u16,
    pub code: String,
    pub message: String,
}

impl StatusLine {
    /// Parse a status line, returning `None` for payload lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (level, rest) = line.split_once(' ')?;
        if level.len() != 3 || !level.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let rest = rest.trim_start().strip_prefix("code=")?;
        let (code, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let message = tail
            .trim()
            .strip_prefix("msg=")
            .map(|m| match m.strip_prefix('"') {
                Some(quoted) => quoted.split('"').next().unwrap_or_default().to_string(),
                None => m.split_whitespace().next().unwrap_or_default().to_string(),
            })
            .unwrap_or_default();

        Some(Self {
            level: level.parse().ok()?,
            code: code.to_string(),
            message,
        })
    }

    pub fn is_success(&self) -> bool {
        self.level < LEVEL_FAILURE
    }

    /// Whether this line ends a response.
    pub fn is_terminal(&self) -> bool {
        self.level != LEVEL_BEGIN
    }
}

/// A full response split into payload and final status.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: Option<StatusLine>,
    pub output: String,
}

impl Response {
    pub fn parse(raw: &str) -> Self {
        let mut status = None;
        let mut payload = Vec::new();

        for line in raw.lines() {
            match StatusLine::parse(line) {
                Some(parsed) => status = Some(parsed),
                None => payload.push(line),
            }
        }

        Self {
            status,
            output: payload.join("\n").trim_end().to_string(),
        }
    }

    /// Responses without any status line are plain text and count as success.
    pub fn is_success(&self) -> bool {
        self.status.as_ref().map_or(true, StatusLine::is_success)
    }

    /// Convert into the payload text, or a remote error for failure levels.
    pub fn into_output(self) -> Result<String, CommandError> {
        match self.status {
            Some(status) if !status.is_success() => Err(CommandError::remote(format!(
                "{} code={} {}",
                status.level, status.code, status.message
            ))),
            _ => Ok(self.output),
        }
    }
}

/// Find a `Key=value` entry in section-formatted output.
pub fn find_value<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        if k.trim() == key {
            let v = v.trim().trim_matches('"');
            (!v.is_empty()).then_some(v)
        } else {
            None
        }
    })
}

/// One administrator session listed by the appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub user: String,
    pub address: Option<String>,
}

/// Extract administrator sessions from a `monitor admin` style listing.
///
/// Lines are `key=value` tokens; the user comes from `user`, `login` or
/// `name`, the origin from `address` or `ip`.
pub fn parse_admin_sessions(output: &str) -> Vec<AdminSession> {
    output
        .lines()
        .filter(|line| StatusLine::parse(line).is_none())
        .filter_map(|line| {
            let mut user = None;
            let mut address = None;
            for token in line.split_whitespace() {
                let Some((key, value)) = token.split_once('=') else {
                    continue;
                };
                let value = value.trim_matches('"');
                match key.to_ascii_lowercase().as_str() {
                    "user" | "login" | "name" if !value.is_empty() => {
                        user = Some(value.to_string())
                    }
                    "address" | "ip" if !value.is_empty() => address = Some(value.to_string()),
                    _ => {}
                }
            }
            user.map(|user| AdminSession { user, address })
        })
        .collect()
}
