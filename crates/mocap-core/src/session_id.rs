use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

const TOKEN_LEN: usize = 4;

/// Session identifier shared with every node during the handshake.
///
/// Capture sessions use a bare 4-digit hex token (`"3fa9"`). Calibration
/// sessions prefix the token with the interior chessboard pattern size
/// (`"9-6-3fa9"`); nodes pick the session kind from this shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SessionId {
    Capture { token: String },
    Calibration { cols: u32, rows: u32, token: String },
}

/// What a session produces on each node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Capture,
    Calibration,
}

fn random_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:04x}", rng.gen::<u16>())
}

impl SessionId {
    /// Fresh capture identifier. Collisions are possible but rare; callers that
    /// detect one simply draw again.
    pub fn capture<R: Rng + ?Sized>(rng: &mut R) -> Self {
        SessionId::Capture {
            token: random_token(rng),
        }
    }

    /// Fresh calibration identifier for a `cols × rows` interior-corner pattern.
    pub fn calibration<R: Rng + ?Sized>(cols: u32, rows: u32, rng: &mut R) -> Self {
        SessionId::Calibration {
            cols,
            rows,
            token: random_token(rng),
        }
    }

    pub fn kind(&self) -> SessionKind {
        match self {
            SessionId::Capture { .. } => SessionKind::Capture,
            SessionId::Calibration { .. } => SessionKind::Calibration,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            SessionId::Capture { token } | SessionId::Calibration { token, .. } => token,
        }
    }

    /// Chessboard pattern size for calibration sessions.
    pub fn pattern(&self) -> Option<(u32, u32)> {
        match self {
            SessionId::Capture { .. } => None,
            SessionId::Calibration { cols, rows, .. } => Some((*cols, *rows)),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Capture { token } => f.write_str(token),
            SessionId::Calibration { cols, rows, token } => write!(f, "{cols}-{rows}-{token}"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid session id {raw:?}")]
pub struct ParseSessionIdError {
    pub raw: String,
}

fn is_token(s: &str) -> bool {
    s.len() == TOKEN_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl FromStr for SessionId {
    type Err = ParseSessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSessionIdError { raw: s.to_string() };
        if s.len() == TOKEN_LEN {
            return is_token(s)
                .then(|| SessionId::Capture {
                    token: s.to_string(),
                })
                .ok_or_else(err);
        }
        let mut parts = s.splitn(3, '-');
        let (Some(cols), Some(rows), Some(token)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let cols = cols.parse().map_err(|_| err())?;
        let rows = rows.parse().map_err(|_| err())?;
        if !is_token(token) {
            return Err(err());
        }
        Ok(SessionId::Calibration {
            cols,
            rows,
            token: token.to_string(),
        })
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SessionId {
    type Error = ParseSessionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
