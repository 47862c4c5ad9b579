use crate::slug::normalize;

pub const TITLE_PREFIX: &str = "title";

/// Identity of a playback target as carried by the navigable address:
/// `/title/<title_id>?<server_token>&<episode_token>`.
///
/// Tokens are always stored in normalized form. A locator is never stored on
/// its own; it is rebuilt from the address every time the address changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackLocator {
    pub title_id: String,
    pub server_token: Option<String>,
    pub episode_token: Option<String>,
}

impl PlaybackLocator {
    pub fn new(title_id: impl Into<String>) -> Self {
        Self {
            title_id: title_id.into(),
            server_token: None,
            episode_token: None,
        }
    }

    /// Builds a locator from tokens that are already in address form.
    pub fn with_tokens(
        title_id: impl Into<String>,
        server_token: String,
        episode_token: Option<String>,
    ) -> Self {
        Self {
            title_id: title_id.into(),
            server_token: non_empty(server_token),
            episode_token: episode_token.and_then(non_empty),
        }
    }

    pub fn for_episode(
        title_id: impl Into<String>,
        server_label: &str,
        episode_label: &str,
    ) -> Self {
        Self {
            title_id: title_id.into(),
            server_token: non_empty(normalize(server_label)),
            episode_token: non_empty(normalize(episode_label)),
        }
    }

    /// Parses the raw query part of a title address (`s1&tap-01`).
    ///
    /// Each token is URL-decoded and normalized again, so hand-typed or
    /// percent-encoded tokens match the same labels as generated ones.
    pub fn from_query(title_id: impl Into<String>, raw: &str) -> Self {
        let mut parts = raw.splitn(2, '&').map(decode_token);
        let server_token = parts.next().flatten();
        let episode_token = parts.next().flatten();
        Self {
            title_id: title_id.into(),
            server_token,
            episode_token,
        }
    }

    pub fn has_tokens(&self) -> bool {
        self.server_token.is_some() || self.episode_token.is_some()
    }

    pub fn query(&self) -> String {
        let encode = |token: &Option<String>| {
            token
                .as_deref()
                .map(|t| urlencoding::encode(t).into_owned())
                .unwrap_or_default()
        };
        match (&self.server_token, &self.episode_token) {
            (None, None) => String::new(),
            (_, None) => encode(&self.server_token),
            _ => format!(
                "{}&{}",
                encode(&self.server_token),
                encode(&self.episode_token)
            ),
        }
    }

    pub fn path(&self) -> String {
        let base = format!(
            "/{}/{}",
            TITLE_PREFIX,
            urlencoding::encode(&self.title_id)
        );
        let query = self.query();
        if query.is_empty() {
            base
        } else {
            format!("{}?{}", base, query)
        }
    }
}

impl std::fmt::Display for PlaybackLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

fn decode_token(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    non_empty(normalize(&decoded))
}

fn non_empty(token: String) -> Option<String> {
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
