use std::fmt;

use serde::{Deserialize, Serialize};

/// Which handling path a question takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    #[default]
    Sql,
    Chart,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Sql => "sql",
            Route::Chart => "chart",
        }
    }

    /// Parse a model reply. Only a reply that normalizes to exactly `sql` or
    /// `chart` is accepted; quotes, trailing punctuation and case are ignored.
    pub fn parse_reply(reply: &str) -> Option<Route> {
        let token = reply
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();
        match token.as_str() {
            "sql" => Some(Route::Sql),
            "chart" => Some(Route::Chart),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
