//! Display identity of a SASL session, used in audit and diagnostic logs.

use std::fmt;

/// Who is on the other end of a SASL session, as far as we know.
///
/// Built from the session on demand, so it always reflects the latest host,
/// server and account information.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub uid: Option<String>,
    pub host: Option<String>,
    pub ip: Option<String>,
    pub server: Option<String>,
    pub account: Option<String>,
    pub hide_server_names: bool,
}

impl SourceInfo {
    /// `SASL/<uid>:<host>[<ip>]:<server>`
    #[must_use]
    pub fn full(&self) -> String {
        format!(
            "SASL/{}:{}[{}]:{}",
            or_unknown(self.uid.as_deref()),
            or_unknown(self.host.as_deref()),
            or_unknown(self.ip.as_deref()),
            or_unknown(self.server.as_deref()),
        )
    }

    /// `SASL(<host>)`
    #[must_use]
    pub fn short(&self) -> String {
        format!("SASL({})", or_unknown(self.host.as_deref()))
    }

    /// Source name shown to operators, e.g.
    /// `<Unknown user on irc.example.net (via SASL):host.example>alice`.
    #[must_use]
    pub fn name(&self) -> String {
        let description = match (&self.server, self.hide_server_names) {
            (Some(server), false) => format!("Unknown user on {server} (via SASL)"),
            _ => "Unknown user (via SASL)".to_string(),
        };
        let account = self.account.as_deref().unwrap_or_default();

        match &self.host {
            Some(host) => format!("<{description}:{host}>{account}"),
            None => format!("<{description}>{account}"),
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("?")
}
