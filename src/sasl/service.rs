//! Replies to messages sent directly to the service.

use tracing::error;

use super::message::Outbound;
use super::SaslServ;

pub const NO_PUBLIC_INTERFACE: &str =
    "This service exists to identify connecting clients to the network. It has no public interface.";

const CTCP_DELIM: char = '\x01';

impl SaslServ {
    /// A user sent `text` to `target` (the service, or a channel it sits in).
    pub fn handle_privmsg(&self, from: &str, target: &str, text: &str) {
        if target.starts_with('&') {
            error!(from, target, "dropping message to a local channel");
            return;
        }

        let reply = match ctcp(text) {
            Some(("PING", args)) => format!("{CTCP_DELIM}PING {args}{CTCP_DELIM}"),
            Some(("VERSION", _)) => {
                format!("{CTCP_DELIM}VERSION {}{CTCP_DELIM}", crate::APP_VERSION)
            }
            // other CTCP requests go unanswered
            Some(_) => return,
            None => NO_PUBLIC_INTERFACE.to_string(),
        };

        self.send(Outbound::Notice {
            target: from.to_string(),
            text: reply,
        });
    }
}

/// Split a CTCP request into its command and arguments.
fn ctcp(text: &str) -> Option<(&str, &str)> {
    let body = text.strip_prefix(CTCP_DELIM)?;
    let body = body.strip_suffix(CTCP_DELIM).unwrap_or(body);
    Some(body.split_once(' ').unwrap_or((body, "")))
}
