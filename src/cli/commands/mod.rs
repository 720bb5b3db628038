pub mod logging;
pub mod sasl;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_LISTEN: &str = "listen";
pub const ARG_ACCOUNTS: &str = "accounts";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("saslserv")
        .about("SASL authentication for IRC network services")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_LISTEN)
                .short('l')
                .long(ARG_LISTEN)
                .help("Address to accept the uplink connection on")
                .default_value("127.0.0.1:6697")
                .env("SASLSERV_LISTEN")
                .value_parser(clap::value_parser!(std::net::SocketAddr)),
        )
        .arg(
            Arg::new(ARG_ACCOUNTS)
                .short('a')
                .long(ARG_ACCOUNTS)
                .help("Path to the JSON account file")
                .long_help(
                    "Path to the JSON account file: {\"accounts\": [{\"id\", \"name\", \"frozen\", \"cloak\", \"oper_class\", \"wait_auth\", \"privileges\"}]}",
                )
                .env("SASLSERV_ACCOUNTS")
                .required(true),
        );

    let command = sasl::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn without_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("SASLSERV_LISTEN", None::<&str>),
                ("SASLSERV_ACCOUNTS", None),
                ("SASLSERV_LOG_LEVEL", None),
            ],
            f,
        );
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "saslserv");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("SASL authentication for IRC network services".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_listen_and_accounts() {
        without_env(|| {
            let matches = new().get_matches_from([
                "saslserv",
                "--listen",
                "0.0.0.0:7000",
                "--accounts",
                "/etc/saslserv/accounts.json",
            ]);
            assert_eq!(
                matches.get_one::<SocketAddr>(ARG_LISTEN).copied(),
                "0.0.0.0:7000".parse().ok()
            );
            assert_eq!(
                matches.get_one::<String>(ARG_ACCOUNTS).cloned(),
                Some("/etc/saslserv/accounts.json".to_string())
            );
        });
    }

    #[test]
    fn test_accounts_required() {
        without_env(|| {
            let result = new().try_get_matches_from(["saslserv"]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::MissingRequiredArgument)
            );
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("SASLSERV_LISTEN", Some("[::1]:6900")),
                ("SASLSERV_ACCOUNTS", Some("accounts.json")),
                ("SASLSERV_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(["saslserv"]);
                assert_eq!(
                    matches.get_one::<SocketAddr>(ARG_LISTEN).copied(),
                    "[::1]:6900".parse().ok()
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5usize {
            without_env(|| {
                let mut args = vec![
                    "saslserv".to_string(),
                    "--accounts".to_string(),
                    "accounts.json".to_string(),
                ];
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}
