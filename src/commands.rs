use anyhow::{Context, Result, bail};
use peerdeck_core::client::RemoteConfig;
use serde_json::{Map, Value};

pub const HELP: &str = "\
commands:
  tabs                              list tabs
  select <n>                        select tab n (0 is local)
  next | prev                       cycle through tabs
  refresh                           reload remotes from settings
  send <type> [json-object]         send a message to the selected remote
  add <alias> <host> <port> <token> add or replace a remote
  remove <alias>                    remove a remote
  quit";

/// One line of stdin input.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Tabs,
    Select(usize),
    Next,
    Prev,
    Refresh,
    Send { kind: String, payload: Map<String, Value> },
    Add(RemoteConfig),
    Remove(String),
    Help,
    Quit,
}

impl Command {
    /// Parse a command line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match word {
            "" => return Ok(None),
            "tabs" | "ls" => Command::Tabs,
            "next" => Command::Next,
            "prev" => Command::Prev,
            "refresh" => Command::Refresh,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "select" => {
                let [index] = args[..] else {
                    bail!("usage: select <n>");
                };
                Command::Select(index.parse().context("tab index must be a number")?)
            }
            "remove" => {
                let [alias] = args[..] else {
                    bail!("usage: remove <alias>");
                };
                Command::Remove(alias.to_string())
            }
            "add" => {
                let [alias, host, port, token] = args[..] else {
                    bail!("usage: add <alias> <host> <port> <token>");
                };
                let port: u16 = port.parse().context("port must be 0-65535")?;
                Command::Add(RemoteConfig::new(alias, host, port, token))
            }
            "send" => {
                let (kind, json) = match rest.split_once(char::is_whitespace) {
                    Some((kind, json)) => (kind, json.trim()),
                    None => (rest, ""),
                };
                if kind.is_empty() {
                    bail!("usage: send <type> [json-object]");
                }
                let payload = if json.is_empty() {
                    Map::new()
                } else {
                    match serde_json::from_str::<Value>(json).context("invalid JSON payload")? {
                        Value::Object(map) => map,
                        _ => bail!("payload must be a JSON object"),
                    }
                };
                Command::Send {
                    kind: kind.to_string(),
                    payload,
                }
            }
            other => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn parses_navigation_commands() {
        assert_eq!(parse("tabs"), Command::Tabs);
        assert_eq!(parse("  select 2 "), Command::Select(2));
        assert_eq!(parse("next"), Command::Next);
        assert_eq!(parse("prev"), Command::Prev);
        assert_eq!(parse("refresh"), Command::Refresh);
        assert_eq!(parse("quit"), Command::Quit);
        assert!(Command::parse("   ").unwrap().is_none());
    }

    #[test]
    fn parses_add_and_remove() {
        assert_eq!(
            parse("add work 10.0.0.2 19100 s3cret"),
            Command::Add(RemoteConfig::new("work", "10.0.0.2", 19100, "s3cret"))
        );
        assert_eq!(parse("remove work"), Command::Remove("work".into()));
        assert!(Command::parse("add work 10.0.0.2 notaport tok").is_err());
        assert!(Command::parse("add work 10.0.0.2").is_err());
    }

    #[test]
    fn send_payload_keeps_spaces_in_json() {
        match parse(r#"send focus {"project": "my api", "n": 1}"#) {
            Command::Send { kind, payload } => {
                assert_eq!(kind, "focus");
                assert_eq!(payload.get("project"), Some(&json!("my api")));
                assert_eq!(payload.get("n"), Some(&json!(1)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            parse("send refresh_state"),
            Command::Send {
                kind: "refresh_state".into(),
                payload: Map::new()
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("select").is_err());
        assert!(Command::parse("select one").is_err());
        assert!(Command::parse("send").is_err());
        assert!(Command::parse("send focus [1,2]").is_err());
        assert!(Command::parse("send focus {oops").is_err());
        assert!(Command::parse("launch").is_err());
    }
}
