use serde::de::{self, Deserializer};
use serde::Deserialize;

/// A command override, either a list of arguments or a single string that
/// is split using shell quoting rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command(Vec<String>);

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawCommand {
            String(String),
            List(Vec<String>),
        }

        let command = match RawCommand::deserialize(deserializer)? {
            RawCommand::String(cmd) => shell_words::split(&cmd).map_err(de::Error::custom)?,
            RawCommand::List(cmd) => cmd,
        };

        if command.is_empty() {
            return Err(de::Error::custom("command cannot be empty"));
        }

        Ok(Self(command))
    }
}

impl From<Command> for Vec<String> {
    fn from(value: Command) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_from_string_with_quotes() {
        let cmd: Command =
            serde_json::from_value(json!("/opt/ignite/run.sh -J'-Xmx2g' \"--name cache\""))
                .unwrap();
        assert_eq!(Vec::from(cmd), vec!["/opt/ignite/run.sh", "-J-Xmx2g", "--name cache"]);
    }

    #[test]
    fn command_from_list() {
        let cmd: Command = serde_json::from_value(json!(["sh", "-c", "echo $HOME"])).unwrap();
        assert_eq!(Vec::from(cmd), vec!["sh", "-c", "echo $HOME"]);
    }

    #[test]
    fn command_rejects_unclosed_quote_and_empty() {
        assert!(serde_json::from_value::<Command>(json!("echo 'oops")).is_err());
        assert!(serde_json::from_value::<Command>(json!("")).is_err());
        assert!(serde_json::from_value::<Command>(json!([])).is_err());
    }
}
