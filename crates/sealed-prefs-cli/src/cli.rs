use clap::{Parser, Subcommand, ValueEnum};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "sealed-prefs",
    about = "Inspect and edit an encrypted-at-rest preference store",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the decrypted value stored under a key.
    Get {
        key: String,
        #[arg(long = "type", value_enum, default_value_t = ValueType::String)]
        value_type: ValueType,
    },
    /// Encrypt and store a value. String sets take one or more values.
    Put {
        key: String,
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,
        #[arg(long = "type", value_enum, default_value_t = ValueType::String)]
        value_type: ValueType,
    },
    /// Delete a key.
    Remove { key: String },
    /// Delete every key.
    Clear,
    /// Print every key with its decrypted value.
    List,
    /// Print version and exit.
    Version,
    /// Check that values round-trip encrypted through the key store and the backing file.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    StringSet,
    Int,
    Long,
    Float,
    Bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_default_type() {
        let cli = Cli::try_parse_from(["sealed-prefs", "get", "token"]).expect("parse");
        assert_eq!(
            cli.command,
            Command::Get {
                key: "token".into(),
                value_type: ValueType::String,
            }
        );
    }

    #[test]
    fn parses_typed_put() {
        let cli = Cli::try_parse_from(["sealed-prefs", "put", "n", "42", "--type", "int"])
            .expect("parse");
        assert_eq!(
            cli.command,
            Command::Put {
                key: "n".into(),
                values: vec!["42".into()],
                value_type: ValueType::Int,
            }
        );
    }

    #[test]
    fn parses_string_set_put() {
        let cli = Cli::try_parse_from([
            "sealed-prefs",
            "put",
            "s",
            "a",
            "b",
            "--type",
            "string-set",
        ])
        .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Put { ref values, value_type: ValueType::StringSet, .. } if values.len() == 2
        ));
    }

    #[test]
    fn put_requires_a_value() {
        assert!(Cli::try_parse_from(["sealed-prefs", "put", "k"]).is_err());
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["sealed-prefs", "config", "init"]).expect("parse");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }
}
