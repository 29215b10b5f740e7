use clap::{Parser, Subcommand, ValueEnum};
use oracle_core::profile::Personalization;

/// CLI surface definition for operating the profile store.
#[derive(Parser, Debug)]
#[command(
    name = "oracle",
    about = "Encrypted profile store for the Oracle fortune mini-app",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to a storage health check when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Round-trip a probe profile through the encrypted store.
    Health,
    /// Print a fresh base64 encryption key for `encryption_key`.
    Keygen,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Read and modify stored profiles.
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProfileCommand {
    /// Print one profile as JSON.
    Get { key: String },
    /// Create or update a profile; omitted fields keep their stored value.
    Set {
        key: String,
        /// Birthdate as YYYY-MM-DD.
        #[arg(long)]
        birthdate: Option<String>,
        #[arg(long)]
        consent: Option<bool>,
        #[arg(long)]
        marketing: Option<bool>,
        #[arg(long, value_enum)]
        personalization: Option<PersonalizationArg>,
    },
    /// Remove a profile (succeeds if already absent).
    Delete { key: String },
    /// List stored profile keys.
    List,
    /// Check a birthdate against the stored one without printing it.
    VerifyBirthdate { key: String, birthdate: String },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalizationArg {
    Off,
    Basic,
    Full,
}

impl From<PersonalizationArg> for Personalization {
    fn from(arg: PersonalizationArg) -> Self {
        match arg {
            PersonalizationArg::Off => Personalization::Off,
            PersonalizationArg::Basic => Personalization::Basic,
            PersonalizationArg::Full => Personalization::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_none_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["oracle"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["oracle", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["oracle", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }

    #[test]
    fn parses_profile_set_with_partial_fields() {
        let cli = Cli::try_parse_from([
            "oracle",
            "profile",
            "set",
            "user-42",
            "--birthdate",
            "1990-01-01",
            "--consent",
            "true",
            "--personalization",
            "basic",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Profile(ProfileCommand::Set {
                key: "user-42".into(),
                birthdate: Some("1990-01-01".into()),
                consent: Some(true),
                marketing: None,
                personalization: Some(PersonalizationArg::Basic),
            }))
        );
    }

    #[test]
    fn parses_verify_birthdate() {
        let cli = Cli::try_parse_from(["oracle", "profile", "verify-birthdate", "k", "2000-01-01"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Profile(ProfileCommand::VerifyBirthdate {
                key: "k".into(),
                birthdate: "2000-01-01".into(),
            }))
        );
    }
}
