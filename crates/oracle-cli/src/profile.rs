use color_eyre::{eyre::eyre, Report, Result};
use oracle_core::{
    profile::ProfilePatch,
    storage::{ProfileStore, ProfileStoreError},
};
use oracle_storage::NamedMutexRegistry;

use crate::{cli::ProfileCommand, config, storage};

/// Execute a profile subcommand against the encrypted store.
pub async fn handle(cmd: ProfileCommand, config: &config::Config, locks: NamedMutexRegistry) -> Result<()> {
    let store = storage::store_from_config(config, locks)?;
    let output = run(cmd, &store).await?;
    println!("{output}");
    Ok(())
}

/// Run a command against any store and render its output.
pub async fn run<S: ProfileStore>(cmd: ProfileCommand, store: &S) -> Result<String> {
    match cmd {
        ProfileCommand::Get { key } => {
            let record = store.get_profile(&key).await.map_err(report)?;
            Ok(serde_json::to_string_pretty(&record)?)
        }
        ProfileCommand::Set {
            key,
            birthdate,
            consent,
            marketing,
            personalization,
        } => {
            let mut patch = ProfilePatch {
                birthdate,
                ..ProfilePatch::default()
            };
            patch.consent.consent = consent;
            patch.consent.marketing = marketing;
            patch.consent.personalization = personalization.map(Into::into);

            let record = store.set_profile(&key, patch).await.map_err(report)?;
            Ok(serde_json::to_string_pretty(&record)?)
        }
        ProfileCommand::Delete { key } => {
            store.delete_profile(&key).await.map_err(report)?;
            Ok(format!("Deleted {key}"))
        }
        ProfileCommand::List => {
            let keys = store.list_keys().await.map_err(report)?;
            if keys.is_empty() {
                return Ok("No profiles yet. Add one with `oracle profile set <key>`.".to_string());
            }
            Ok(keys.join("\n"))
        }
        ProfileCommand::VerifyBirthdate { key, birthdate } => {
            let matches = store
                .verify_birthdate(&key, &birthdate)
                .await
                .map_err(report)?;
            Ok(if matches { "match" } else { "no match" }.to_string())
        }
    }
}

/// Carry the error kind along so scripts can tell failures apart.
fn report(err: ProfileStoreError) -> Report {
    eyre!("{err} [{}]", err.kind())
}
