use std::env;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Uniform, rngs::OsRng, Rng, RngCore};
use serde_json::{json, Map};

use swift_portal::{
    airtable::{build_client, build_store},
    config::AppConfig,
    models::fields::unit,
    records::{RecordQuery, RecordStore},
    units::find_unit_by_serial,
};

const USAGE: &str = "Usage: maintenance issue-tokens | rotate-pin <serial-number>";
const TOKEN_BYTES: usize = 32;
const PIN_LENGTH: usize = 6;
const PIN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const PIN_ATTEMPTS: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("issue-tokens") => issue_tokens().await?,
        Some("rotate-pin") => {
            let Some(serial) = args.next() else {
                eprintln!("{USAGE}");
                std::process::exit(1);
            };
            rotate_pin(&serial).await?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_store() -> Result<(AppConfig, impl RecordStore)> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        airtable_api_key = %config.redacted_airtable_key(),
        units_table = %config.airtable_units_table,
        "loaded portal configuration"
    );
    let store = build_store(build_client()?, &config);
    Ok((config, store))
}

/// Gives every unit without a public token a fresh one. Existing tokens are
/// never replaced; links already printed on units keep working.
async fn issue_tokens() -> Result<()> {
    let (config, store) = load_store()?;
    let units = store
        .find_records(
            &config.airtable_units_table,
            &RecordQuery::default().fields([unit::SERIAL_NUMBER, unit::PUBLIC_TOKEN]),
        )
        .await
        .context("failed to list units")?;

    let missing: Vec<_> = units
        .iter()
        .filter(|record| record.text(unit::PUBLIC_TOKEN).is_none())
        .collect();
    if missing.is_empty() {
        println!("Every unit already has a public token.");
        return Ok(());
    }

    println!("Issuing tokens for {} units…", missing.len());
    for record in missing {
        let token = new_public_token();
        let mut fields = Map::new();
        fields.insert(unit::PUBLIC_TOKEN.to_string(), json!(token));
        if let Err(err) = store
            .update_record(&config.airtable_units_table, &record.id, fields)
            .await
        {
            eprintln!("Failed to issue token for {}: {err}", record.id);
            continue;
        }
        println!(
            "{} -> /unit/{token}",
            record.text(unit::SERIAL_NUMBER).unwrap_or_else(|| record.id.clone())
        );
    }

    Ok(())
}

async fn rotate_pin(serial_number: &str) -> Result<()> {
    let (config, store) = load_store()?;
    let Some(found) = find_unit_by_serial(&store, &config, serial_number)
        .await
        .context("failed to look up unit")?
    else {
        bail!("no unit with serial number {serial_number}");
    };

    let pin = unused_access_pin(&store, &config.airtable_units_table, new_access_pin).await?;
    let mut fields = Map::new();
    fields.insert(unit::ACCESS_PIN.to_string(), json!(pin));
    store
        .update_record(&config.airtable_units_table, &found.record_id, fields)
        .await
        .context("failed to store new access pin")?;

    println!("{serial_number}: new access PIN {pin}");
    Ok(())
}

/// Draws PINs until one is not already assigned to a unit, so every PIN keeps
/// resolving to exactly one public token.
async fn unused_access_pin<S>(
    store: &S,
    units_table: &str,
    mut generate: impl FnMut() -> String,
) -> Result<String>
where
    S: RecordStore + ?Sized,
{
    for _ in 0..PIN_ATTEMPTS {
        let pin = generate();
        let taken = store
            .find_records(
                units_table,
                &RecordQuery::matching(unit::ACCESS_PIN, pin.as_str())
                    .max_records(1)
                    .fields([unit::SERIAL_NUMBER]),
            )
            .await
            .context("failed to check access pin uniqueness")?;
        if taken.is_empty() {
            return Ok(pin);
        }
        tracing::warn!(component = "maintenance", "generated access pin already in use; retrying");
    }
    bail!("could not find an unused access pin after {PIN_ATTEMPTS} attempts")
}

fn new_public_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn new_access_pin() -> String {
    let alphabet = Uniform::from(0..PIN_ALPHABET.len());
    OsRng
        .sample_iter(alphabet)
        .take(PIN_LENGTH)
        .map(|index| PIN_ALPHABET[index] as char)
        .collect()
}
