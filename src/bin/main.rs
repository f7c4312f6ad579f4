// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use clap::Parser;
use csv::{ReaderBuilder, Trim};
use rinha_ledger::{
    Client, ClientId, JournalMode, Ledger, LedgerConfig, LedgerStore, Statement,
    TransactionRequest, default_clients,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Rinha Ledger - Replay transaction requests against a client ledger
///
/// Reads `client,type,amount,description` rows from a CSV file, applies them
/// to the seeded clients and prints every client's statement as JSON.
#[derive(Parser, Debug)]
#[command(name = "rinha-ledger")]
#[command(about = "Replays credit/debit requests and prints client statements", long_about = None)]
struct Args {
    /// Path to CSV file with transaction requests
    ///
    /// Expected format: client,type,amount,description
    /// Example: cargo run -- requests.csv > statements.json
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// CSV file with the clients to seed (id,name,limit,balance)
    #[arg(long, value_name = "FILE")]
    clients: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Record transactions synchronously instead of in batches
    #[arg(long)]
    sync: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match LedgerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => LedgerConfig::default(),
    };
    if args.sync {
        config.journal.mode = JournalMode::Sync;
    }

    init_logging(&config.log_level, args.log_json);

    let clients = match &args.clients {
        Some(path) => match File::open(path)
            .map_err(Box::<dyn Error>::from)
            .and_then(|file| read_clients(BufReader::new(file)))
        {
            Ok(clients) => clients,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot read clients");
                process::exit(1);
            }
        },
        None => default_clients(),
    };

    let ledger = match Ledger::in_memory(clients, &config) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!(error = %e, "cannot seed ledger");
            process::exit(1);
        }
    };
    if let Err(e) = ledger.start() {
        error!(error = %e, "cannot start ledger");
        process::exit(1);
    }

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open input");
            process::exit(1);
        }
    };

    let summary = match process_requests(&ledger, BufReader::new(file)) {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "error processing requests");
            process::exit(1);
        }
    };
    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        failed = summary.failed,
        "replay finished"
    );

    // Flush queued transactions before reading statements.
    if let Err(e) = ledger.shutdown() {
        error!(error = %e, "journal flush incomplete");
        process::exit(1);
    }

    if let Err(e) = write_statements(&ledger, std::io::stdout()) {
        error!(error = %e, "error writing output");
        process::exit(1);
    }
}

fn init_logging(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Raw CSV record matching the input format.
///
/// Fields: `client, type, amount, description`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    client: u32,
    #[serde(rename = "type")]
    kind: String,
    amount: i64,
    description: String,
}

impl CsvRecord {
    fn into_request(self) -> TransactionRequest {
        TransactionRequest::new(ClientId(self.client), self.kind, self.amount, self.description)
    }
}

/// Counts of replay outcomes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Reads seed clients from CSV: `id, name, limit, balance`.
///
/// # Errors
///
/// Unlike request rows, a malformed client row aborts the load, and so does
/// a client with a negative limit or a balance below `-limit`.
pub fn read_clients<R: Read>(reader: R) -> Result<Vec<Client>, Box<dyn Error>> {
    let clients = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader)
        .deserialize::<Client>()
        .collect::<Result<Vec<_>, _>>()?;
    for client in &clients {
        client.validate()?;
    }
    Ok(clients)
}

/// Replays requests from a CSV reader against `ledger`.
///
/// Rows are streamed, so inputs of any size are handled in constant memory.
/// Malformed rows are skipped; validation failures and rejected debits are
/// counted in the summary.
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
pub fn process_requests<R: Read>(
    ledger: &Ledger,
    reader: R,
) -> Result<ReplaySummary, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " d "
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut summary = ReplaySummary::default();
    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "skipping malformed row");
                continue;
            }
        };

        let client = record.client;
        match ledger.process(record.into_request()) {
            Ok(outcome) if outcome.accepted => summary.accepted += 1,
            Ok(outcome) => {
                debug!(client, balance = outcome.balance, "debit rejected");
                summary.rejected += 1;
            }
            Err(e) => {
                warn!(client, error = %e, "request failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Writes every client's statement as one JSON object keyed by client id.
pub fn write_statements<W: Write>(
    ledger: &Ledger,
    mut writer: W,
) -> Result<(), Box<dyn Error>> {
    let mut statements: BTreeMap<u32, Statement> = BTreeMap::new();
    for client in ledger.store().clients()? {
        statements.insert(client.id.0, ledger.extract(client.id)?);
    }
    serde_json::to_writer_pretty(&mut writer, &statements)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
