// Ticket and ownership data files
//
// Both files are JSON arrays. Loading a ticket file is the "Ticket Fetching"
// precondition: the engine only ever sees records that were loaded here or
// handed to it directly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::processors::OwnershipRecord;
use crate::ticket::TicketFields;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Ticket {ticket_id} appears more than once in {path}")]
    DuplicateTicket { path: PathBuf, ticket_id: String },
    #[error("Ticket entry {index} in {path} has an empty ticket_id")]
    MissingTicketId { path: PathBuf, index: usize },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoaderError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoaderError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the initial ticket batch
pub fn load_tickets(path: impl AsRef<Path>) -> Result<Vec<TicketFields>, LoaderError> {
    let path = path.as_ref();
    let tickets: Vec<TicketFields> = read_json(path)?;

    let mut seen = HashSet::new();
    for (index, ticket) in tickets.iter().enumerate() {
        if ticket.ticket_id.trim().is_empty() {
            return Err(LoaderError::MissingTicketId {
                path: path.to_path_buf(),
                index,
            });
        }
        if !seen.insert(ticket.ticket_id.as_str()) {
            return Err(LoaderError::DuplicateTicket {
                path: path.to_path_buf(),
                ticket_id: ticket.ticket_id.clone(),
            });
        }
    }

    info!(path = %path.display(), count = tickets.len(), "Loaded tickets");
    Ok(tickets)
}

/// Load the ownership directory used by ownership enrichment
pub fn load_ownership_records(
    path: impl AsRef<Path>,
) -> Result<Vec<OwnershipRecord>, LoaderError> {
    let path = path.as_ref();
    let records: Vec<OwnershipRecord> = read_json(path)?;
    info!(path = %path.display(), count = records.len(), "Loaded ownership records");
    Ok(records)
}
