use crate::common::{DataLayout, Result, VisiRideError};
use crate::storage::records::validate_identifier;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const FINAL_CHUNK_REPLY: &str = "Final Chunk*";

#[derive(Debug, PartialEq)]
pub enum ChunkOutcome {
    /// More chunks expected. Carries the last chunk name seen in the request.
    Pending { last_chunk: Option<String> },
    /// The terminal chunk arrived; carries the decoded probe image.
    Complete { probe: Vec<u8> },
}

impl ChunkOutcome {
    pub fn reply(&self) -> String {
        match self {
            ChunkOutcome::Pending { last_chunk } => {
                format!("Chunk {} received*", last_chunk.as_deref().unwrap_or("size"))
            }
            ChunkOutcome::Complete { .. } => FINAL_CHUNK_REPLY.to_string(),
        }
    }
}

#[derive(Default)]
struct UploadSession {
    /// Name of the chunk that completes the upload (`data_<size>`).
    terminal: Option<String>,
    received: HashSet<String>,
}

impl UploadSession {
    fn reset(&mut self) {
        self.terminal = None;
        self.received.clear();
    }
}

/// Reassembles photos uploaded as named base64 chunks.
///
/// Each scooter has its own session lock; uploads from different scooters
/// proceed in parallel.
pub struct ChunkedUploadAssembler {
    layout: DataLayout,
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<UploadSession>>>>,
}

impl ChunkedUploadAssembler {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, scooter_id: &str) -> Arc<tokio::sync::Mutex<UploadSession>> {
        self.sessions
            .lock()
            .entry(scooter_id.to_string())
            .or_default()
            .clone()
    }

    #[cfg(test)]
    async fn in_progress(&self, scooter_id: &str) -> bool {
        let session = self.session(scooter_id);
        let session = session.lock().await;
        session.terminal.is_some()
    }

    /// Process one `/checkFace` request.
    ///
    /// `declared_size` starts a fresh session whose terminal chunk is
    /// `data_<declared_size>`. Chunks are handled in order; names already
    /// received in the session are skipped.
    pub async fn accept(
        &self,
        scooter_id: &str,
        declared_size: Option<u32>,
        chunks: Vec<(String, String)>,
    ) -> Result<ChunkOutcome> {
        validate_identifier("scooterId", scooter_id)?;

        let session = self.session(scooter_id);
        let mut session = session.lock().await;
        let spool = self.layout.spool_file(scooter_id);

        if let Some(size) = declared_size {
            session.reset();
            session.terminal = Some(format!("data_{}", size));
            truncate(&spool).await?;
            tracing::debug!(scooter = scooter_id, size, "upload session started");
        }

        let terminal = match session.terminal.clone() {
            Some(terminal) => terminal,
            None => {
                return Err(VisiRideError::validation(format!(
                    "No upload in progress for {}", scooter_id
                )));
            }
        };

        let mut last_chunk = None;
        for (name, payload) in chunks {
            if session.received.contains(&name) {
                tracing::debug!(scooter = scooter_id, chunk = %name, "duplicate chunk ignored");
                last_chunk = Some(name);
                continue;
            }

            append(&spool, payload.as_bytes()).await?;
            session.received.insert(name.clone());

            if name == terminal {
                // Session state and spool are cleared before decoding so a
                // corrupt upload cannot poison the next one
                session.reset();
                let encoded = fs::read_to_string(&spool).await?;
                truncate(&spool).await?;

                tracing::info!(scooter = scooter_id, bytes = encoded.len(), "final chunk received");
                let probe = decode_base64(&encoded)?;
                return Ok(ChunkOutcome::Complete { probe });
            }

            last_chunk = Some(name);
        }

        Ok(ChunkOutcome::Pending { last_chunk })
    }
}

async fn truncate(spool: &Path) -> Result<()> {
    if let Some(parent) = spool.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(spool, b"").await?;
    Ok(())
}

async fn append(spool: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(spool)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// Decode base64, skipping whitespace that transports may insert.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(BASE64.decode(compact)?)
}
