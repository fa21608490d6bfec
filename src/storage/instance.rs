//! Instance namespace
//!
//! All user homes live under `<base_data_dir>/<instance id>`. The id is kept
//! unguessable because the same tree is published over plain HTTP.

use log::info;
use rand::RngCore;
use std::io;
use std::path::{Path, PathBuf};

const INSTANCE_ID_FILE: &str = ".instance-id";
const INSTANCE_ID_BYTES: usize = 24;

/// Returns the instance data directory, creating it if needed.
///
/// Uses `configured` when given; otherwise reads the id stored in the base
/// directory, generating and storing a fresh random one on first start.
pub async fn prepare_instance_dir(base: &Path, configured: Option<&str>) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(base).await?;

    let id = match configured {
        Some(id) => id.to_string(),
        None => load_or_create_id(base).await?,
    };

    let dir = base.join(&id);
    tokio::fs::create_dir_all(&dir).await?;
    info!("Instance data directory: {}", dir.display());
    Ok(dir)
}

async fn load_or_create_id(base: &Path) -> io::Result<String> {
    let id_file = base.join(INSTANCE_ID_FILE);
    match tokio::fs::read_to_string(&id_file).await {
        Ok(stored) if !stored.trim().is_empty() => Ok(stored.trim().to_string()),
        Ok(_) => create_id(&id_file).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_id(&id_file).await,
        Err(e) => Err(e),
    }
}

async fn create_id(id_file: &Path) -> io::Result<String> {
    let id = generate_instance_id();
    tokio::fs::write(id_file, &id).await?;
    info!("Generated new instance id");
    Ok(id)
}

/// 24 random bytes, hex encoded.
pub fn generate_instance_id() -> String {
    let mut bytes = [0u8; INSTANCE_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
