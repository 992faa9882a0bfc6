use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::ProductSnapshot;

pub fn save_to_file(snapshot: &ProductSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create archive file '{}'", path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
