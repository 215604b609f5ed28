use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::{MigrationError, Result};

/// Open a Papers database without any chance of writing to it.
pub async fn connect_read_only(path: &Path) -> Result<SqlitePool> {
    if !path.is_file() {
        return Err(MigrationError::Configuration(format!(
            "source database not found: {}",
            path.display()
        )));
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
