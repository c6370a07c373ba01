//! Admin provisioning command handlers

use crate::config::Config;
use crate::services::password;
use crate::storage::{
    self, AdminStore, FirestoreAdminStore, NewAdmin, SqliteAdminStore, StorageError,
};

pub async fn cmd_init_db(config: &Config) -> anyhow::Result<()> {
    let store = storage::connect(config).await?;
    println!("Admin store ready ({})", store.backend());

    if storage::ensure_default_admin(store.as_ref(), config).await? {
        println!(
            "Created bootstrap admin '{}'. Change its password before going live.",
            config.storage.bootstrap_username
        );
    } else {
        println!("Admins already exist; nothing to seed.");
    }

    Ok(())
}

pub async fn cmd_add_admin(
    config: &Config,
    username: &str,
    password: &str,
    email: Option<&str>,
) -> anyhow::Result<()> {
    let username = username.trim();
    if username.is_empty() {
        println!("Username cannot be empty.");
        return Ok(());
    }
    if password.len() < 8 {
        println!("Password must be at least 8 characters.");
        return Ok(());
    }

    let store = storage::connect(config).await?;
    let password_hash =
        password::hash_password_blocking(password.to_string(), config.security.clone()).await?;

    let admin = NewAdmin {
        username: username.to_string(),
        email: email.map(str::trim).filter(|e| !e.is_empty()).map(String::from),
        password_hash: Some(password_hash),
    };

    match store.insert(admin).await {
        Ok(record) => {
            println!("Added admin '{}' (id {})", record.username, record.id);
            Ok(())
        }
        Err(StorageError::Conflict(key)) => {
            println!("An admin with '{key}' already exists.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn cmd_list_admins(config: &Config) -> anyhow::Result<()> {
    let store = storage::connect(config).await?;
    let admins = store.list().await?;

    if admins.is_empty() {
        println!("No admins provisioned.");
        println!();
        println!("Add one with: academy-admin add-admin --username <name> --password <password>");
        return Ok(());
    }

    println!("Admins ({} total)", admins.len());
    println!("{:-<70}", "");

    for admin in admins {
        println!(
            "{:<22} {:<20} {}",
            admin.id,
            admin.username,
            admin.email.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Copies the SQLite admins into the configured Firestore collection.
pub async fn cmd_migrate_admins(config: &Config) -> anyhow::Result<()> {
    let source = SqliteAdminStore::connect(&config.storage).await?;
    let target = FirestoreAdminStore::from_config(config).await?;
    target.ping().await?;

    println!(
        "Copying admins from {} to Firestore collection '{}'",
        config.storage.database_path, config.storage.admins_collection
    );

    let report = storage::copy_admins(&source, &target).await?;

    for username in &report.copied {
        println!("  + {username}");
    }
    for username in &report.skipped {
        println!("  = {username} (already present)");
    }
    println!(
        "Done: {} copied, {} skipped.",
        report.copied.len(),
        report.skipped.len()
    );

    Ok(())
}
