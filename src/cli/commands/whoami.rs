//! Whoami command handler

use std::sync::Arc;

use crate::clients::FirebaseIdentityProvider;
use crate::config::Config;
use crate::console::{ConsoleClient, ConsoleError};

pub async fn cmd_whoami(
    config: &Config,
    email: &str,
    password: &str,
    server: Option<&str>,
) -> anyhow::Result<()> {
    let base_url = server.map_or_else(
        || format!("http://127.0.0.1:{}", config.server.port),
        ToString::to_string,
    );

    let identity = Arc::new(FirebaseIdentityProvider::new(&config.identity)?);
    let client = ConsoleClient::new(&base_url, identity)?;

    match client.sign_in(email, password).await {
        Ok(_) => {}
        Err(ConsoleError::NotAuthorized) => {
            println!("{email} is not an administrator; signed out.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let admin = client.current_admin().await?;
    println!("Signed in as {} (id {})", admin.username, admin.id);
    if let Some(email) = &admin.email {
        println!("  Email: {email}");
    }

    client.sign_out().await?;
    Ok(())
}
