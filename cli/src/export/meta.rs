//! meta.sr.ht: profile and public keys.
//!
//! No markers here. Every run rewrites the three files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{ExportResult, paginate};
use crate::client::{self, Client};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

const PROFILE_QUERY: &str = "query profile {
    me { canonicalName username email url location bio }
}";

const SSH_KEYS_QUERY: &str = "query sshKeys($cursor: Cursor) {
    me { sshKeys(cursor: $cursor) { results { fingerprint key comment } cursor } }
}";

const PGP_KEYS_QUERY: &str = "query pgpKeys($cursor: Cursor) {
    me { pgpKeys(cursor: $cursor) { results { fingerprint key } cursor } }
}";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    canonical_name: String,
    username: String,
    email: String,
    url: Option<String>,
    location: Option<String>,
    bio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    me: Profile,
}

#[derive(Debug, Deserialize)]
struct Key {
    key: String,
}

/// Exports the account profile, SSH keys and PGP keys.
pub struct MetaExporter<C> {
    client: C,
}

impl<C: Client> MetaExporter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> ExportResult {
        let data: ProfileData =
            client::query(&self.client, shutdown, PROFILE_QUERY, json!({})).await?;
        info!(user = %data.me.canonical_name, "exporting profile");
        let profile = serde_json::to_vec_pretty(&data.me).map_err(Error::from)?;
        tokio::fs::write(dir.join("profile.json"), profile)
            .await
            .map_err(Error::from)?;

        let ssh = self
            .export_keys(shutdown, SSH_KEYS_QUERY, "/me/sshKeys", &dir.join("ssh.keys"))
            .await?;
        let pgp = self
            .export_keys(shutdown, PGP_KEYS_QUERY, "/me/pgpKeys", &dir.join("keys.pgp"))
            .await?;
        info!(ssh, pgp, "exported keys");

        Ok(())
    }

    /// Write one key per line to `dest`, returning the key count.
    async fn export_keys(
        &self,
        shutdown: &ShutdownCoordinator,
        query: &str,
        pointer: &str,
        dest: &Path,
    ) -> Result<usize> {
        let keys: Vec<Key> = paginate::graphql(&self.client, shutdown, query, pointer, json!({}))
            .collect_all()
            .await?;

        let mut content = String::new();
        for key in &keys {
            content.push_str(key.key.trim_end());
            content.push('\n');
        }
        tokio::fs::write(dest, content).await?;

        Ok(keys.len())
    }
}
