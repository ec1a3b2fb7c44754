//! git.sr.ht: bare mirrors of every repository.

use std::ffi::OsString;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::marker::{self, INFO_FILE, ResourceRecord};
use super::{ExportResult, Service, paginate, sanitize_file_name, vcs};
use crate::client::{self, Client};
use crate::error::Result;
use crate::shutdown::ShutdownCoordinator;

const ME_QUERY: &str = "query me { me { canonicalName } }";

const REPOSITORIES_QUERY: &str = "query repositories($cursor: Cursor) {
    me {
        repositories(cursor: $cursor) {
            results { name description visibility }
            cursor
        }
    }
}";

const CREATE_REPOSITORY: &str = "mutation createRepository($name: String!, $visibility: Visibility!, $description: String) {
    createRepository(name: $name, visibility: $visibility, description: $description) {
        name owner { canonicalName }
    }
}";

/// Bare mirror inside a repository directory.
const MIRROR_DIR: &str = "repository.git";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Owner {
    pub canonical_name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct MeData {
    pub me: Owner,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    description: Option<String>,
    visibility: String,
}

/// `info.json` of an exported git repository.
#[derive(Debug, Serialize, Deserialize)]
pub struct GitRepoInfo {
    #[serde(flatten)]
    pub base: ResourceRecord,
    pub description: Option<String>,
    pub visibility: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    create_repository: CreatedRepository,
}

#[derive(Debug, Deserialize)]
struct CreatedRepository {
    name: String,
    owner: Owner,
}

/// Mirrors repositories over SSH and pushes them back on import.
pub struct GitExporter<C> {
    client: C,
    ssh_user: String,
}

impl<C: Client> GitExporter<C> {
    pub fn new(client: C, ssh_user: impl Into<String>) -> Self {
        Self {
            client,
            ssh_user: ssh_user.into(),
        }
    }

    pub async fn export(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> ExportResult {
        let me: MeData = client::query(&self.client, shutdown, ME_QUERY, json!({})).await?;
        let owner = me.me.canonical_name;

        let mut repositories = paginate::graphql(
            &self.client,
            shutdown,
            REPOSITORIES_QUERY,
            "/me/repositories",
            json!({}),
        );
        while let Some(page) = repositories.next_page().await? {
            for repo in page {
                self.export_repository(shutdown, dir, &owner, repo).await?;
            }
        }

        Ok(())
    }

    async fn export_repository(
        &self,
        shutdown: &ShutdownCoordinator,
        dir: &Path,
        owner: &str,
        repo: Repository,
    ) -> Result<()> {
        let repo_dir = dir.join(sanitize_file_name(&repo.name));
        let mirror = repo_dir.join(MIRROR_DIR);
        let info_path = repo_dir.join(INFO_FILE);
        if mirror.exists() {
            info!(repository = %repo.name, "already cloned, skipping");
            return Ok(());
        }
        if marker::exists(&info_path) {
            info!(repository = %repo.name, "already exported, skipping");
            return Ok(());
        }
        tokio::fs::create_dir_all(&repo_dir).await?;

        let url = vcs::git_ssh_url(&self.ssh_user, self.client.origin(), owner, &repo.name);
        info!(repository = %repo.name, %url, "cloning");
        vcs::clone_into(shutdown, "git", &mirror, |partial| {
            vec![
                "clone".into(),
                "--quiet".into(),
                "--mirror".into(),
                url.clone().into(),
                partial.as_os_str().to_owned(),
            ]
        })
        .await?;

        let info = GitRepoInfo {
            base: ResourceRecord::new(Service::Git.as_str(), repo.name),
            description: repo.description,
            visibility: repo.visibility,
        };
        marker::write(&info_path, &info)?;

        Ok(())
    }

    /// Create the repository exported to `dir` and push the mirror into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be read, the repository cannot
    /// be created or the push fails.
    pub async fn import_resource(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<()> {
        let info: GitRepoInfo = marker::read(&dir.join(INFO_FILE))?;

        let created: Created = client::query(
            &self.client,
            shutdown,
            CREATE_REPOSITORY,
            json!({
                "name": info.base.name,
                "visibility": info.visibility,
                "description": info.description,
            }),
        )
        .await?;
        let repo = created.create_repository;

        let url = vcs::git_ssh_url(
            &self.ssh_user,
            self.client.origin(),
            &repo.owner.canonical_name,
            &repo.name,
        );
        let mirror = dir.join(MIRROR_DIR);
        let args: Vec<OsString> = vec![
            "-C".into(),
            mirror.into_os_string(),
            "push".into(),
            "--quiet".into(),
            "--mirror".into(),
            url.into(),
        ];
        vcs::run(shutdown, "git", args).await?;
        info!(repository = %repo.name, "imported repository");

        Ok(())
    }
}
