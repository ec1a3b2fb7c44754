//! hg.sr.ht: Mercurial clones, exportable one repository at a time.

use std::ffi::OsString;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::git::{MeData, Owner};
use super::marker::{self, INFO_FILE, ResourceRecord};
use super::{ExportResult, Service, paginate, sanitize_file_name, vcs};
use crate::client::{self, Client};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;

const ME_QUERY: &str = "query me { me { canonicalName } }";

const REPOSITORIES_QUERY: &str = "query repositories($cursor: Cursor) {
    me {
        repositories(cursor: $cursor) {
            results { name description visibility readme nonPublishing }
            cursor
        }
    }
}";

const REPOSITORY_BY_NAME_QUERY: &str = "query repositoryByName($name: String!) {
    me {
        canonicalName
        repository(name: $name) { name description visibility readme nonPublishing }
    }
}";

const CREATE_REPOSITORY: &str = "mutation createRepository($name: String!, $visibility: Visibility!, $description: String) {
    createRepository(name: $name, visibility: $visibility, description: $description) {
        id name owner { canonicalName }
    }
}";

const UPDATE_REPOSITORY: &str = "mutation updateRepository($id: Int!, $input: RepoInput!) {
    updateRepository(id: $id, input: $input) { id }
}";

/// Working-copy-less clone inside a repository directory.
const CLONE_DIR: &str = "repository";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    name: String,
    description: Option<String>,
    visibility: String,
    readme: Option<String>,
    non_publishing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByNameMe {
    canonical_name: String,
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct ByNameData {
    me: ByNameMe,
}

/// `info.json` of an exported Mercurial repository.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HgRepoInfo {
    #[serde(flatten)]
    pub base: ResourceRecord,
    pub description: Option<String>,
    pub visibility: String,
    pub readme: Option<String>,
    pub non_publishing: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedRepository {
    id: i64,
    name: String,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    create_repository: CreatedRepository,
}

/// Clones Mercurial repositories over SSH and pushes them back on import.
pub struct HgExporter<C> {
    client: C,
    ssh_user: String,
}

impl<C: Client> HgExporter<C> {
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

    /// Export the single repository `name` into `dir/<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] if the account has no such
    /// repository, or the query, clone or marker error.
    pub async fn export_resource(
        &self,
        shutdown: &ShutdownCoordinator,
        dir: &Path,
        name: &str,
    ) -> Result<()> {
        let data: ByNameData = client::query(
            &self.client,
            shutdown,
            REPOSITORY_BY_NAME_QUERY,
            json!({ "name": name }),
        )
        .await?;
        let repo = data.me.repository.ok_or_else(|| Error::ResourceNotFound {
            name: name.to_string(),
        })?;

        self.export_repository(shutdown, dir, &data.me.canonical_name, repo)
            .await
    }

    async fn export_repository(
        &self,
        shutdown: &ShutdownCoordinator,
        dir: &Path,
        owner: &str,
        repo: Repository,
    ) -> Result<()> {
        let repo_dir = dir.join(sanitize_file_name(&repo.name));
        let clone = repo_dir.join(CLONE_DIR);
        let info_path = repo_dir.join(INFO_FILE);
        if clone.exists() {
            info!(repository = %repo.name, "already cloned, skipping");
            return Ok(());
        }
        if marker::exists(&info_path) {
            info!(repository = %repo.name, "already exported, skipping");
            return Ok(());
        }
        tokio::fs::create_dir_all(&repo_dir).await?;

        let url = vcs::hg_ssh_url(&self.ssh_user, self.client.origin(), owner, &repo.name);
        info!(repository = %repo.name, %url, "cloning");
        vcs::clone_into(shutdown, "hg", &clone, |partial| {
            vec![
                "clone".into(),
                "--quiet".into(),
                "-U".into(),
                url.clone().into(),
                partial.as_os_str().to_owned(),
            ]
        })
        .await?;

        let info = HgRepoInfo {
            base: ResourceRecord::new(Service::Hg.as_str(), repo.name),
            description: repo.description,
            visibility: repo.visibility,
            readme: repo.readme,
            non_publishing: repo.non_publishing,
        };
        marker::write(&info_path, &info)?;

        Ok(())
    }

    /// Create the repository exported to `dir`, restore its settings and push
    /// the clone into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be read, a mutation fails or the
    /// push fails.
    pub async fn import_resource(&self, shutdown: &ShutdownCoordinator, dir: &Path) -> Result<()> {
        let info: HgRepoInfo = marker::read(&dir.join(INFO_FILE))?;

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

        let _: serde_json::Value = client::query(
            &self.client,
            shutdown,
            UPDATE_REPOSITORY,
            json!({
                "id": repo.id,
                "input": {"readme": info.readme, "nonPublishing": info.non_publishing},
            }),
        )
        .await?;

        let url = vcs::hg_ssh_url(
            &self.ssh_user,
            self.client.origin(),
            &repo.owner.canonical_name,
            &repo.name,
        );
        let args: Vec<OsString> = vec![
            "push".into(),
            "--quiet".into(),
            "-R".into(),
            dir.join(CLONE_DIR).into_os_string(),
            url.into(),
        ];
        vcs::run(shutdown, "hg", args).await?;
        info!(repository = %repo.name, "imported repository");

        Ok(())
    }
}
